use crate::data::TimeSeries;
use crate::error::DetrendError;

use fitsio::FitsFile;
use fitsio::tables::{ColumnDataType, ColumnDescription};
use std::path::Path;

/// Name of the binary table extension holding the light curve
pub const LIGHT_CURVE_EXTENSION: &str = "LIGHTCURVE";

/// Write a light curve into a FITS file, replacing an existing file
///
/// The primary header carries provenance keywords from [crate::LightCurveMeta]: `OBJECT`,
/// `TELESCOP`, `SECTOR`, `AUTHOR`, `EXPOSURE` and `LABEL`, absent values are skipped. The
/// `LIGHTCURVE` binary table has `TIME`, `FLUX`, `FLUX_ERR` and `QUALITY` columns, every sample
/// is written including the invalid ones. Quality flags are stored as 32-bit signed integers
/// with the same bit pattern.
pub fn write_fits(path: impl AsRef<Path>, ts: &TimeSeries<f64>) -> Result<(), DetrendError> {
    let path = path.as_ref();
    let mut fptr = FitsFile::create(path).overwrite().open()?;

    let primary = fptr.primary_hdu()?;
    let meta = &ts.meta;
    if let Some(target) = &meta.target {
        primary.write_key(&mut fptr, "OBJECT", target.as_str())?;
    }
    if let Some(mission) = &meta.mission {
        primary.write_key(&mut fptr, "TELESCOP", mission.as_str())?;
    }
    if let Some(sector) = meta.sector {
        primary.write_key(&mut fptr, "SECTOR", sector as i64)?;
    }
    if let Some(author) = &meta.author {
        primary.write_key(&mut fptr, "AUTHOR", author.as_str())?;
    }
    if let Some(exposure) = meta.exposure_time {
        primary.write_key(&mut fptr, "EXPOSURE", exposure)?;
    }
    if let Some(label) = &meta.label {
        primary.write_key(&mut fptr, "LABEL", label.as_str())?;
    }

    let columns = [
        ColumnDescription::new("TIME")
            .with_type(ColumnDataType::Double)
            .create()?,
        ColumnDescription::new("FLUX")
            .with_type(ColumnDataType::Double)
            .create()?,
        ColumnDescription::new("FLUX_ERR")
            .with_type(ColumnDataType::Double)
            .create()?,
        ColumnDescription::new("QUALITY")
            .with_type(ColumnDataType::Int)
            .create()?,
    ];
    let table = fptr.create_table(LIGHT_CURVE_EXTENSION.to_string(), &columns)?;

    let time = ts.t.sample.to_vec();
    let flux = ts.flux.sample.to_vec();
    let flux_err = ts.flux_err.sample.to_vec();
    let quality: Vec<i32> = ts.quality().iter().map(|&q| q as i32).collect();
    table.write_col(&mut fptr, "TIME", &time)?;
    table.write_col(&mut fptr, "FLUX", &flux)?;
    table.write_col(&mut fptr, "FLUX_ERR", &flux_err)?;
    table.write_col(&mut fptr, "QUALITY", &quality)?;

    log::info!(
        "wrote {} samples to {}",
        ts.lenu(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::LightCurveMeta;

    use approx::assert_relative_eq;

    #[test]
    fn written_table_reads_back() {
        let t = vec![0.0, 1.0, 2.0, 3.0];
        let flux = vec![1.0, 0.99, f64::NAN, 1.01];
        let flux_err = vec![0.01; 4];
        let ts = TimeSeries::new(t.clone(), flux, flux_err)
            .unwrap()
            .with_quality(vec![0, 0, 4, 0])
            .unwrap()
            .with_meta(
                LightCurveMeta::new("Target 1")
                    .with_mission("TESS", Some(14))
                    .labeled("corrected"),
            );

        let path = std::env::temp_dir().join(format!(
            "light-curve-detrend-{}-written-table.fits",
            std::process::id()
        ));
        write_fits(&path, &ts).unwrap();

        let mut fptr = FitsFile::open(&path).unwrap();
        let primary = fptr.primary_hdu().unwrap();
        let object: String = primary.read_key(&mut fptr, "OBJECT").unwrap();
        assert_eq!(object, "Target 1");
        let sector: i64 = primary.read_key(&mut fptr, "SECTOR").unwrap();
        assert_eq!(sector, 14);

        let table = fptr.hdu(LIGHT_CURVE_EXTENSION).unwrap();
        let time: Vec<f64> = table.read_col(&mut fptr, "TIME").unwrap();
        assert_eq!(time, t);
        let flux: Vec<f64> = table.read_col(&mut fptr, "FLUX").unwrap();
        assert_relative_eq!(flux[1], 0.99);
        let quality: Vec<i32> = table.read_col(&mut fptr, "QUALITY").unwrap();
        assert_eq!(quality, vec![0, 0, 4, 0]);

        std::fs::remove_file(&path).unwrap();
    }
}
