use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Quality-exclusion bitmask
///
/// Cadences with any of the mask bits set in their quality flag word are treated as invalid.
/// Bit values follow the TESS data-product conventions, presets are explicit values rather than
/// library-wide state.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct QualityBitmask(pub u32);

impl QualityBitmask {
    pub const ATTITUDE_TWEAK: u32 = 1;
    pub const SAFE_MODE: u32 = 2;
    pub const COARSE_POINT: u32 = 4;
    pub const EARTH_POINT: u32 = 8;
    pub const ARGABRIGHTENING: u32 = 16;
    pub const DESAT: u32 = 32;
    pub const APERTURE_COSMIC: u32 = 64;
    pub const MANUAL_EXCLUDE: u32 = 128;
    pub const DISCONTINUITY: u32 = 256;
    pub const IMPULSIVE_OUTLIER: u32 = 512;
    pub const COLLATERAL_COSMIC: u32 = 1024;
    pub const STRAYLIGHT: u32 = 2048;
    pub const STRAYLIGHT2: u32 = 4096;
    pub const PLANET_SEARCH_EXCLUDE: u32 = 8192;
    pub const BAD_CALIBRATION_EXCLUDE: u32 = 16384;
    pub const INSUFFICIENT_TARGETS: u32 = 32768;

    /// Keep everything
    pub const fn none() -> Self {
        Self(0)
    }

    /// Flags which almost always indicate corrupted data
    pub const fn default_bitmask() -> Self {
        Self(
            Self::ATTITUDE_TWEAK
                | Self::SAFE_MODE
                | Self::COARSE_POINT
                | Self::EARTH_POINT
                | Self::ARGABRIGHTENING
                | Self::DESAT
                | Self::MANUAL_EXCLUDE
                | Self::IMPULSIVE_OUTLIER
                | Self::BAD_CALIBRATION_EXCLUDE,
        )
    }

    /// Default flags plus cosmic rays and scattered light
    pub const fn hard() -> Self {
        Self(
            Self::default_bitmask().0
                | Self::APERTURE_COSMIC
                | Self::COLLATERAL_COSMIC
                | Self::STRAYLIGHT
                | Self::STRAYLIGHT2,
        )
    }

    /// Every known flag
    pub const fn hardest() -> Self {
        Self(u32::MAX)
    }

    #[inline]
    pub fn rejects(&self, quality: u32) -> bool {
        quality & self.0 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_nested() {
        let flags = [
            QualityBitmask::none(),
            QualityBitmask::default_bitmask(),
            QualityBitmask::hard(),
            QualityBitmask::hardest(),
        ];
        for pair in flags.windows(2) {
            assert_eq!(pair[0].0 & pair[1].0, pair[0].0);
        }
    }

    #[test]
    fn rejects_flagged_cadences() {
        let mask = QualityBitmask::default_bitmask();
        assert!(mask.rejects(QualityBitmask::DESAT));
        assert!(!mask.rejects(QualityBitmask::APERTURE_COSMIC));
        assert!(!mask.rejects(0));
        assert!(QualityBitmask::hard().rejects(QualityBitmask::APERTURE_COSMIC));
        assert!(!QualityBitmask::none().rejects(u32::MAX));
    }
}
