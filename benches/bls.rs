use criterion::Criterion;
use light_curve_detrend::periodogram::*;
use light_curve_detrend::TimeSeries;
use light_curve_detrend_test_util::{BoxTransit, SyntheticLightCurve};
use std::hint::black_box;

pub fn bench_bls(c: &mut Criterion) {
    let transit = BoxTransit {
        period: 3.0,
        epoch: 0.7,
        duration: 0.125,
        depth: 0.005,
    };
    for baseline in [13.5, 27.0, 81.0] {
        let (t, flux, flux_err) = SyntheticLightCurve {
            baseline,
            transit: Some(transit),
            noise: 1e-3,
            ..Default::default()
        }
        .generate();
        let ts = TimeSeries::new(t, flux, flux_err).unwrap();

        let grids: [(&str, PeriodGridStrategy<f64>); 2] = [
            (
                "linear 1000 periods",
                PeriodGrid::linear(1.0, 0.01, 1000).unwrap().into(),
            ),
            (
                "dynamic",
                DynamicPeriodGridParams::new(Some(1.0), Some(10.0), 1.0)
                    .unwrap()
                    .into(),
            ),
        ];
        for (name, grid) in grids {
            let bls = BoxLeastSquares::default().with_period_grid(grid).unwrap();
            c.bench_function(
                format!("BLS: {} samples, {name}", ts.lenu()).as_str(),
                |b| b.iter(|| bls.power(black_box(&ts)).unwrap()),
            );
        }
    }
}
