use criterion::{criterion_group, criterion_main};

mod bls;

criterion_group!(
    benches,
    bls::bench_bls,
    regression::bench_regression,
    regression::bench_pipeline
);
criterion_main!(benches);
