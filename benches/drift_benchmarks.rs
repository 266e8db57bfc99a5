//! Drift detection benchmarks
//!
//! Measures the KS kernel (sort + merged ECDF walk + series p-value) and the
//! per-column fan-out of a full report.
//!
//! Run with: cargo bench --bench drift_benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use farewatch::dataset::Dataset;
use farewatch::drift::{detect, ks_2samp};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SIZES: [usize; 3] = [1_000, 100_000, 1_000_000];

fn uniform(rng: &mut StdRng, n: usize, offset: f64) -> Vec<f64> {
    (0..n).map(|_| offset + rng.gen::<f64>() * 10.0).collect()
}

/// Benchmark the two-sample KS test alone
fn bench_ks(c: &mut Criterion) {
    let mut group = c.benchmark_group("ks_2samp");
    group.sample_size(20);
    let mut rng = StdRng::seed_from_u64(42);

    for n in SIZES {
        let reference = uniform(&mut rng, n, 0.0);
        let current = uniform(&mut rng, n, 0.5);
        group.bench_with_input(
            BenchmarkId::from_parameter(n),
            &(reference, current),
            |b, (reference, current)| {
                b.iter(|| ks_2samp(black_box(reference), black_box(current)));
            },
        );
    }

    group.finish();
}

/// Benchmark a full report over several columns (rayon fan-out)
fn bench_report(c: &mut Criterion) {
    let mut group = c.benchmark_group("drift_report_8_columns");
    group.sample_size(10);
    let mut rng = StdRng::seed_from_u64(7);

    let n = 100_000;
    let names: Vec<String> = (0..8).map(|i| format!("col_{i}")).collect();
    let reference = Dataset::from_columns(
        "reference",
        names.iter().map(|name| (name.clone(), uniform(&mut rng, n, 0.0))).collect::<Vec<_>>(),
    )
    .unwrap();
    let current = Dataset::from_columns(
        "current",
        names.iter().map(|name| (name.clone(), uniform(&mut rng, n, 0.2))).collect::<Vec<_>>(),
    )
    .unwrap();

    group.bench_function(BenchmarkId::from_parameter(n), |b| {
        b.iter(|| detect(black_box(&reference), black_box(&current), &names, 0.05));
    });

    group.finish();
}

criterion_group!(benches, bench_ks, bench_report);
criterion_main!(benches);
