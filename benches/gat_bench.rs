//! Criterion benchmarks for the fit/predict/score cycle

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use temporal_decoding::prelude::*;

fn epochs(n_samples: usize) -> Epochs {
    SyntheticEpochs {
        n_trials: 60,
        n_channels: 16,
        n_samples,
        ..Default::default()
    }
    .generate()
    .expect("synthetic epochs")
}

fn config(parallelism: Parallelism) -> GatConfig {
    GatConfig {
        cv: CvPolicy::Auto {
            n_splits: 3,
            seed: None,
        },
        parallelism,
        ..Default::default()
    }
}

fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("GAT Fit");
    group.sample_size(10);

    for parallelism in [Parallelism::Sequential, Parallelism::Windows, Parallelism::Folds] {
        let data = epochs(30);
        group.bench_with_input(
            BenchmarkId::new("parallelism", format!("{:?}", parallelism)),
            &data,
            |b, data| {
                b.iter(|| {
                    let mut gat = GeneralizationAcrossTime::new(config(parallelism));
                    gat.fit(black_box(data), None).expect("fit");
                });
            },
        );
    }

    group.finish();
}

fn bench_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("GAT Fit Predict Score");
    group.sample_size(10);

    for n_samples in [10, 20, 40] {
        let data = epochs(n_samples);
        group.bench_with_input(BenchmarkId::new("samples", n_samples), &data, |b, data| {
            b.iter(|| {
                let mut gat = GeneralizationAcrossTime::new(config(Parallelism::Windows));
                gat.fit(data, None).expect("fit");
                gat.predict(data, &PredictOptions::new()).expect("predict");
                black_box(gat.score(None, None).expect("score").shape())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fit, bench_cycle);
criterion_main!(benches);
