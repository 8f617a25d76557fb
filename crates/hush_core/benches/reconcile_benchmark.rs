//! Reconciliation benchmarks
//!
//! Measures the control-thread cost of applying snapshots and the
//! audio-thread cost of rendering a populated chain.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use hush_core::{
    CaptureSessionManager, EngineConfig, NoiseKind, OfflineBackend, Reconciler, SourceDeclaration,
};

fn snapshot(count: usize, shift: f32) -> Vec<SourceDeclaration> {
    (0..count)
        .map(|i| {
            let kind = NoiseKind::ALL[i % NoiseKind::ALL.len()];
            SourceDeclaration::from_preset(format!("src-{}", i), kind)
                .with_frequency(kind.default_frequency_hz() + shift)
        })
        .collect()
}

fn benchmark_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");

    for count in [1usize, 8, 32] {
        let backend = OfflineBackend::new();
        let mut sessions =
            CaptureSessionManager::new(Arc::new(backend.clone()), EngineConfig::default());
        let session = sessions.start().unwrap();
        let mut reconciler = Reconciler::new();

        let a = snapshot(count, 0.0);
        let b = snapshot(count, 15.0);
        reconciler.reconcile(&a, &session).unwrap();

        group.bench_function(format!("noop_{}_sources", count), |bench| {
            bench.iter(|| reconciler.reconcile(black_box(&a), &session).unwrap())
        });

        // Alternate between two tunings so every pass updates every unit
        let mut flip = false;
        group.bench_function(format!("retune_{}_sources", count), |bench| {
            bench.iter(|| {
                flip = !flip;
                let target = if flip { &b } else { &a };
                let report = reconciler.reconcile(black_box(target), &session).unwrap();
                backend.advance(64);
                report
            })
        });

        reconciler.teardown(&session).unwrap();
    }

    group.finish();
}

fn benchmark_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_chain");

    for count in [0usize, 4, 16] {
        let backend = OfflineBackend::new();
        let mut sessions =
            CaptureSessionManager::new(Arc::new(backend.clone()), EngineConfig::default());
        let session = sessions.start().unwrap();
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(&snapshot(count, 0.0), &session).unwrap();

        let mut buffer: Vec<f32> = (0..512 * 2).map(|i| (i as f32 * 0.01).sin()).collect();
        group.throughput(Throughput::Elements(buffer.len() as u64));
        group.bench_function(format!("render_{}_units", count), |bench| {
            bench.iter(|| backend.render(black_box(&mut buffer)))
        });

        reconciler.teardown(&session).unwrap();
    }

    group.finish();
}

criterion_group!(benches, benchmark_reconcile, benchmark_render);
criterion_main!(benches);
