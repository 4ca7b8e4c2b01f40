//! Autocorrelation benchmark
//!
//! The autocorrelation window is the single heaviest block in the audio
//! path; it must stay comfortably inside a frame budget even though it is
//! amortized behind a 500 ms timer.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pyra_dsp::{autocorrelate, OSS_BUFFER_SIZE};

fn bench_autocorrelation(c: &mut Criterion) {
    // Sparse impulse train, the realistic OSS shape
    let mut sparse = [0.0f32; OSS_BUFFER_SIZE];
    for i in (0..OSS_BUFFER_SIZE).step_by(30) {
        sparse[i] = 1.0;
    }

    // Dense signal, the worst case for the inner product
    let dense: Vec<f32> = (0..OSS_BUFFER_SIZE)
        .map(|i| ((i as f32) * 0.7).sin().abs())
        .collect();

    c.bench_function("autocorrelate_sparse_256", |b| {
        b.iter(|| autocorrelate(black_box(&sparse), black_box(18), black_box(60)))
    });

    c.bench_function("autocorrelate_dense_256", |b| {
        b.iter(|| autocorrelate(black_box(&dense), black_box(18), black_box(128)))
    });
}

criterion_group!(benches, bench_autocorrelation);
criterion_main!(benches);
