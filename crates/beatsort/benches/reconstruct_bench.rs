//! Criterion benchmarks for scan-shear correction.
//! Focus: full-resolution reconstruction (one spline fit per lane) and one
//! objective evaluation on a downsized stack, for T in {16, 32, 64}.
//! Results: by default under target/criterion; to store under data/bench, run:
//!   CARGO_TARGET_DIR=data/bench cargo bench -p beatsort

use beatsort::resample::reconstruct;
use beatsort::shear::ShearObjective;
use beatsort::synth::{travelling_wave, SynthCfg};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

fn wave(frames: usize) -> beatsort::stack::Stack {
    travelling_wave(&SynthCfg {
        rows: 64,
        cols: 64,
        frames,
        shear: 0.8,
        shuffle_seed: None,
    })
    .stack
}

fn bench_reconstruct(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconstruct");
    group.sample_size(10);
    for &frames in &[16usize, 32, 64] {
        let stack = wave(frames);
        group.bench_with_input(BenchmarkId::new("full_64x64", frames), &stack, |b, s| {
            b.iter(|| reconstruct(s, 0.8).unwrap())
        });
        let objective = ShearObjective::new(&stack).unwrap();
        group.bench_with_input(
            BenchmarkId::new("objective_eval", frames),
            &objective,
            |b, o| b.iter(|| o.evaluate(1.3)),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_reconstruct);
criterion_main!(benches);
