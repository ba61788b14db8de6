//! Criterion benchmarks for frame sequencing.
//! Focus: distance matrix construction and the in-process tour backends
//! (Held–Karp up to its limit, 2-opt beyond it).

use beatsort::distance::distance_matrix;
use beatsort::synth::{travelling_wave, SynthCfg};
use beatsort::tour::{ExactSolver, TourSolver, TwoOptSolver};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

fn shuffled(frames: usize) -> beatsort::stack::Stack {
    travelling_wave(&SynthCfg {
        rows: 32,
        cols: 32,
        frames,
        shear: 0.0,
        shuffle_seed: Some(11),
    })
    .stack
}

fn bench_sequence(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequence");
    for &frames in &[8usize, 12, 16] {
        let d = distance_matrix(&shuffled(frames)).unwrap();
        group.bench_with_input(BenchmarkId::new("exact", frames), &d, |b, d| {
            b.iter(|| ExactSolver::default().solve_cyclic_tour(d).unwrap())
        });
    }
    for &frames in &[16usize, 64, 200] {
        let stack = shuffled(frames);
        group.bench_with_input(BenchmarkId::new("distance_matrix", frames), &stack, |b, s| {
            b.iter(|| distance_matrix(s).unwrap())
        });
        let d = distance_matrix(&stack).unwrap();
        group.bench_with_input(BenchmarkId::new("two_opt", frames), &d, |b, d| {
            b.iter(|| TwoOptSolver::default().solve_cyclic_tour(d).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sequence);
criterion_main!(benches);
