//! End-to-end scenarios over the public API.

use std::cell::Cell;

use beatsort::prelude::*;
use beatsort::synth::{travelling_wave, SynthCfg};

/// 8×8 bars: pixel (y, x) is bright when `(x + 2·phase) mod 8 < 4`.
/// Frames 0, 2, 1, 3 carry phases 0, 1, 2, 3.
fn bar_stack() -> Stack {
    let phase_of_frame = [0usize, 2, 1, 3];
    Stack::from_shape_fn((8, 8, 1, 1, 4), |(_, x, _, _, t)| {
        if (x + 2 * phase_of_frame[t]) % 8 < 4 {
            200.0
        } else {
            10.0
        }
    })
}

#[test]
fn scenario_sorting_recovers_known_cycle() {
    let stack = bar_stack();
    let solver = ExactSolver::default();
    let cfg = SortCfg {
        factors: DownsizeFactors::new(2, 2),
    };
    let (sorted, outcome) = sort_stack(&stack, &cfg, Sequencing::Solve(&solver)).unwrap();
    assert_eq!(outcome.permutation.len(), 4);
    // Equal up to rotation and reflection.
    assert_eq!(outcome.permutation.canonical_cycle(), vec![0, 2, 1, 3]);
    assert_eq!(sorted.dim(), stack.dim());
    for (k, &src) in outcome.permutation.as_slice().iter().enumerate() {
        assert_eq!(sorted[[3, 5, 0, 0, k]], stack[[3, 5, 0, 0, src]]);
    }
}

#[test]
fn scenario_shear_estimate_recovers_two_pixels_per_row() {
    let stack = travelling_wave(&SynthCfg {
        rows: 12,
        cols: 8,
        frames: 24,
        shear: 2.0,
        shuffle_seed: None,
    })
    .stack;
    let est = estimate_shift(
        &stack,
        DownsizeFactors::identity(),
        5.3,
        &NelderMead::default(),
    )
    .unwrap();
    assert!((est.shift - 2.0).abs() < 0.2, "{est:?}");
    let objective = ShearObjective::new(&stack).unwrap();
    assert!(objective.evaluate(est.shift) < objective.evaluate(5.3));
    assert_eq!(est.initial_value, objective.evaluate(5.3));
}

#[test]
fn scenario_supplied_shift_bypasses_estimation() {
    struct Counting<'a>(&'a Cell<usize>);
    impl ScalarMinimizer for Counting<'_> {
        fn minimize_scalar(&self, f: &mut dyn FnMut(f64) -> f64, x0: f64) -> Minimum {
            self.0.set(self.0.get() + 1);
            NelderMead::default().minimize_scalar(f, x0)
        }
    }

    let stack = travelling_wave(&SynthCfg {
        rows: 6,
        cols: 5,
        frames: 10,
        shear: 1.7,
        shuffle_seed: None,
    })
    .stack;
    let calls = Cell::new(0);
    let cfg = UnshearCfg {
        factors: DownsizeFactors::default(),
        shift: ShiftSource::Fixed(1.7),
    };
    let (corrected, outcome) = unshear(&stack, &cfg, &Counting(&calls)).unwrap();
    assert_eq!(calls.get(), 0);
    assert!(outcome.estimate.is_none());
    assert_eq!(outcome.shift, 1.7);
    assert_eq!(corrected, reconstruct(&stack, 1.7).unwrap());
}

#[test]
fn sorting_then_unshearing_through_disk_backed_buffers() {
    let synthetic = travelling_wave(&SynthCfg {
        rows: 8,
        cols: 8,
        frames: 12,
        shear: 1.0,
        shuffle_seed: Some(5),
    });
    let shape = StackShape::of(&synthetic.stack);
    let src = MappedStack::from_source(&synthetic.stack).unwrap();

    let mut sorted = MappedStack::zeros(shape).unwrap();
    let solver = ExactSolver::default();
    let sorting = sort_into(
        &src,
        &mut sorted,
        &SortCfg {
            factors: DownsizeFactors::identity(),
        },
        Sequencing::Solve(&solver),
    )
    .unwrap();
    assert_eq!(sorting.permutation.len(), 12);

    let mut corrected = MappedStack::zeros(shape).unwrap();
    let outcome = unshear_into(
        &sorted,
        &mut corrected,
        &UnshearCfg {
            factors: DownsizeFactors::identity(),
            shift: ShiftSource::Fixed(0.0),
        },
        &NelderMead::default(),
    )
    .unwrap();
    assert_eq!(outcome.stages.last(), Some(&UnshearStage::Done));
    let back = corrected.to_stack().unwrap();
    let expected = reorder_frames(&synthetic.stack, &sorting.permutation).unwrap();
    assert!(back.iter().zip(&expected).all(|(a, b)| (a - b).abs() < 1e-9));
}
