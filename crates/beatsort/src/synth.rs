//! Synthetic periodic stacks with known ground truth.
//!
//! A travelling wave `100 + 50 sin(2π u) + 15 cos(4π u)` with
//! `u = (t - shear · y) / T + x / X`, so row `y` lags row 0 by `shear · y`
//! frames. Optionally the frames are shuffled with a seeded RNG; the applied
//! shuffle is returned so callers can check a recovered order.

use rand::{rngs::StdRng, SeedableRng};

use crate::stack::Stack;
use crate::tour::Permutation;

/// Synthetic stack configuration.
#[derive(Clone, Copy, Debug)]
pub struct SynthCfg {
    pub rows: usize,
    pub cols: usize,
    pub frames: usize,
    /// Frames of lag per row.
    pub shear: f64,
    /// Shuffle frames with this seed; `None` keeps them in phase order.
    pub shuffle_seed: Option<u64>,
}

impl Default for SynthCfg {
    fn default() -> Self {
        Self {
            rows: 32,
            cols: 32,
            frames: 24,
            shear: 0.0,
            shuffle_seed: None,
        }
    }
}

/// Generated stack plus the shuffle applied to its frames.
#[derive(Clone, Debug)]
pub struct Synthetic {
    pub stack: Stack,
    /// `stack[.., t]` holds phase `shuffle[t]`; identity when unshuffled.
    pub shuffle: Permutation,
}

pub fn wave_value(cfg: &SynthCfg, y: usize, x: usize, phase: f64) -> f64 {
    let u = (phase - cfg.shear * y as f64) / cfg.frames as f64 + x as f64 / cfg.cols as f64;
    let tau = std::f64::consts::TAU;
    100.0 + 50.0 * (tau * u).sin() + 15.0 * (2.0 * tau * u).cos()
}

/// Build a `[Y, X, 1, 1, T]` travelling-wave stack.
pub fn travelling_wave(cfg: &SynthCfg) -> Synthetic {
    let shuffle = match cfg.shuffle_seed {
        Some(seed) => Permutation::shuffled(cfg.frames, &mut StdRng::seed_from_u64(seed)),
        None => Permutation::identity(cfg.frames),
    };
    let order = shuffle.as_slice();
    let stack = Stack::from_shape_fn((cfg.rows, cfg.cols, 1, 1, cfg.frames), |(y, x, _, _, t)| {
        wave_value(cfg, y, x, order[t] as f64)
    });
    Synthetic { stack, shuffle }
}
