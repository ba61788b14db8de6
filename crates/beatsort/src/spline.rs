//! Periodic cubic interpolating splines on unit-spaced knots.
//!
//! Purpose
//! - Model one pixel's time series (one period of `n` samples, knots at
//!   `0, 1, …, n-1`, period `n`) as a C² periodic cubic, so it can be sampled
//!   at fractional time offsets.
//!
//! Why this design
//! - With unit spacing the second-derivative moments `M` satisfy the cyclic
//!   tridiagonal system `M[i-1] + 4 M[i] + M[i+1] = 6 (y[i+1] - 2 y[i] + y[i-1])`.
//!   The matrix depends only on `n`, so `CyclicSystem` factors it once
//!   (Thomas sweep plus a Sherman–Morrison correction for the corners) and is
//!   shared by every lane of a stack.
//!
//! References
//! - Press et al., Numerical Recipes, §2.7 (cyclic tridiagonal systems)
//! - Code cross-refs: `crate::resample`, `crate::shear::ShearObjective`

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SplineError {
    #[error("a periodic cubic spline needs at least 3 samples per period, got {got}")]
    TooFewSamples { got: usize },
    #[error("system was factored for period {expected}, got {got} samples")]
    PeriodMismatch { expected: usize, got: usize },
}

const MIN_SAMPLES: usize = 3;

/// Factored cyclic system `tridiag(1, 4, 1)` with unit corners, size `n`.
#[derive(Clone, Debug)]
pub struct CyclicSystem {
    /// Reciprocal pivots of the modified tridiagonal sweep.
    inv: Vec<f64>,
    /// Solution of the modified system for the correction vector `u`.
    z: Vec<f64>,
    /// `1 + z[0] + z[n-1] / gamma`.
    denom: f64,
}

// Sherman–Morrison split: A = B + u v^T with u = (gamma, 0, …, 0, 1),
// v = (1, 0, …, 0, 1 / gamma). Choosing gamma = -b[0] keeps B well conditioned.
const DIAG: f64 = 4.0;
const GAMMA: f64 = -DIAG;

impl CyclicSystem {
    pub fn new(n: usize) -> Result<Self, SplineError> {
        if n < MIN_SAMPLES {
            return Err(SplineError::TooFewSamples { got: n });
        }
        let mut inv = vec![0.0; n];
        let mut pivot = DIAG - GAMMA;
        inv[0] = 1.0 / pivot;
        for i in 1..n {
            let diag = if i == n - 1 {
                DIAG - 1.0 / GAMMA
            } else {
                DIAG
            };
            pivot = diag - inv[i - 1];
            inv[i] = 1.0 / pivot;
        }
        let mut sys = Self {
            inv,
            z: Vec::new(),
            denom: 1.0,
        };
        let mut u = vec![0.0; n];
        u[0] = GAMMA;
        u[n - 1] = 1.0;
        let z = sys.solve_modified(&u);
        sys.denom = 1.0 + z[0] + z[n - 1] / GAMMA;
        sys.z = z;
        Ok(sys)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inv.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inv.is_empty()
    }

    /// Thomas sweep on the corner-free system `B` (sub/super diagonals are 1).
    fn solve_modified(&self, rhs: &[f64]) -> Vec<f64> {
        let n = self.len();
        let mut x = vec![0.0; n];
        x[0] = rhs[0] * self.inv[0];
        for i in 1..n {
            x[i] = (rhs[i] - x[i - 1]) * self.inv[i];
        }
        for i in (0..n - 1).rev() {
            x[i] -= self.inv[i] * x[i + 1];
        }
        x
    }

    /// Solve `A x = rhs` for the full cyclic matrix.
    pub fn solve(&self, rhs: &[f64]) -> Result<Vec<f64>, SplineError> {
        let n = self.len();
        if rhs.len() != n {
            return Err(SplineError::PeriodMismatch {
                expected: n,
                got: rhs.len(),
            });
        }
        let mut x = self.solve_modified(rhs);
        let fact = (x[0] + x[n - 1] / GAMMA) / self.denom;
        for (xi, zi) in x.iter_mut().zip(&self.z) {
            *xi -= fact * zi;
        }
        Ok(x)
    }
}

/// Interpolating periodic cubic through `values[i]` at knot `i`, period `n`.
#[derive(Clone, Debug)]
pub struct PeriodicSpline {
    values: Vec<f64>,
    moments: Vec<f64>,
}

impl PeriodicSpline {
    /// Fit one period of samples (the wrap sample is implied, not included).
    pub fn fit(samples: &[f64]) -> Result<Self, SplineError> {
        let system = CyclicSystem::new(samples.len())?;
        Self::fit_with(&system, samples)
    }

    /// Fit reusing a system factored for `samples.len()`.
    pub fn fit_with(system: &CyclicSystem, samples: &[f64]) -> Result<Self, SplineError> {
        let n = samples.len();
        if n != system.len() {
            return Err(SplineError::PeriodMismatch {
                expected: system.len(),
                got: n,
            });
        }
        let rhs: Vec<f64> = (0..n)
            .map(|i| {
                let prev = samples[(i + n - 1) % n];
                let next = samples[(i + 1) % n];
                6.0 * (next - 2.0 * samples[i] + prev)
            })
            .collect();
        let moments = system.solve(&rhs)?;
        Ok(Self {
            values: samples.to_vec(),
            moments,
        })
    }

    #[inline]
    pub fn period(&self) -> usize {
        self.values.len()
    }

    /// Value at `x`, wrapped into `[0, n)`; exact at integer knots.
    pub fn eval(&self, x: f64) -> f64 {
        let n = self.period();
        let u = x.rem_euclid(n as f64);
        let i = (u.floor() as usize).min(n - 1);
        let t = u - i as f64;
        let j = if i + 1 == n { 0 } else { i + 1 };
        let (yi, yj) = (self.values[i], self.values[j]);
        let (mi, mj) = (self.moments[i], self.moments[j]);
        let slope = (yj - yi) - (2.0 * mi + mj) / 6.0;
        yi + t * (slope + t * (0.5 * mi + t * (mj - mi) / 6.0))
    }
}
