//! Derivative-free scalar minimization.
//!
//! - `ScalarMinimizer`: pluggable capability `minimize_scalar(objective, x0)`.
//! - `NelderMead`: downhill simplex restricted to one dimension (a simplex is
//!   two points) with the standard coefficients: reflection 1, expansion 2,
//!   contraction ½, shrink ½. Stops once both the simplex width and the spread
//!   of objective values are within tolerance.
//!
//! References
//! - J. A. Nelder and R. Mead, "A simplex method for function minimization",
//!   The Computer Journal 7 (1965)

use tracing::debug;

/// Result of a scalar minimization.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Minimum {
    pub x: f64,
    pub value: f64,
    pub iterations: usize,
    pub evaluations: usize,
    /// False when an iteration or evaluation budget ran out first.
    pub converged: bool,
}

/// Pluggable scalar minimizer.
pub trait ScalarMinimizer {
    fn minimize_scalar(&self, objective: &mut dyn FnMut(f64) -> f64, initial: f64) -> Minimum;
}

/// Nelder–Mead configuration.
#[derive(Clone, Copy, Debug)]
pub struct NelderMeadCfg {
    /// Relative offset of the second simplex vertex from the initial guess.
    pub initial_step: f64,
    /// Offset used instead when the initial guess is exactly zero.
    pub zero_step: f64,
    pub xatol: f64,
    pub fatol: f64,
    pub max_iter: usize,
    pub max_evals: usize,
}

impl Default for NelderMeadCfg {
    fn default() -> Self {
        Self {
            initial_step: 0.05,
            zero_step: 0.00025,
            xatol: 1e-4,
            fatol: 1e-4,
            // 200 per dimension.
            max_iter: 200,
            max_evals: 200,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NelderMead {
    pub cfg: NelderMeadCfg,
}

impl NelderMead {
    pub fn new(cfg: NelderMeadCfg) -> Self {
        Self { cfg }
    }
}

const RHO: f64 = 1.0;
const CHI: f64 = 2.0;
const PSI: f64 = 0.5;
const SIGMA: f64 = 0.5;

/// Two-vertex simplex kept sorted: `best.1 <= worst.1`.
struct Simplex {
    best: (f64, f64),
    worst: (f64, f64),
}

impl Simplex {
    fn new(a: (f64, f64), b: (f64, f64)) -> Self {
        let mut s = Self { best: a, worst: b };
        s.sort();
        s
    }

    fn sort(&mut self) {
        if self.worst.1.total_cmp(&self.best.1).is_lt() {
            std::mem::swap(&mut self.best, &mut self.worst);
        }
    }
}

/// Objective wrapper that counts calls.
struct Counted<'a> {
    f: &'a mut dyn FnMut(f64) -> f64,
    calls: usize,
}

impl Counted<'_> {
    fn eval(&mut self, x: f64) -> f64 {
        self.calls += 1;
        (self.f)(x)
    }
}

impl ScalarMinimizer for NelderMead {
    fn minimize_scalar(&self, objective: &mut dyn FnMut(f64) -> f64, initial: f64) -> Minimum {
        let cfg = &self.cfg;
        let mut f = Counted {
            f: objective,
            calls: 0,
        };

        let second = if initial != 0.0 {
            (1.0 + cfg.initial_step) * initial
        } else {
            cfg.zero_step
        };
        let f0 = f.eval(initial);
        let f1 = f.eval(second);
        let mut simplex = Simplex::new((initial, f0), (second, f1));
        let mut iterations = 0usize;
        let mut converged = false;

        loop {
            let (xb, fb) = simplex.best;
            let (xw, fw) = simplex.worst;
            if (xw - xb).abs() <= cfg.xatol && (fw - fb).abs() <= cfg.fatol {
                converged = true;
                break;
            }
            if f.calls >= cfg.max_evals || iterations >= cfg.max_iter {
                break;
            }

            // The centroid of all but the worst vertex is the best vertex.
            let xr = (1.0 + RHO) * xb - RHO * xw;
            let fr = f.eval(xr);
            if fr < fb {
                let xe = (1.0 + RHO * CHI) * xb - RHO * CHI * xw;
                let fe = f.eval(xe);
                simplex.worst = if fe < fr { (xe, fe) } else { (xr, fr) };
            } else {
                let mut shrink = false;
                if fr < fw {
                    let xc = (1.0 + PSI * RHO) * xb - PSI * RHO * xw;
                    let fc = f.eval(xc);
                    if fc <= fr {
                        simplex.worst = (xc, fc);
                    } else {
                        shrink = true;
                    }
                } else {
                    let xcc = (1.0 - PSI) * xb + PSI * xw;
                    let fcc = f.eval(xcc);
                    if fcc < fw {
                        simplex.worst = (xcc, fcc);
                    } else {
                        shrink = true;
                    }
                }
                if shrink {
                    let xs = xb + SIGMA * (xw - xb);
                    simplex.worst = (xs, f.eval(xs));
                }
            }
            iterations += 1;
            simplex.sort();
        }

        let (x, value) = simplex.best;
        let evaluations = f.calls;
        debug!(x, value, iterations, evaluations, converged, "nelder-mead finished");
        Minimum {
            x,
            value,
            iterations,
            evaluations,
            converged,
        }
    }
}
