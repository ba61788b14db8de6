//! Block-averaging spatial downsizing of 5-D stacks.
//!
//! Each output pixel is the mean of a non-overlapping `rows × cols` block of
//! the input, independently per (depth, channel, time) slice. A factor that
//! does not divide its axis falls back to 1 for that axis only, with a warning.

use tracing::warn;

use crate::stack::{Stack, StackShape};

/// Integer reduction factors along Y and X.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DownsizeFactors {
    pub rows: usize,
    pub cols: usize,
}

impl Default for DownsizeFactors {
    fn default() -> Self {
        Self { rows: 4, cols: 4 }
    }
}

impl DownsizeFactors {
    #[inline]
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    #[inline]
    pub fn identity() -> Self {
        Self { rows: 1, cols: 1 }
    }

    /// Factors that will actually be applied to `shape`.
    pub fn effective_for(self, shape: StackShape) -> Self {
        Self {
            rows: checked_factor(self.rows, shape.rows, "Y"),
            cols: checked_factor(self.cols, shape.cols, "X"),
        }
    }
}

fn checked_factor(factor: usize, extent: usize, axis: &str) -> usize {
    if factor >= 1 && extent % factor == 0 {
        factor
    } else {
        warn!(
            axis,
            factor, extent, "downsizing factor is not a divider of the axis; using 1 instead"
        );
        1
    }
}

/// Downsized stack plus the factors that were applied.
#[derive(Clone, Debug)]
pub struct Downsized {
    pub stack: Stack,
    pub factors: DownsizeFactors,
}

/// Block-average `stack` along Y and X.
pub fn downsize(stack: &Stack, requested: DownsizeFactors) -> Downsized {
    let shape = StackShape::of(stack);
    let factors = requested.effective_for(shape);
    if factors == DownsizeFactors::identity() {
        return Downsized {
            stack: stack.clone(),
            factors,
        };
    }
    let (fy, fx) = (factors.rows, factors.cols);
    let mut out = Stack::zeros((
        shape.rows / fy,
        shape.cols / fx,
        shape.depth,
        shape.channels,
        shape.frames,
    ));
    for ((y, x, z, c, t), &v) in stack.indexed_iter() {
        out[[y / fy, x / fx, z, c, t]] += v;
    }
    let scale = 1.0 / (fy * fx) as f64;
    out.mapv_inplace(|v| v * scale);
    Downsized {
        stack: out,
        factors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn stack_from_fn(shape: StackShape) -> Stack {
        let d = shape.dims();
        Stack::from_shape_fn((d[0], d[1], d[2], d[3], d[4]), |(y, x, z, c, t)| {
            (y * 7 + x * 3 + z * 11 + c * 13 + t * 17) as f64 % 23.0
        })
    }

    #[test]
    fn averages_blocks_per_slice() {
        let mut stack = StackShape::new(4, 4, 1, 2, 1).zeros();
        // Top-left 2x2 block of channel 1 holds 1, 2, 3, 4.
        stack[[0, 0, 0, 1, 0]] = 1.0;
        stack[[0, 1, 0, 1, 0]] = 2.0;
        stack[[1, 0, 0, 1, 0]] = 3.0;
        stack[[1, 1, 0, 1, 0]] = 4.0;
        let out = downsize(&stack, DownsizeFactors::new(2, 2));
        assert_eq!(out.stack.dim(), (2, 2, 1, 2, 1));
        assert!((out.stack[[0, 0, 0, 1, 0]] - 2.5).abs() < 1e-12);
        assert_eq!(out.stack[[0, 0, 0, 0, 0]], 0.0);
        assert_eq!(out.stack[[1, 1, 0, 1, 0]], 0.0);
    }

    #[test]
    fn non_divisor_falls_back_on_that_axis_only() {
        let stack = stack_from_fn(StackShape::new(6, 8, 1, 1, 3));
        let out = downsize(&stack, DownsizeFactors::new(4, 4));
        assert_eq!(out.factors, DownsizeFactors::new(1, 4));
        assert_eq!(out.stack.dim(), (6, 2, 1, 1, 3));
    }

    #[test]
    fn zero_factor_is_treated_as_non_divisor() {
        let stack = stack_from_fn(StackShape::new(4, 4, 1, 1, 2));
        let out = downsize(&stack, DownsizeFactors::new(0, 2));
        assert_eq!(out.factors, DownsizeFactors::new(1, 2));
    }

    proptest! {
        #[test]
        fn identity_factors_leave_stack_unchanged(
            rows in 1usize..6, cols in 1usize..6, depth in 1usize..3,
            channels in 1usize..3, frames in 1usize..5,
        ) {
            let stack = stack_from_fn(StackShape::new(rows, cols, depth, channels, frames));
            let out = downsize(&stack, DownsizeFactors::identity());
            prop_assert_eq!(out.stack, stack);
        }

        #[test]
        fn block_means_preserve_slice_sums(
            by in 1usize..4, bx in 1usize..4, fy in 1usize..4, fx in 1usize..4, frames in 1usize..4,
        ) {
            let stack = stack_from_fn(StackShape::new(by * fy, bx * fx, 1, 2, frames));
            let out = downsize(&stack, DownsizeFactors::new(fy, fx));
            prop_assert_eq!(out.factors, DownsizeFactors::new(fy, fx));
            let total: f64 = stack.sum();
            let reduced: f64 = out.stack.sum() * (fy * fx) as f64;
            prop_assert!((total - reduced).abs() < 1e-9 * total.max(1.0));
        }
    }
}
