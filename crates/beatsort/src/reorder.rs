//! Apply a tour to the time axis: `out[.., t] = in[.., perm[t]]`.

use ndarray::{Array4, Axis};
use thiserror::Error;

use crate::stack::{RowSink, RowSource, Stack, StackError, StackShape, AXIS_T};
use crate::tour::{Permutation, TourError};

#[derive(Debug, Error)]
pub enum ReorderError {
    #[error(transparent)]
    Tour(#[from] TourError),
    #[error(transparent)]
    Stack(#[from] StackError),
}

fn check_frames(perm: &Permutation, frames: usize) -> Result<(), TourError> {
    if perm.len() != frames {
        return Err(TourError::FrameCountMismatch {
            solution: perm.len(),
            frames,
        });
    }
    Ok(())
}

/// Reordered copy of `stack`; all other axes untouched.
pub fn reorder_frames(stack: &Stack, perm: &Permutation) -> Result<Stack, ReorderError> {
    check_frames(perm, StackShape::of(stack).frames)?;
    Ok(stack.select(Axis(AXIS_T), perm.as_slice()))
}

/// Row-streaming variant of [`reorder_frames`].
pub fn reorder_into<S, D>(src: &S, dst: &mut D, perm: &Permutation) -> Result<(), ReorderError>
where
    S: RowSource + ?Sized,
    D: RowSink + ?Sized,
{
    let shape = src.shape();
    check_frames(perm, shape.frames)?;
    if dst.shape() != shape {
        return Err(StackError::StackShape {
            expected: dst.shape().dims(),
            found: shape.dims(),
        }
        .into());
    }
    for y in 0..shape.rows {
        let row: Array4<f64> = src.read_row(y)?;
        // Row axes are [X, Z, C, T].
        let reordered = row.select(Axis(3), perm.as_slice());
        dst.write_row(y, reordered.view())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::MappedStack;

    fn labelled(shape: StackShape) -> Stack {
        let d = shape.dims();
        Stack::from_shape_fn((d[0], d[1], d[2], d[3], d[4]), |(y, x, z, c, t)| {
            (t * 1000 + y * 100 + x * 10 + z * 3 + c) as f64
        })
    }

    #[test]
    fn frames_follow_the_permutation() {
        let stack = labelled(StackShape::new(2, 3, 2, 1, 4));
        let perm = Permutation::new(vec![2, 0, 3, 1]).unwrap();
        let out = reorder_frames(&stack, &perm).unwrap();
        for (t, &src) in perm.as_slice().iter().enumerate() {
            assert_eq!(out[[1, 2, 1, 0, t]], stack[[1, 2, 1, 0, src]]);
        }
        let back = reorder_frames(&out, &perm.inverse()).unwrap();
        assert_eq!(back, stack);
    }

    #[test]
    fn streaming_matches_in_memory() {
        let stack = labelled(StackShape::new(3, 2, 1, 2, 5));
        let perm = Permutation::new(vec![4, 3, 2, 1, 0]).unwrap();
        let mut mapped = MappedStack::zeros(StackShape::of(&stack)).unwrap();
        reorder_into(&stack, &mut mapped, &perm).unwrap();
        assert_eq!(mapped.to_stack().unwrap(), reorder_frames(&stack, &perm).unwrap());
    }

    #[test]
    fn wrong_length_is_rejected() {
        let stack = labelled(StackShape::new(1, 1, 1, 1, 3));
        let perm = Permutation::identity(4);
        assert!(matches!(
            reorder_frames(&stack, &perm),
            Err(ReorderError::Tour(TourError::FrameCountMismatch {
                solution: 4,
                frames: 3
            }))
        ));
    }
}
