//! 5-D image stacks `[Y, X, Z, C, T]` and row-wise access.
//!
//! Purpose
//! - One in-memory representation (`Stack`, f64 samples) for every stage, plus
//!   a row-streaming interface so large stacks can live in a disk-backed buffer.
//!
//! Conventions
//! - Axis order is fixed: rows (Y), columns (X), depth (Z), channel (C), time (T).
//! - A "row" is the 4-D slab `[X, Z, C, T]` at a fixed Y. Streaming consumers
//!   visit rows in increasing Y, which is sequential for C-ordered storage.
//! - Only T is ever reordered or resampled; Y, X, Z, C extents are preserved.
//!
//! References
//! - Code cross-refs: `mapped::MappedStack`, `crate::resample::reconstruct_into`,
//!   `crate::reorder::reorder_into`

mod mapped;

pub use mapped::MappedStack;

use ndarray::{concatenate, s, Array4, Array5, ArrayD, ArrayView4, Axis, Ix5};
use thiserror::Error;

/// Image stack with axes `[Y, X, Z, C, T]`.
pub type Stack = Array5<f64>;

pub const AXIS_Y: usize = 0;
pub const AXIS_X: usize = 1;
pub const AXIS_Z: usize = 2;
pub const AXIS_C: usize = 3;
pub const AXIS_T: usize = 4;

/// Errors from stack construction and row access.
#[derive(Debug, Error)]
pub enum StackError {
    #[error("expected a 5-dimensional [Y, X, Z, C, T] array, found {found} dimensions (shape {shape:?})")]
    Rank { found: usize, shape: Vec<usize> },
    #[error("row {row} out of range for a stack with {rows} rows")]
    RowOutOfRange { row: usize, rows: usize },
    #[error("row shape {found:?} does not match the expected [X, Z, C, T] = {expected:?}")]
    RowShape { expected: [usize; 4], found: Vec<usize> },
    #[error("stack shape {found:?} does not match the expected {expected:?}")]
    StackShape { expected: [usize; 5], found: [usize; 5] },
    #[error("stack is empty (shape {shape:?})")]
    Empty { shape: [usize; 5] },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Extents of a stack along its five axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StackShape {
    pub rows: usize,
    pub cols: usize,
    pub depth: usize,
    pub channels: usize,
    pub frames: usize,
}

impl StackShape {
    #[inline]
    pub fn new(rows: usize, cols: usize, depth: usize, channels: usize, frames: usize) -> Self {
        Self {
            rows,
            cols,
            depth,
            channels,
            frames,
        }
    }

    pub fn of(stack: &Stack) -> Self {
        let d = stack.dim();
        Self::new(d.0, d.1, d.2, d.3, d.4)
    }

    #[inline]
    pub fn dims(&self) -> [usize; 5] {
        [self.rows, self.cols, self.depth, self.channels, self.frames]
    }

    /// Shape of one row slab `[X, Z, C, T]`.
    #[inline]
    pub fn row_dims(&self) -> [usize; 4] {
        [self.cols, self.depth, self.channels, self.frames]
    }

    #[inline]
    pub fn row_len(&self) -> usize {
        self.cols * self.depth * self.channels * self.frames
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows * self.row_len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn with_frames(self, frames: usize) -> Self {
        Self { frames, ..self }
    }

    pub fn zeros(&self) -> Stack {
        Stack::zeros((self.rows, self.cols, self.depth, self.channels, self.frames))
    }

    pub(crate) fn require_non_empty(&self) -> Result<(), StackError> {
        if self.is_empty() {
            return Err(StackError::Empty { shape: self.dims() });
        }
        Ok(())
    }

    pub(crate) fn check_row(&self, y: usize) -> Result<(), StackError> {
        if y >= self.rows {
            return Err(StackError::RowOutOfRange {
                row: y,
                rows: self.rows,
            });
        }
        Ok(())
    }

    pub(crate) fn check_row_shape(&self, row: &ArrayView4<'_, f64>) -> Result<(), StackError> {
        let expected = self.row_dims();
        if row.shape() != expected {
            return Err(StackError::RowShape {
                expected,
                found: row.shape().to_vec(),
            });
        }
        Ok(())
    }
}

/// Row-wise read access to a stack (in memory or disk-backed).
pub trait RowSource {
    fn shape(&self) -> StackShape;

    /// Copy of row `y` as `[X, Z, C, T]`.
    fn read_row(&self, y: usize) -> Result<Array4<f64>, StackError>;
}

/// Row-wise write access to a stack.
pub trait RowSink {
    fn shape(&self) -> StackShape;

    fn write_row(&mut self, y: usize, row: ArrayView4<'_, f64>) -> Result<(), StackError>;
}

impl RowSource for Stack {
    fn shape(&self) -> StackShape {
        StackShape::of(self)
    }

    fn read_row(&self, y: usize) -> Result<Array4<f64>, StackError> {
        StackShape::of(self).check_row(y)?;
        Ok(self.index_axis(Axis(AXIS_Y), y).to_owned())
    }
}

impl RowSink for Stack {
    fn shape(&self) -> StackShape {
        StackShape::of(self)
    }

    fn write_row(&mut self, y: usize, row: ArrayView4<'_, f64>) -> Result<(), StackError> {
        let shape = StackShape::of(self);
        shape.check_row(y)?;
        shape.check_row_shape(&row)?;
        self.index_axis_mut(Axis(AXIS_Y), y).assign(&row);
        Ok(())
    }
}

/// Promote a loaded array to 5-D: `[Y, X, T]` gains singleton Z and C axes.
pub fn promote_to_5d(array: ArrayD<f64>) -> Result<Stack, StackError> {
    let found = array.ndim();
    let shape = array.shape().to_vec();
    let promoted = match found {
        5 => array,
        3 => array.insert_axis(Axis(AXIS_Z)).insert_axis(Axis(AXIS_C)),
        _ => return Err(StackError::Rank { found, shape }),
    };
    promoted
        .into_dimensionality::<Ix5>()
        .map_err(|_| StackError::Rank { found, shape })
}

/// Append a copy of frame 0 after the last frame (closes the period).
pub fn append_wrap_frame(stack: &Stack) -> Result<Stack, StackError> {
    let shape = StackShape::of(stack);
    if shape.frames == 0 {
        return Err(StackError::Empty { shape: shape.dims() });
    }
    let first = stack.slice(s![.., .., .., .., 0..1]);
    concatenate(Axis(AXIS_T), &[stack.view(), first]).map_err(|_| StackError::Empty {
        shape: shape.dims(),
    })
}

/// Drop the trailing wrap frame added by [`append_wrap_frame`].
pub fn strip_wrap_frame(stack: &Stack) -> Stack {
    let frames = stack.len_of(Axis(AXIS_T));
    stack
        .slice(s![.., .., .., .., ..frames.saturating_sub(1)])
        .to_owned()
}

/// Gather the `(z, c)` plane of a source as a `[Y, X, 1, 1, T]` stack.
///
/// Estimation and sequencing only look at this plane, so it is small enough
/// to keep in memory even when the full stack is disk-backed.
pub fn plane<S: RowSource + ?Sized>(src: &S, z: usize, c: usize) -> Result<Stack, StackError> {
    let shape = src.shape();
    shape.require_non_empty()?;
    if z >= shape.depth || c >= shape.channels {
        return Err(StackError::Empty { shape: shape.dims() });
    }
    let mut out = Stack::zeros((shape.rows, shape.cols, 1, 1, shape.frames));
    for y in 0..shape.rows {
        let row = src.read_row(y)?;
        out.slice_mut(s![y, .., 0, 0, ..])
            .assign(&row.slice(s![.., z, c, ..]));
    }
    Ok(out)
}

/// Copy every row of `src` into `dst` (shapes must match).
pub fn copy_rows<S, D>(src: &S, dst: &mut D) -> Result<(), StackError>
where
    S: RowSource + ?Sized,
    D: RowSink + ?Sized,
{
    let (from, to) = (src.shape(), dst.shape());
    if from != to {
        return Err(StackError::StackShape {
            expected: to.dims(),
            found: from.dims(),
        });
    }
    for y in 0..from.rows {
        let row = src.read_row(y)?;
        dst.write_row(y, row.view())?;
    }
    Ok(())
}
