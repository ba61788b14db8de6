//! Disk-backed f64 stack for out-of-core processing.
//!
//! The buffer is an anonymous temporary file mapped read-write; the OS pages
//! rows in and out, so full-resolution stacks need not fit in memory. Layout
//! is C order over `[Y, X, Z, C, T]`, so one row is one contiguous range.

use memmap2::MmapMut;
use ndarray::{Array4, ArrayView4, ArrayViewMut4};

use super::{RowSink, RowSource, Stack, StackError, StackShape};

/// Memory-mapped scratch stack.
pub struct MappedStack {
    shape: StackShape,
    map: MmapMut,
}

impl MappedStack {
    /// Zero-filled buffer of the given shape.
    pub fn zeros(shape: StackShape) -> Result<Self, StackError> {
        shape.require_non_empty()?;
        let file = tempfile::tempfile()?;
        let bytes = shape.len() * std::mem::size_of::<f64>();
        file.set_len(bytes as u64)?;
        // The file is private to this process (unlinked temp file), so no
        // other mapping can alias it.
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self { shape, map })
    }

    /// Copy a source row by row into a fresh buffer.
    pub fn from_source<S: RowSource + ?Sized>(src: &S) -> Result<Self, StackError> {
        let mut out = Self::zeros(src.shape())?;
        super::copy_rows(src, &mut out)?;
        Ok(out)
    }

    #[inline]
    pub fn shape(&self) -> StackShape {
        self.shape
    }

    /// Materialize the whole buffer in memory.
    pub fn to_stack(&self) -> Result<Stack, StackError> {
        let d = self.shape.dims();
        Stack::from_shape_vec((d[0], d[1], d[2], d[3], d[4]), self.samples().to_vec()).map_err(
            |_| StackError::StackShape {
                expected: d,
                found: d,
            },
        )
    }

    fn samples(&self) -> &[f64] {
        bytemuck::cast_slice(&self.map[..])
    }

    fn samples_mut(&mut self) -> &mut [f64] {
        bytemuck::cast_slice_mut(&mut self.map[..])
    }

    fn row_range(&self, y: usize) -> std::ops::Range<usize> {
        let len = self.shape.row_len();
        y * len..(y + 1) * len
    }
}

impl RowSource for MappedStack {
    fn shape(&self) -> StackShape {
        self.shape
    }

    fn read_row(&self, y: usize) -> Result<Array4<f64>, StackError> {
        self.shape.check_row(y)?;
        let range = self.row_range(y);
        let view = ArrayView4::from_shape(self.shape.row_dims(), &self.samples()[range])
            .map_err(|_| StackError::RowOutOfRange {
                row: y,
                rows: self.shape.rows,
            })?;
        Ok(view.to_owned())
    }
}

impl RowSink for MappedStack {
    fn shape(&self) -> StackShape {
        self.shape
    }

    fn write_row(&mut self, y: usize, row: ArrayView4<'_, f64>) -> Result<(), StackError> {
        self.shape.check_row(y)?;
        self.shape.check_row_shape(&row)?;
        let dims = self.shape.row_dims();
        let range = self.row_range(y);
        let mut view = ArrayViewMut4::from_shape(dims, &mut self.samples_mut()[range]).map_err(
            |_| StackError::RowShape {
                expected: dims,
                found: row.shape().to_vec(),
            },
        )?;
        view.assign(&row);
        Ok(())
    }
}
