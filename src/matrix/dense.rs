//! Dense matrix and zero-copy views
//!
//! Cloning a `DenseMatrix` or slicing it is O(1): the result aliases the same
//! buffer. Dropping a view only drops a reference; the storage is freed when
//! the last alias goes away.

use std::fmt;
use std::sync::Arc;

use super::buffer::Buffer;
use super::{Element, Space};
use crate::error::{PipelineError, Result};

/// Row-major matrix window over a shared buffer
#[derive(Clone)]
pub struct DenseMatrix<T: Element> {
    buffer: Arc<Buffer<T>>,
    space: Space,
    /// Buffer index of element (0, 0)
    start: usize,
    num_rows: usize,
    num_cols: usize,
    row_skip: usize,
}

impl<T: Element> DenseMatrix<T> {
    /// Allocate a matrix filled with `value` in the given memory space
    pub fn filled(num_rows: usize, num_cols: usize, value: T, space: Space) -> Result<Self> {
        let len = num_rows
            .checked_mul(num_cols)
            .ok_or(PipelineError::Allocation {
                rows: num_rows,
                cols: num_cols,
            })?;
        let buffer = Buffer::try_filled(len, value, num_rows, num_cols)?;
        Ok(DenseMatrix {
            buffer: Arc::new(buffer),
            space,
            start: 0,
            num_rows,
            num_cols,
            row_skip: num_cols,
        })
    }

    /// Allocate a zeroed host matrix
    pub fn zeros(num_rows: usize, num_cols: usize) -> Result<Self> {
        Self::filled(num_rows, num_cols, T::ZERO, Space::Host)
    }

    /// Wrap row-major host data
    pub fn from_vec(num_rows: usize, num_cols: usize, data: Vec<T>) -> Result<Self> {
        if num_rows.checked_mul(num_cols) != Some(data.len()) {
            return Err(PipelineError::DimensionMismatch {
                context: "from_vec",
                expected: (num_rows, num_cols),
                actual: (data.len(), 1),
            });
        }
        Ok(DenseMatrix {
            buffer: Arc::new(Buffer::from_vec(data)),
            space: Space::Host,
            start: 0,
            num_rows,
            num_cols,
            row_skip: num_cols,
        })
    }

    /// Build a host matrix from a generator over (row, col)
    pub fn from_fn<F>(num_rows: usize, num_cols: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> T,
    {
        let mut data = Vec::with_capacity(num_rows * num_cols);
        for i in 0..num_rows {
            for j in 0..num_cols {
                data.push(f(i, j));
            }
        }
        DenseMatrix {
            buffer: Arc::new(Buffer::from_vec(data)),
            space: Space::Host,
            start: 0,
            num_rows,
            num_cols,
            row_skip: num_cols,
        }
    }

    /// Compact copy of this window into `space` (host/device transfer)
    pub fn to_space(&self, space: Space) -> Result<Self> {
        let mut out = Self::filled(self.num_rows, self.num_cols, T::ZERO, space)?;
        out.for_each_row_mut(|i, row| row.copy_from_slice(self.row(i)))?;
        Ok(out)
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    #[inline]
    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    #[inline]
    pub fn row_skip(&self) -> usize {
        self.row_skip
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.num_rows, self.num_cols)
    }

    #[inline]
    pub fn space(&self) -> Space {
        self.space
    }

    /// Rows are laid out back to back with no gap
    #[inline]
    pub fn is_contiguous(&self) -> bool {
        self.row_skip == self.num_cols || self.num_rows <= 1
    }

    /// Size of the window in bytes
    pub fn buffer_size(&self) -> usize {
        self.num_rows * self.num_cols * std::mem::size_of::<T>()
    }

    #[inline(always)]
    fn index(&self, i: usize, j: usize) -> usize {
        self.start + i * self.row_skip + j
    }

    /// Element at (i, j)
    ///
    /// # Panics
    /// Panics if (i, j) is outside the window.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> T {
        assert!(
            i < self.num_rows && j < self.num_cols,
            "index ({}, {}) out of bounds for {}x{} matrix",
            i,
            j,
            self.num_rows,
            self.num_cols
        );
        self.buffer.read(self.index(i, j))
    }

    /// Row `i` as a slice
    ///
    /// # Panics
    /// Panics if `i` is outside the window.
    pub fn row(&self, i: usize) -> &[T] {
        assert!(i < self.num_rows, "row {} out of bounds for {} rows", i, self.num_rows);
        if self.num_cols == 0 {
            return &[];
        }
        let base = self.index(i, 0);
        assert!(base + self.num_cols <= self.buffer.len());
        // SAFETY: range checked against the buffer; cells in a window that is
        // being read are never written concurrently.
        unsafe { std::slice::from_raw_parts(self.buffer.ptr(base), self.num_cols) }
    }

    /// Row-major copy of the window
    pub fn to_vec(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.num_rows * self.num_cols);
        for i in 0..self.num_rows {
            out.extend_from_slice(self.row(i));
        }
        out
    }

    /// Zero-copy view of rows `[rl, ru)`
    pub fn slice_rows(&self, rl: usize, ru: usize) -> Result<Self> {
        self.slice(rl, ru, 0, self.num_cols)
    }

    /// Zero-copy view of rows `[rl, ru)` and columns `[cl, cu)`
    pub fn slice(&self, rl: usize, ru: usize, cl: usize, cu: usize) -> Result<Self> {
        if rl > ru || ru > self.num_rows {
            return Err(PipelineError::OutOfBounds {
                context: "row slice",
                index: ru.max(rl),
                bound: self.num_rows,
            });
        }
        if cl > cu || cu > self.num_cols {
            return Err(PipelineError::OutOfBounds {
                context: "column slice",
                index: cu.max(cl),
                bound: self.num_cols,
            });
        }
        let start = if ru > rl && cu > cl {
            self.index(rl, cl)
        } else {
            self.start
        };
        Ok(DenseMatrix {
            buffer: Arc::clone(&self.buffer),
            space: self.space,
            start,
            num_rows: ru - rl,
            num_cols: cu - cl,
            row_skip: self.row_skip,
        })
    }

    /// Both windows alias the same storage
    pub fn shares_buffer_with(&self, other: &DenseMatrix<T>) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }

    /// Number of live handles (matrices and views) on the underlying buffer
    pub fn alias_count(&self) -> usize {
        Arc::strong_count(&self.buffer)
    }

    pub(crate) fn buffer_id(&self) -> usize {
        Arc::as_ptr(&self.buffer) as *const () as usize
    }

    /// Detach from every other alias, copying the window if it is shared
    pub fn make_unique(&mut self) -> Result<()> {
        if Arc::get_mut(&mut self.buffer).is_some() {
            return Ok(());
        }
        *self = self.to_space(self.space)?;
        Ok(())
    }

    /// Set (i, j), detaching from aliases first
    pub fn set(&mut self, i: usize, j: usize, value: T) -> Result<()> {
        if i >= self.num_rows || j >= self.num_cols {
            return Err(PipelineError::OutOfBounds {
                context: "set",
                index: i.max(j),
                bound: self.num_rows.min(self.num_cols),
            });
        }
        self.make_unique()?;
        let idx = self.index(i, j);
        self.unique_slice()?[idx] = value;
        Ok(())
    }

    /// Visit each row mutably after detaching from aliases
    pub fn for_each_row_mut<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(usize, &mut [T]),
    {
        self.make_unique()?;
        let (start, rows, cols, skip) = (self.start, self.num_rows, self.num_cols, self.row_skip);
        let data = self.unique_slice()?;
        for i in 0..rows {
            let base = start + i * skip;
            f(i, &mut data[base..base + cols]);
        }
        Ok(())
    }

    fn unique_slice(&mut self) -> Result<&mut [T]> {
        Arc::get_mut(&mut self.buffer)
            .map(Buffer::as_mut_slice)
            .ok_or(PipelineError::InvalidState {
                expected: "unique buffer",
                actual: "shared buffer",
            })
    }

    /// Raw pointer to the first element of row `i`
    pub(crate) fn row_ptr(&self, i: usize) -> *mut T {
        self.buffer.ptr(self.index(i, 0))
    }

    /// # Safety
    /// The caller must hold exclusive write access to (i, j), e.g. through a
    /// claimed result region, and (i, j) must be inside the window.
    #[inline(always)]
    pub(crate) unsafe fn write_raw(&self, i: usize, j: usize, value: T) {
        debug_assert!(i < self.num_rows && j < self.num_cols);
        self.buffer.write(self.index(i, j), value);
    }
}

impl<T: Element> fmt::Debug for DenseMatrix<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DenseMatrix")
            .field("rows", &self.num_rows)
            .field("cols", &self.num_cols)
            .field("row_skip", &self.row_skip)
            .field("space", &self.space)
            .finish()
    }
}

impl<T: Element> PartialEq for DenseMatrix<T> {
    fn eq(&self, other: &Self) -> bool {
        self.shape() == other.shape() && (0..self.num_rows).all(|i| self.row(i) == other.row(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_matrix() -> DenseMatrix<f64> {
        // 4x3 matrix with values a[i][j] = 10*i + j
        DenseMatrix::from_fn(4, 3, |i, j| (10 * i + j) as f64)
    }

    #[test]
    fn test_slice_rows_is_zero_copy() {
        let m = make_test_matrix();
        let view = m.slice_rows(1, 3).unwrap();

        assert!(view.shares_buffer_with(&m));
        assert_eq!(view.shape(), (2, 3));
        assert_eq!(view.row_skip(), 3);
        assert_eq!(view.get(0, 0), 10.0);
        assert_eq!(view.get(1, 2), 22.0);
    }

    #[test]
    fn test_column_slice_keeps_row_skip() {
        let m = make_test_matrix();
        let view = m.slice(0, 4, 1, 3).unwrap();

        assert_eq!(view.shape(), (4, 2));
        assert_eq!(view.row_skip(), 3);
        assert!(!view.is_contiguous());
        assert_eq!(view.row(2), &[21.0, 22.0]);
    }

    #[test]
    fn test_dropping_view_keeps_storage() {
        let m = make_test_matrix();
        {
            let view = m.slice_rows(0, 2).unwrap();
            assert_eq!(m.alias_count(), 2);
            drop(view);
        }
        assert_eq!(m.alias_count(), 1);
        assert_eq!(m.get(3, 2), 32.0);
    }

    #[test]
    fn test_slice_out_of_bounds() {
        let m = make_test_matrix();
        assert!(matches!(
            m.slice_rows(2, 5),
            Err(PipelineError::OutOfBounds { context: "row slice", .. })
        ));
        assert!(m.slice(0, 1, 2, 4).is_err());
    }

    #[test]
    fn test_set_on_view_detaches() {
        let m = make_test_matrix();
        let mut view = m.slice_rows(1, 2).unwrap();
        view.set(0, 0, -1.0).unwrap();

        assert!(!view.shares_buffer_with(&m));
        assert_eq!(view.get(0, 0), -1.0);
        assert_eq!(m.get(1, 0), 10.0); // source untouched
    }

    #[test]
    fn test_to_space_copies() {
        let m = make_test_matrix();
        let d = m.slice(1, 3, 1, 2).unwrap().to_space(Space::Device).unwrap();

        assert_eq!(d.space(), Space::Device);
        assert!(d.is_contiguous());
        assert_eq!(d.to_vec(), vec![11.0, 21.0]);
    }

    #[test]
    fn test_from_vec_shape_check() {
        assert!(DenseMatrix::<f32>::from_vec(2, 2, vec![1.0; 3]).is_err());
        let m = DenseMatrix::<f32>::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(m.get(1, 0), 3.0);
    }

    #[test]
    fn test_empty_slice() {
        let m = make_test_matrix();
        let view = m.slice_rows(4, 4).unwrap();
        assert_eq!(view.shape(), (0, 3));
        assert!(view.to_vec().is_empty());
    }
}
