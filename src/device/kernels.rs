//! Device-side kernels
//!
//! These run from the stream with raw writes into their destination; the
//! issuing side guarantees exclusive access to it (claimed region or an
//! accumulator no one outside the stream aliases).

use crate::matrix::{DenseMatrix, Element};

/// Device-to-device copy of a `src.shape()` block into `dst`
///
/// One bulk copy when both sides are contiguous, one per row otherwise.
///
/// # Safety
/// `dst` must have the shape of `src` and be writable exclusively by the
/// caller until the copy has run.
pub(crate) unsafe fn copy_block<T: Element>(dst: &DenseMatrix<T>, src: &DenseMatrix<T>) {
    let (rows, cols) = src.shape();
    debug_assert_eq!(dst.shape(), (rows, cols));
    if rows == 0 || cols == 0 {
        return;
    }
    if dst.is_contiguous() && src.is_contiguous() {
        std::ptr::copy(src.row_ptr(0), dst.row_ptr(0), rows * cols);
    } else {
        for i in 0..rows {
            std::ptr::copy(src.row_ptr(i), dst.row_ptr(i), cols);
        }
    }
}

/// acc += rhs, elementwise
///
/// # Safety
/// Same shapes; the caller has exclusive write access to `acc` and `rhs`
/// does not overlap `acc` unless it is the same window.
pub(crate) unsafe fn add_assign<T: Element>(acc: &DenseMatrix<T>, rhs: &DenseMatrix<T>) {
    let (rows, cols) = acc.shape();
    debug_assert_eq!(rhs.shape(), (rows, cols));
    for i in 0..rows {
        for j in 0..cols {
            acc.write_raw(i, j, acc.get(i, j) + rhs.get(i, j));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_block_strided() {
        let dst = DenseMatrix::<f64>::zeros(3, 4).unwrap();
        let src = DenseMatrix::from_fn(3, 4, |i, j| (i * 4 + j) as f64);
        let dst_view = dst.slice(1, 3, 1, 3).unwrap();
        let src_view = src.slice(0, 2, 2, 4).unwrap();
        unsafe { copy_block(&dst_view, &src_view) };
        assert_eq!(dst.row(0), &[0.0; 4]);
        assert_eq!(dst.row(1), &[0.0, 2.0, 3.0, 0.0]);
        assert_eq!(dst.row(2), &[0.0, 6.0, 7.0, 0.0]);
    }

    #[test]
    fn test_copy_block_contiguous() {
        let dst = DenseMatrix::<f32>::zeros(4, 2).unwrap();
        let src = DenseMatrix::from_fn(2, 2, |i, j| (1 + i * 2 + j) as f32);
        unsafe { copy_block(&dst.slice_rows(2, 4).unwrap(), &src) };
        assert_eq!(dst.to_vec(), vec![0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_add_assign() {
        let acc = DenseMatrix::from_fn(2, 2, |i, j| (i + j) as f64);
        let rhs = DenseMatrix::from_fn(2, 2, |_, _| 0.5);
        unsafe { add_assign(&acc, &rhs) };
        assert_eq!(acc.to_vec(), vec![0.5, 1.5, 1.5, 2.5]);
    }
}
