//! Elementwise kernels used by result merging
//!
//! Host-side tight loops over rows. Device counterparts live in
//! `device::kernels` and operate on raw row pointers instead.

use crate::error::{PipelineError, Result};
use crate::matrix::{DenseMatrix, Element};

/// Check that two matrices have the same shape
#[inline]
pub fn check_same_shape<T: Element>(
    context: &'static str,
    expected: &DenseMatrix<T>,
    actual: &DenseMatrix<T>,
) -> Result<()> {
    if expected.shape() != actual.shape() {
        return Err(PipelineError::DimensionMismatch {
            context,
            expected: expected.shape(),
            actual: actual.shape(),
        });
    }
    Ok(())
}

/// acc += rhs, in place
///
/// `acc` is detached from any alias before it is written, so a batch output
/// that happens to be a view of an input never leaks the sum back into the
/// input.
pub fn ew_add<T: Element>(acc: &mut DenseMatrix<T>, rhs: &DenseMatrix<T>) -> Result<()> {
    check_same_shape("elementwise add", acc, rhs)?;
    acc.for_each_row_mut(|i, row| {
        let src = rhs.row(i);
        for (a, &b) in row.iter_mut().zip(src) {
            *a = *a + b;
        }
    })
}

/// Sum of all elements (f64 accumulation)
pub fn sum_all<T: Element>(m: &DenseMatrix<T>) -> f64 {
    let mut result = 0.0;
    for i in 0..m.num_rows() {
        for &v in m.row(i) {
            result += v.to_f64();
        }
    }
    result
}
