//! Memory-space strategies
//!
//! The task's batch loop and merge logic are written once; a `MemorySpace`
//! supplies the data-movement primitives for where the matrices live.
//! [`HostSpace`] copies element by element and adds on the calling thread;
//! the device space (see `crate::device`) enqueues bulk copies and kernels on
//! an in-order stream and makes them visible at `fence`.

use crate::builtins::ewise::{check_same_shape, ew_add};
use crate::error::Result;
use crate::matrix::{DenseMatrix, Element, Space};
use crate::pipeline::slot::RegionWriter;

/// Data-movement primitives used by the result merger
pub trait MemorySpace<T: Element>: Send {
    /// Space every task matrix must live in
    fn space(&self) -> Space;

    /// Copy `src` into the claimed region at position `at` on the claim axis
    fn copy_range(&mut self, dst: &mut RegionWriter<'_, T>, at: usize, src: &DenseMatrix<T>) -> Result<()>;

    /// acc += rhs
    fn elementwise_add(&mut self, acc: &mut DenseMatrix<T>, rhs: &DenseMatrix<T>) -> Result<()>;

    /// Make every previously issued operation complete and visible
    fn fence(&mut self) -> Result<()>;

    /// Hook after each batch has been folded
    fn batch_done(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Host memory: element loops, synchronous adds
#[derive(Clone, Copy, Debug, Default)]
pub struct HostSpace;

impl<T: Element> MemorySpace<T> for HostSpace {
    fn space(&self) -> Space {
        Space::Host
    }

    fn copy_range(&mut self, dst: &mut RegionWriter<'_, T>, at: usize, src: &DenseMatrix<T>) -> Result<()> {
        let mut block = dst.block(at, src.shape())?;
        for i in 0..src.num_rows() {
            for j in 0..src.num_cols() {
                block.set(i, j, src.get(i, j));
            }
        }
        Ok(())
    }

    fn elementwise_add(&mut self, acc: &mut DenseMatrix<T>, rhs: &DenseMatrix<T>) -> Result<()> {
        check_same_shape("accumulate", acc, rhs)?;
        ew_add(acc, rhs)
    }

    fn fence(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::slot::{ClaimAxis, SharedResultSlot};

    #[test]
    fn test_host_copy_rows() {
        let mut slot = SharedResultSlot::<f64>::zeros(4, 2, Space::Host).unwrap();
        let src = DenseMatrix::from_fn(2, 2, |i, j| (i * 2 + j + 1) as f64);
        {
            let mut writer = slot.claim(0, ClaimAxis::Rows, 0..4, 0).unwrap();
            HostSpace.copy_range(&mut writer, 1, &src).unwrap();
        }
        assert_eq!(
            slot.take().unwrap().to_vec(),
            vec![0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_host_add() {
        let mut acc = DenseMatrix::from_fn(1, 3, |_, j| j as f32);
        let rhs = DenseMatrix::from_fn(1, 3, |_, _| 2.0_f32);
        MemorySpace::<f32>::elementwise_add(&mut HostSpace, &mut acc, &rhs).unwrap();
        assert_eq!(acc.to_vec(), vec![2.0, 3.0, 4.0]);
    }
}
