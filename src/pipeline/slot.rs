//! Shared result slots
//!
//! One slot per pipeline output, shared by every task of one invocation.
//!
//! - **ROWS/COLS**: the caller stores a full-size matrix before any task runs.
//!   Each task claims its translated range once, then writes its batches into
//!   the claimed region without taking any lock. Claims of live tasks must be
//!   disjoint; an overlapping claim fails with `OverlappingRange`.
//! - **ADD**: the slot starts empty. The first task to merge moves its
//!   accumulator in; later tasks add into it in place under the slot mutex.
//!
//! Results are read back through `&mut self` / `into_inner`, i.e. only after
//! every task borrowing the slot has finished.

use std::fmt;
use std::marker::PhantomData;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use log::trace;
use parking_lot::Mutex;

use crate::error::{PipelineError, Result};
use crate::matrix::{DenseMatrix, Element, Space};

/// Axis a ROWS/COLS region is claimed on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClaimAxis {
    Rows,
    Cols,
}

impl ClaimAxis {
    pub fn name(self) -> &'static str {
        match self {
            ClaimAxis::Rows => "row",
            ClaimAxis::Cols => "column",
        }
    }
}

#[derive(Debug)]
struct Claim {
    id: u64,
    axis: ClaimAxis,
    range: Range<usize>,
}

impl Claim {
    fn conflicts_with(&self, axis: ClaimAxis, range: &Range<usize>) -> bool {
        if self.range.is_empty() || range.is_empty() {
            return false;
        }
        if self.axis != axis {
            return true;
        }
        self.range.start < range.end && range.start < self.range.end
    }
}

/// Result cell for one pipeline output
pub struct SharedResultSlot<T: Element> {
    value: Mutex<Option<DenseMatrix<T>>>,
    claims: Mutex<Vec<Claim>>,
    next_claim: AtomicU64,
}

impl<T: Element> SharedResultSlot<T> {
    /// Empty slot, the starting state for ADD outputs
    pub fn empty() -> Self {
        SharedResultSlot {
            value: Mutex::new(None),
            claims: Mutex::new(Vec::new()),
            next_claim: AtomicU64::new(0),
        }
    }

    /// Slot holding a pre-allocated full-size result (ROWS/COLS)
    ///
    /// The matrix is detached from any outside alias so that region writes
    /// can never be observed through another handle.
    pub fn preallocated(mut matrix: DenseMatrix<T>) -> Result<Self> {
        matrix.make_unique()?;
        let slot = Self::empty();
        *slot.value.lock() = Some(matrix);
        Ok(slot)
    }

    /// Slot holding a zeroed `rows x cols` matrix in `space`
    pub fn zeros(rows: usize, cols: usize, space: Space) -> Result<Self> {
        Self::preallocated(DenseMatrix::filled(rows, cols, T::ZERO, space)?)
    }

    pub fn is_empty(&self) -> bool {
        self.value.lock().is_none()
    }

    /// Current result, once no task borrows the slot any more
    pub fn get_mut(&mut self) -> Option<&mut DenseMatrix<T>> {
        self.value.get_mut().as_mut()
    }

    pub fn take(&mut self) -> Option<DenseMatrix<T>> {
        self.value.get_mut().take()
    }

    pub fn into_inner(self) -> Option<DenseMatrix<T>> {
        self.value.into_inner()
    }

    /// Cell for the ADD hand-off
    pub(crate) fn cell(&self) -> &Mutex<Option<DenseMatrix<T>>> {
        &self.value
    }

    /// Number of live region claims
    pub fn active_claims(&self) -> usize {
        self.claims.lock().len()
    }

    /// Claim `range` on `axis` for lock-free writes
    ///
    /// For `Rows` the region is rows `range` across all columns. For `Cols`
    /// it is rows `[0, cross_extent)` and columns `range`.
    pub fn claim(
        &self,
        output: usize,
        axis: ClaimAxis,
        range: Range<usize>,
        cross_extent: usize,
    ) -> Result<RegionWriter<'_, T>> {
        let (claim_id, region) = {
            let mut value = self.value.lock();
            let result = value
                .as_mut()
                .ok_or(PipelineError::NotPreallocated { output })?;
            let mut claims = self.claims.lock();
            if claims.iter().any(|c| c.conflicts_with(axis, &range)) {
                return Err(PipelineError::OverlappingRange {
                    output,
                    axis: axis.name(),
                    start: range.start,
                    end: range.end,
                });
            }
            if claims.is_empty() {
                // First claimant: drop any alias picked up outside the slot
                result.make_unique()?;
            }
            let region = match axis {
                ClaimAxis::Rows => result.slice_rows(range.start, range.end)?,
                ClaimAxis::Cols => result.slice(0, cross_extent, range.start, range.end)?,
            };
            let id = self.next_claim.fetch_add(1, Ordering::Relaxed);
            claims.push(Claim {
                id,
                axis,
                range: range.clone(),
            });
            (id, region)
        };

        trace!("output {}: claimed {} range {:?}", output, axis.name(), range);
        Ok(RegionWriter {
            slot: self,
            claim_id,
            output,
            axis,
            range,
            region,
        })
    }

    fn release(&self, claim_id: u64) {
        self.claims.lock().retain(|c| c.id != claim_id);
    }
}

impl<T: Element> Default for SharedResultSlot<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Element> fmt::Debug for SharedResultSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.value.lock();
        f.debug_struct("SharedResultSlot")
            .field("shape", &value.as_ref().map(|m| m.shape()))
            .field("claims", &self.claims.lock().len())
            .finish()
    }
}

/// Exclusive write access to a claimed region of a shared result
///
/// Indices passed to [`block`](Self::block) are absolute positions on the
/// claimed axis (rows for ROWS, columns for COLS).
pub struct RegionWriter<'s, T: Element> {
    slot: &'s SharedResultSlot<T>,
    claim_id: u64,
    output: usize,
    axis: ClaimAxis,
    range: Range<usize>,
    region: DenseMatrix<T>,
}

impl<'s, T: Element> RegionWriter<'s, T> {
    pub fn axis(&self) -> ClaimAxis {
        self.axis
    }

    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn output(&self) -> usize {
        self.output
    }

    /// Memory space of the target result
    pub fn space(&self) -> Space {
        self.region.space()
    }

    /// Writer for the `shape` block placed at `at` on the claimed axis
    pub fn block(&mut self, at: usize, shape: (usize, usize)) -> Result<BlockWriter<'_, T>> {
        let view = self.sub_view(at, shape)?;
        Ok(BlockWriter {
            view,
            _region: PhantomData,
        })
    }

    /// Target view for asynchronous writers
    ///
    /// The returned view aliases the claimed region. Writes through it must
    /// complete before this writer is dropped (the device stream is fenced
    /// before claims are released).
    pub(crate) fn detach_block(&mut self, at: usize, shape: (usize, usize)) -> Result<DenseMatrix<T>> {
        self.sub_view(at, shape)
    }

    fn sub_view(&self, at: usize, (rows, cols): (usize, usize)) -> Result<DenseMatrix<T>> {
        let (len, cross, cross_expected) = match self.axis {
            ClaimAxis::Rows => (rows, cols, self.region.num_cols()),
            ClaimAxis::Cols => (cols, rows, self.region.num_rows()),
        };
        let end = at.checked_add(len).ok_or(PipelineError::OutOfBounds {
            context: "claimed region",
            index: at,
            bound: self.range.end,
        })?;
        if at < self.range.start || end > self.range.end {
            return Err(PipelineError::OutOfBounds {
                context: "claimed region",
                index: if at < self.range.start { at } else { end },
                bound: self.range.end,
            });
        }
        if cross != cross_expected {
            let expected = match self.axis {
                ClaimAxis::Rows => (rows, cross_expected),
                ClaimAxis::Cols => (cross_expected, cols),
            };
            return Err(PipelineError::DimensionMismatch {
                context: "result region",
                expected,
                actual: (rows, cols),
            });
        }
        let local = at - self.range.start;
        match self.axis {
            ClaimAxis::Rows => self.region.slice_rows(local, local + len),
            ClaimAxis::Cols => self.region.slice(0, rows, local, local + len),
        }
    }
}

impl<T: Element> Drop for RegionWriter<'_, T> {
    fn drop(&mut self) {
        self.slot.release(self.claim_id);
        trace!("output {}: released {} range {:?}", self.output, self.axis.name(), self.range);
    }
}

/// Writer for one block inside a claimed region
pub struct BlockWriter<'w, T: Element> {
    view: DenseMatrix<T>,
    _region: PhantomData<&'w mut ()>,
}

impl<T: Element> BlockWriter<'_, T> {
    pub fn shape(&self) -> (usize, usize) {
        self.view.shape()
    }

    /// Write (i, j) of the block
    ///
    /// # Panics
    /// Panics if (i, j) is outside the block.
    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: T) {
        let (rows, cols) = self.view.shape();
        assert!(i < rows && j < cols, "({}, {}) outside {}x{} block", i, j, rows, cols);
        // SAFETY: the block lies inside a region claimed exclusively by the
        // RegionWriter this writer mutably borrows.
        unsafe { self.view.write_raw(i, j, value) }
    }

    /// Copy `src` into row `i` of the block
    ///
    /// # Panics
    /// Panics if `i` is outside the block or `src` is not one block row long.
    pub fn copy_row(&mut self, i: usize, src: &[T]) {
        let (rows, cols) = self.view.shape();
        assert!(i < rows, "row {} outside {}-row block", i, rows);
        assert_eq!(src.len(), cols, "row length mismatch");
        if cols == 0 {
            return;
        }
        // SAFETY: exclusive claimed region, row bounds checked above;
        // `ptr::copy` tolerates overlap.
        unsafe { std::ptr::copy(src.as_ptr(), self.view.row_ptr(i), cols) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disjoint_row_claims() {
        let slot = SharedResultSlot::<f64>::zeros(8, 2, Space::Host).unwrap();
        let a = slot.claim(0, ClaimAxis::Rows, 0..4, 0).unwrap();
        let b = slot.claim(0, ClaimAxis::Rows, 4..8, 0).unwrap();
        assert_eq!(slot.active_claims(), 2);
        drop(a);
        drop(b);
        assert_eq!(slot.active_claims(), 0);
    }

    #[test]
    fn test_overlapping_claim_fails() {
        let slot = SharedResultSlot::<f64>::zeros(8, 2, Space::Host).unwrap();
        let _a = slot.claim(0, ClaimAxis::Rows, 0..5, 0).unwrap();
        let err = slot.claim(0, ClaimAxis::Rows, 4..8, 0).err().unwrap();
        assert_eq!(
            err,
            PipelineError::OverlappingRange {
                output: 0,
                axis: "row",
                start: 4,
                end: 8
            }
        );
    }

    #[test]
    fn test_claim_released_allows_reclaim() {
        let slot = SharedResultSlot::<f64>::zeros(4, 1, Space::Host).unwrap();
        drop(slot.claim(0, ClaimAxis::Rows, 0..4, 0).unwrap());
        assert!(slot.claim(0, ClaimAxis::Rows, 0..4, 0).is_ok());
    }

    #[test]
    fn test_claim_on_empty_slot() {
        let slot = SharedResultSlot::<f64>::empty();
        assert_eq!(
            slot.claim(2, ClaimAxis::Rows, 0..1, 0).err(),
            Some(PipelineError::NotPreallocated { output: 2 })
        );
    }

    #[test]
    fn test_row_block_write() {
        let mut slot = SharedResultSlot::<f64>::zeros(6, 2, Space::Host).unwrap();
        {
            let mut writer = slot.claim(0, ClaimAxis::Rows, 2..6, 0).unwrap();
            assert_eq!(writer.axis(), ClaimAxis::Rows);
            assert_eq!(writer.range(), 2..6);
            assert_eq!(writer.output(), 0);
            let mut block = writer.block(3, (2, 2)).unwrap();
            assert_eq!(block.shape(), (2, 2));
            block.set(0, 0, 1.0);
            block.copy_row(1, &[2.0, 3.0]);
        }
        let result = slot.take().unwrap();
        assert_eq!(
            result.to_vec(),
            vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 2.0, 3.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_col_block_write() {
        let slot = SharedResultSlot::<f64>::zeros(3, 5, Space::Host).unwrap();
        {
            let mut writer = slot.claim(0, ClaimAxis::Cols, 1..4, 2).unwrap();
            let mut block = writer.block(2, (2, 2)).unwrap();
            block.copy_row(0, &[1.0, 2.0]);
            block.copy_row(1, &[3.0, 4.0]);
        }
        let result = slot.into_inner().unwrap();
        assert_eq!(result.row(0), &[0.0, 0.0, 1.0, 2.0, 0.0]);
        assert_eq!(result.row(1), &[0.0, 0.0, 3.0, 4.0, 0.0]);
        assert_eq!(result.row(2), &[0.0; 5]);
    }

    #[test]
    fn test_block_outside_claim() {
        let slot = SharedResultSlot::<f64>::zeros(6, 2, Space::Host).unwrap();
        let mut writer = slot.claim(0, ClaimAxis::Rows, 0..3, 0).unwrap();
        assert!(matches!(
            writer.block(2, (2, 2)),
            Err(PipelineError::OutOfBounds { .. })
        ));
        assert!(matches!(
            writer.block(0, (2, 3)),
            Err(PipelineError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_preallocated_detaches_alias() {
        let original = DenseMatrix::<f64>::zeros(2, 2).unwrap();
        let mut slot = SharedResultSlot::preallocated(original.clone()).unwrap();
        {
            let mut writer = slot.claim(0, ClaimAxis::Rows, 0..2, 0).unwrap();
            writer.block(0, (1, 2)).unwrap().copy_row(0, &[5.0, 6.0]);
        }
        assert_eq!(original.to_vec(), vec![0.0; 4]);
        assert_eq!(slot.get_mut().unwrap().row(0), &[5.0, 6.0]);
    }

    #[test]
    fn test_mixed_axis_claims_conflict() {
        let slot = SharedResultSlot::<f64>::zeros(4, 4, Space::Host).unwrap();
        let _rows = slot.claim(0, ClaimAxis::Rows, 0..1, 0).unwrap();
        assert!(slot.claim(0, ClaimAxis::Cols, 2..3, 4).is_err());
    }
}
