//! Shared element storage behind every matrix and view
//!
//! A `Buffer` is allocated once and aliased by any number of row/column
//! views through an `Arc`. Mutation goes through one of two doors:
//!
//! 1. `as_mut_slice` on a uniquely owned buffer (`Arc::get_mut`), or
//! 2. the raw writers below, used only for regions that are exclusively
//!    claimed (shared result slots) or exclusively held by one device stream.

use std::cell::UnsafeCell;

use super::Element;
use crate::error::{PipelineError, Result};

pub(crate) struct Buffer<T> {
    cells: Box<[UnsafeCell<T>]>,
}

// SAFETY: concurrent access is either read-only, or writes into disjoint
// claimed regions, or happens through `&mut` on a unique buffer. See the
// module docs for the two write paths.
unsafe impl<T: Send> Send for Buffer<T> {}
unsafe impl<T: Send + Sync> Sync for Buffer<T> {}

impl<T: Element> Buffer<T> {
    /// Allocate `len` elements set to `value`, reporting failure instead of aborting
    pub(crate) fn try_filled(len: usize, value: T, rows: usize, cols: usize) -> Result<Self> {
        let mut data: Vec<T> = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| PipelineError::Allocation { rows, cols })?;
        data.resize(len, value);
        Ok(Self::from_vec(data))
    }

    pub(crate) fn from_vec(data: Vec<T>) -> Self {
        Buffer {
            cells: data.into_iter().map(UnsafeCell::new).collect(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline(always)]
    pub(crate) fn ptr(&self, idx: usize) -> *mut T {
        debug_assert!(idx < self.cells.len());
        UnsafeCell::raw_get(self.cells.as_ptr().wrapping_add(idx))
    }

    #[inline(always)]
    pub(crate) fn read(&self, idx: usize) -> T {
        // SAFETY: idx is bounds-checked by the slice index; no writer touches
        // a cell that is being read (disjoint claims / unique ownership).
        unsafe { *self.cells[idx].get() }
    }

    /// # Safety
    /// The caller must hold exclusive write access to `idx`.
    #[inline(always)]
    pub(crate) unsafe fn write(&self, idx: usize, value: T) {
        *self.cells[idx].get() = value;
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [T] {
        let len = self.cells.len();
        // SAFETY: UnsafeCell<T> is repr(transparent) over T and we hold &mut.
        unsafe { std::slice::from_raw_parts_mut(self.cells.as_mut_ptr() as *mut T, len) }
    }
}
