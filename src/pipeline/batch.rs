//! Batch partitioning of a task's row range
//!
//! `[rl, ru)` is cut into `[r, min(r + b, ru))` for `r = rl, rl + b, ...`.
//! Batches are contiguous, disjoint and ascending; only the last may be short.

use std::iter::FusedIterator;
use std::ops::Range;

/// Splits a row range into fixed-size batches
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchPartitioner {
    lower: usize,
    upper: usize,
    batch_size: usize,
}

impl BatchPartitioner {
    /// Partition `[lower, upper)` into batches of `batch_size` rows
    ///
    /// A batch size of zero means "one batch for the whole range".
    pub fn new(lower: usize, upper: usize, batch_size: usize) -> Self {
        let upper = upper.max(lower);
        let batch_size = if batch_size == 0 {
            (upper - lower).max(1)
        } else {
            batch_size
        };
        BatchPartitioner {
            lower,
            upper,
            batch_size,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches
    pub fn len(&self) -> usize {
        (self.upper - self.lower).div_ceil(self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.upper == self.lower
    }

    /// Fresh iterator over the batches; can be called any number of times
    pub fn iter(&self) -> Batches {
        Batches {
            next: self.lower,
            upper: self.upper,
            batch_size: self.batch_size,
        }
    }
}

impl IntoIterator for &BatchPartitioner {
    type Item = Range<usize>;
    type IntoIter = Batches;

    fn into_iter(self) -> Batches {
        self.iter()
    }
}

/// Lazy iterator over batch ranges
#[derive(Clone, Debug)]
pub struct Batches {
    next: usize,
    upper: usize,
    batch_size: usize,
}

impl Iterator for Batches {
    type Item = Range<usize>;

    #[inline]
    fn next(&mut self) -> Option<Range<usize>> {
        if self.next >= self.upper {
            return None;
        }
        let start = self.next;
        let end = start.saturating_add(self.batch_size).min(self.upper);
        self.next = end;
        Some(start..end)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = (self.upper - self.next.min(self.upper)).div_ceil(self.batch_size);
        (n, Some(n))
    }
}

impl ExactSizeIterator for Batches {}
impl FusedIterator for Batches {}
