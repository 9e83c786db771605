//! Partition → local reduce → global reduce
//!
//! Each worker folds its own partial results without any synchronization,
//! then contends once for the shared cell. The shared mutex is only held for
//! the emptiness check plus a move, or for one in-place combine.
//!
//! Nothing here knows about matrices: `V` is any value with a commutative,
//! associative combine.

use parking_lot::Mutex;

/// What happened when a local partial met the shared cell
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Nothing was folded locally; the shared cell was not touched
    Empty,
    /// Shared cell was empty and took the local value without copying
    TookSlot,
    /// Local value was combined into the existing shared value
    MergedInPlace,
}

/// Worker-local partial result
#[derive(Debug)]
pub struct LocalReduce<V> {
    acc: Option<V>,
    folds: usize,
}

impl<V> LocalReduce<V> {
    pub fn new() -> Self {
        LocalReduce { acc: None, folds: 0 }
    }

    /// Fold one partial value
    ///
    /// The first value becomes the accumulator as-is; later values are
    /// combined into it.
    pub fn fold<E, F>(&mut self, value: V, combine: F) -> Result<(), E>
    where
        F: FnOnce(&mut V, V) -> Result<(), E>,
    {
        if let Some(acc) = self.acc.as_mut() {
            combine(acc, value)?;
        } else {
            self.acc = Some(value);
        }
        self.folds += 1;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.acc.is_none()
    }

    /// Number of values folded so far
    pub fn folds(&self) -> usize {
        self.folds
    }

    pub fn get(&self) -> Option<&V> {
        self.acc.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut V> {
        self.acc.as_mut()
    }

    pub fn into_inner(self) -> Option<V> {
        self.acc
    }

    /// Fold the local partial into the shared cell
    ///
    /// `combine` runs with the lock held and must leave the shared value
    /// complete before returning. The local value is dropped after the lock
    /// is released.
    pub fn merge_into<E, F>(self, cell: &Mutex<Option<V>>, combine: F) -> Result<MergeOutcome, E>
    where
        F: FnOnce(&mut V, &V) -> Result<(), E>,
    {
        let Some(local) = self.acc else {
            return Ok(MergeOutcome::Empty);
        };

        let mut shared = cell.lock();
        match shared.as_mut() {
            None => {
                *shared = Some(local);
                Ok(MergeOutcome::TookSlot)
            }
            Some(value) => {
                let combined = combine(value, &local);
                drop(shared);
                drop(local);
                combined.map(|_| MergeOutcome::MergedInPlace)
            }
        }
    }
}

impl<V> Default for LocalReduce<V> {
    fn default() -> Self {
        Self::new()
    }
}
