//! Pipeline invocation driver
//!
//! Owns the shared result slots of one pipeline run. The caller decides how
//! the rows are split into tasks; the driver only allocates the results,
//! executes a given task list (sequentially or on the rayon pool) and hands
//! the final matrices back.

use log::debug;
use rayon::prelude::*;

use crate::error::{PipelineError, Result};
use crate::matrix::{DenseMatrix, Element, Space};
use crate::pipeline::combine::CombineStrategy;
use crate::pipeline::inputs::ViewProvider;
use crate::pipeline::slot::SharedResultSlot;
use crate::pipeline::space::MemorySpace;
use crate::pipeline::task::{CompiledPipelineTask, TaskStats};

/// Result slots for one pipeline run
#[derive(Debug)]
pub struct PipelineInvocation<T: Element> {
    slots: Vec<SharedResultSlot<T>>,
}

impl<T: Element> PipelineInvocation<T> {
    pub fn new(slots: Vec<SharedResultSlot<T>>) -> Self {
        PipelineInvocation { slots }
    }

    /// Allocate one slot per output: zeroed `shape` for ROWS/COLS, empty for ADD
    pub fn allocate(strategies: &[CombineStrategy], shapes: &[(usize, usize)], space: Space) -> Result<Self> {
        if strategies.len() != shapes.len() {
            return Err(PipelineError::ArityMismatch {
                what: "output shapes",
                expected: strategies.len(),
                actual: shapes.len(),
            });
        }
        let slots = strategies
            .iter()
            .zip(shapes)
            .map(|(strategy, &(rows, cols))| match strategy {
                CombineStrategy::Rows | CombineStrategy::Cols => SharedResultSlot::zeros(rows, cols, space),
                CombineStrategy::Add => Ok(SharedResultSlot::empty()),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(slots))
    }

    /// Slots to build tasks against
    pub fn slots(&self) -> &[SharedResultSlot<T>] {
        &self.slots
    }

    pub fn num_outputs(&self) -> usize {
        self.slots.len()
    }

    /// Execute `tasks` on the rayon pool; the first fault wins
    ///
    /// Other tasks may still have run to completion; their writes stay.
    pub fn run_parallel<S, P>(&self, tasks: &mut [CompiledPipelineTask<'_, T, S, P>]) -> Result<Vec<TaskStats>>
    where
        S: MemorySpace<T>,
        P: ViewProvider<T> + Send,
    {
        debug!("invocation: {} tasks in parallel over {} outputs", tasks.len(), self.slots.len());
        tasks.par_iter_mut().map(|task| task.execute()).collect()
    }

    /// Execute `tasks` one after another on the calling thread
    pub fn run_sequential<S, P>(&self, tasks: &mut [CompiledPipelineTask<'_, T, S, P>]) -> Result<Vec<TaskStats>>
    where
        S: MemorySpace<T>,
        P: ViewProvider<T>,
    {
        debug!("invocation: {} tasks in sequence over {} outputs", tasks.len(), self.slots.len());
        tasks.iter_mut().map(|task| task.execute()).collect()
    }

    /// Final result matrices; `None` for an ADD output no task contributed to
    pub fn into_results(self) -> Vec<Option<DenseMatrix<T>>> {
        self.slots.into_iter().map(SharedResultSlot::into_inner).collect()
    }
}
