//! Compiled pipeline tasks
//!
//! A task owns one row range of a pipeline invocation and runs it to
//! completion on the calling thread:
//!
//! ```text
//! Idle ──validate──▶ Running ──fence, release claims──▶ Merging ──▶ Done
//!                       │                                  │
//!                       └──────────── any fault ───────────┴──▶ Failed
//! ```
//!
//! **Running** walks the batches strictly in order: acquire input views, call
//! the pipeline function, fold its outputs (ROWS/COLS straight into the
//! claimed result region, ADD into a task-local accumulator), release views.
//! **Merging** hands every ADD accumulator to its shared slot under the slot
//! mutex. Host and device tasks share this control flow and differ only in
//! their [`MemorySpace`].
//!
//! A task executes once. Faults are terminal: writes already made to shared
//! results stay, and discarding the invocation is up to the caller.

use std::ops::Range;
use std::sync::Arc;

use log::{debug, trace};

use crate::device::DeviceSpace;
use crate::error::{PipelineError, Result};
use crate::matrix::{DenseMatrix, Element};
use crate::pipeline::batch::BatchPartitioner;
use crate::pipeline::combine::{CombineCode, CombineStrategy};
use crate::pipeline::function::{FunctionTable, PipelineContext, PipelineFn};
use crate::pipeline::inputs::{RowViewProvider, ScopedInputs, ViewProvider};
use crate::pipeline::merger::{merge_add, ResultMerger};
use crate::pipeline::reduce::MergeOutcome;
use crate::pipeline::slot::SharedResultSlot;
use crate::pipeline::space::{HostSpace, MemorySpace};

/// Immutable description of one task's share of a pipeline invocation
#[derive(Clone, Debug)]
pub struct TaskPartition<T: Element> {
    rl: usize,
    ru: usize,
    offset: usize,
    batch_size: usize,
    combines: Vec<CombineCode>,
    out_rows: Vec<usize>,
    funcs: Arc<FunctionTable<T>>,
    ctx: Arc<PipelineContext>,
    fid: usize,
}

impl<T: Element> TaskPartition<T> {
    /// Rows `[rl, ru)` running function 0 of `funcs`, no outputs yet
    pub fn new(rl: usize, ru: usize, funcs: Arc<FunctionTable<T>>, ctx: Arc<PipelineContext>) -> Self {
        TaskPartition {
            rl,
            ru: ru.max(rl),
            offset: 0,
            batch_size: 0,
            combines: Vec::new(),
            out_rows: Vec::new(),
            funcs,
            ctx,
            fid: 0,
        }
    }

    /// Global-to-local row translation for result coordinates
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Rows per batch; 0 falls back to the engine config, then to one batch
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Declare the next output: its combine code and, for COLS, the result rows
    pub fn with_output(mut self, combine: CombineCode, expected_rows: usize) -> Self {
        self.combines.push(combine);
        self.out_rows.push(expected_rows);
        self
    }

    pub fn with_function(mut self, fid: usize) -> Self {
        self.fid = fid;
        self
    }

    pub fn row_range(&self) -> Range<usize> {
        self.rl..self.ru
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn num_outputs(&self) -> usize {
        self.combines.len()
    }

    pub fn combines(&self) -> &[CombineCode] {
        &self.combines
    }

    pub fn expected_rows(&self) -> &[usize] {
        &self.out_rows
    }

    pub fn fid(&self) -> usize {
        self.fid
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    pub fn functions(&self) -> &FunctionTable<T> {
        &self.funcs
    }

    /// Batch size after falling back to the engine config
    pub fn effective_batch_size(&self) -> usize {
        if self.batch_size > 0 {
            self.batch_size
        } else {
            self.ctx.config().batch_size
        }
    }

    pub fn batches(&self) -> BatchPartitioner {
        BatchPartitioner::new(self.rl, self.ru, self.effective_batch_size())
    }

    /// Decode every combine code; the first unknown one is a configuration fault
    pub fn strategies(&self) -> Result<Vec<CombineStrategy>> {
        self.combines.iter().map(|&c| CombineStrategy::from_code(c)).collect()
    }
}

/// Lifecycle of one task execution
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running,
    Merging,
    Done,
    Failed,
}

impl TaskState {
    pub fn name(self) -> &'static str {
        match self {
            TaskState::Idle => "idle",
            TaskState::Running => "running",
            TaskState::Merging => "merging",
            TaskState::Done => "done",
            TaskState::Failed => "failed",
        }
    }
}

/// What one task execution did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskStats {
    /// Pipeline-function calls
    pub batches: usize,
    /// Rows covered by those calls
    pub rows: usize,
    pub views_created: usize,
    pub views_released: usize,
    /// ADD outputs handed to their shared slot
    pub add_outputs: usize,
    /// ... of which found the slot empty and moved the accumulator in
    pub add_took_slot: usize,
    /// ... of which added into an existing slot value
    pub add_merged_in_place: usize,
}

/// One unit of work of a compiled pipeline invocation
pub struct CompiledPipelineTask<'a, T, S = HostSpace, P = RowViewProvider<T>>
where
    T: Element,
    S: MemorySpace<T>,
    P: ViewProvider<T>,
{
    partition: TaskPartition<T>,
    provider: P,
    space: S,
    results: &'a [SharedResultSlot<T>],
    state: TaskState,
}

/// Task over host matrices
pub type HostPipelineTask<'a, T> = CompiledPipelineTask<'a, T, HostSpace, RowViewProvider<T>>;

/// Task over device matrices
pub type DevicePipelineTask<'a, T> = CompiledPipelineTask<'a, T, DeviceSpace, RowViewProvider<T>>;

impl<'a, T: Element> CompiledPipelineTask<'a, T, HostSpace, RowViewProvider<T>> {
    pub fn host(
        partition: TaskPartition<T>,
        inputs: RowViewProvider<T>,
        results: &'a [SharedResultSlot<T>],
    ) -> Self {
        Self::with_space(partition, inputs, HostSpace, results)
    }
}

impl<'a, T: Element> CompiledPipelineTask<'a, T, DeviceSpace, RowViewProvider<T>> {
    /// Device task with its own stream, configured from the partition's context
    pub fn device(
        partition: TaskPartition<T>,
        inputs: RowViewProvider<T>,
        results: &'a [SharedResultSlot<T>],
    ) -> Self {
        let space = DeviceSpace::from_config(partition.context().config());
        Self::with_space(partition, inputs, space, results)
    }
}

impl<'a, T, S, P> CompiledPipelineTask<'a, T, S, P>
where
    T: Element,
    S: MemorySpace<T>,
    P: ViewProvider<T>,
{
    pub fn with_space(partition: TaskPartition<T>, provider: P, space: S, results: &'a [SharedResultSlot<T>]) -> Self {
        CompiledPipelineTask {
            partition,
            provider,
            space,
            results,
            state: TaskState::Idle,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn partition(&self) -> &TaskPartition<T> {
        &self.partition
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn space(&self) -> &S {
        &self.space
    }

    /// Run the task: validate, batch loop, ADD hand-off
    ///
    /// Only an `Idle` task executes; anything else is `InvalidState`.
    pub fn execute(&mut self) -> Result<TaskStats> {
        if self.state != TaskState::Idle {
            return Err(PipelineError::InvalidState {
                expected: TaskState::Idle.name(),
                actual: self.state.name(),
            });
        }

        match self.run() {
            Ok(stats) => {
                self.state = TaskState::Done;
                debug!(
                    "task {:?}: done, {} batches, {} ADD hand-offs",
                    self.partition.row_range(),
                    stats.batches,
                    stats.add_outputs
                );
                Ok(stats)
            }
            Err(e) => {
                debug!("task {:?}: failed in {}: {}", self.partition.row_range(), self.state.name(), e);
                self.state = TaskState::Failed;
                Err(e)
            }
        }
    }

    fn run(&mut self) -> Result<TaskStats> {
        // Nothing is created or written before these pass
        let strategies = self.partition.strategies()?;
        let func = self.partition.functions().get(self.partition.fid())?;
        if self.results.len() != self.partition.num_outputs() {
            return Err(PipelineError::ArityMismatch {
                what: "result slots",
                expected: self.partition.num_outputs(),
                actual: self.results.len(),
            });
        }
        let rows = self.partition.row_range();
        self.provider.validate(self.space.space(), rows.end)?;

        self.state = TaskState::Running;
        let batches = self.partition.batches();
        debug!(
            "task {:?}: running {} batches of {} rows ({} outputs)",
            rows,
            batches.len(),
            batches.batch_size(),
            strategies.len()
        );

        let mut stats = TaskStats::default();
        let mut merger = ResultMerger::prepare(
            self.results,
            &strategies,
            self.partition.expected_rows(),
            rows,
            self.partition.offset(),
        )?;
        let running = run_batches(
            &self.partition,
            &batches,
            &mut self.provider,
            &mut self.space,
            &mut merger,
            func.as_ref(),
            &mut stats,
        );
        // Every path fences before the claims go away
        let fenced = self.space.fence();
        let partials = merger.into_add_partials();
        running?;
        fenced?;

        self.state = TaskState::Merging;
        stats.add_outputs = partials.len();
        for outcome in merge_add(self.results, partials, &mut self.space)? {
            match outcome {
                MergeOutcome::TookSlot => stats.add_took_slot += 1,
                MergeOutcome::MergedInPlace => stats.add_merged_in_place += 1,
                MergeOutcome::Empty => {}
            }
        }
        Ok(stats)
    }
}

fn run_batches<T, S, P>(
    partition: &TaskPartition<T>,
    batches: &BatchPartitioner,
    provider: &mut P,
    space: &mut S,
    merger: &mut ResultMerger<'_, T>,
    func: &PipelineFn<T>,
    stats: &mut TaskStats,
) -> Result<()>
where
    T: Element,
    S: MemorySpace<T>,
    P: ViewProvider<T>,
{
    let ctx = partition.context();
    let mut outputs: Vec<Option<DenseMatrix<T>>> = vec![None; merger.num_outputs()];

    for batch in batches {
        let inputs = ScopedInputs::acquire(&mut *provider, batch.start, batch.end)?;
        stats.views_created += inputs.created_count();
        let called = func(outputs.as_mut_slice(), inputs.inputs(), ctx);
        stats.views_released += inputs.release();
        called?;

        merger.accumulate(space, outputs.as_mut_slice(), batch.clone())?;
        space.batch_done()?;

        stats.batches += 1;
        stats.rows += batch.len();
        trace!("batch {:?} done", batch);
    }
    Ok(())
}
