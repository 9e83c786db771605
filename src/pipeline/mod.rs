//! Vectorized pipeline tasks
//!
//! A compiled pipeline is run over a row range split into tasks; each task
//! splits its range into batches and calls the pipeline function once per
//! batch. Batch outputs fold into the shared results per output strategy.
//!
//! ## Architecture
//!
//! ```text
//! PipelineInvocation (result slots)
//!     ↓ caller builds tasks over disjoint row ranges
//! CompiledPipelineTask [rl, ru)
//!     ↓ BatchPartitioner
//! batch [r, r + b) ── ViewProvider ──▶ PipelineFn ──▶ ResultMerger
//!                                                       ├─ ROWS/COLS: claimed region, no lock
//!                                                       └─ ADD: LocalReduce, then slot mutex
//! ```
//!
//! ## Combine strategies
//!
//! - **ROWS** (1): batch rows land at `[start - offset, end - offset)`
//! - **COLS** (2): batch rows land on the result's column axis
//! - **ADD** (3): elementwise sum across all batches of all tasks
//!
//! Host and device tasks share the control flow; see [`MemorySpace`].

pub mod batch;
pub mod combine;
pub mod function;
pub mod inputs;
pub mod invocation;
pub mod merger;
pub mod reduce;
pub mod slot;
pub mod space;
pub mod task;

pub use batch::{BatchPartitioner, Batches};
pub use combine::{CombineCode, CombineStrategy};
pub use function::{FunctionTable, OutputSlots, PipelineContext, PipelineFn};
pub use inputs::{InputSplit, InputViews, RowViewProvider, ScopedInputs, ViewProvider};
pub use invocation::PipelineInvocation;
pub use merger::{merge_add, AddPartial, ResultMerger};
pub use reduce::{LocalReduce, MergeOutcome};
pub use slot::{BlockWriter, ClaimAxis, RegionWriter, SharedResultSlot};
pub use space::{HostSpace, MemorySpace};
pub use task::{
    CompiledPipelineTask, DevicePipelineTask, HostPipelineTask, TaskPartition, TaskState, TaskStats,
};
