//! blawkvec: Vectorized pipeline task engine
//!
//! Runs compiled numeric pipelines over row-partitioned dense matrices:
//! zero-copy batch views, lock-free ROWS/COLS result writes, and a
//! partition → local-reduce → global-reduce path for ADD outputs. Host and
//! (simulated) device memory spaces share one task implementation.

pub mod builtins;
pub mod config;
pub mod device;
pub mod error;
pub mod matrix;
pub mod pipeline;

pub use config::EngineConfig;
pub use device::{DeviceSpace, DeviceStream, Event};
pub use error::{PipelineError, Result};
pub use matrix::{DenseMatrix, Element, Space};
pub use pipeline::{
    BatchPartitioner, CombineCode, CombineStrategy, CompiledPipelineTask, DevicePipelineTask,
    FunctionTable, HostPipelineTask, HostSpace, InputSplit, LocalReduce, MemorySpace, MergeOutcome,
    PipelineContext, PipelineInvocation, RowViewProvider, SharedResultSlot, TaskPartition, TaskState,
    TaskStats, ViewProvider,
};
