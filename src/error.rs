//! Error taxonomy for pipeline tasks
//!
//! Every fault is terminal for the task that hits it. There is no retry and
//! no rollback: writes already committed to shared slots stay where they are,
//! and discarding the invocation result is up to the caller.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Faults raised while validating, running or merging a pipeline task
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    /// Combine code outside ROWS/COLS/ADD (configuration fault)
    #[error("combine strategy `{0}` not supported")]
    UnsupportedCombine(i64),

    /// Split code outside NONE/ROWS (configuration fault)
    #[error("input split `{0}` not supported")]
    UnsupportedSplit(i64),

    /// Allocator could not satisfy a request
    #[error("allocation of {rows}x{cols} matrix failed")]
    Allocation { rows: usize, cols: usize },

    /// Shapes of a batch output and its merge target disagree
    #[error("dimension mismatch in {context}: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        context: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// Index or range outside a matrix
    #[error("{context}: {index} out of bounds for {bound}")]
    OutOfBounds {
        context: &'static str,
        index: usize,
        bound: usize,
    },

    /// Another live task already claimed part of this region
    #[error("output {output}: {axis} range {start}..{end} overlaps a range claimed by another task")]
    OverlappingRange {
        output: usize,
        axis: &'static str,
        start: usize,
        end: usize,
    },

    /// ROWS/COLS slot was empty when the task started
    #[error("output {output} must be pre-allocated before ROWS/COLS tasks run")]
    NotPreallocated { output: usize },

    /// Pipeline function returned without filling an output slot
    #[error("pipeline function left output {output} empty")]
    MissingOutput { output: usize },

    /// Function id outside the function table
    #[error("function id {fid} not in table of {len} functions")]
    UnknownFunction { fid: usize, len: usize },

    /// Number of declared inputs/outputs does not line up
    #[error("arity mismatch for {what}: expected {expected}, got {actual}")]
    ArityMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Matrix lives in a different memory space than the task expects
    #[error("{context}: matrix lives in {actual} memory, task runs in {expected} memory")]
    SpaceMismatch {
        context: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    /// Task lifecycle violated (e.g. executing twice)
    #[error("task is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    /// Failure reported by an external pipeline function
    #[error("pipeline function failed: {0}")]
    Kernel(String),
}

impl PipelineError {
    /// Shorthand for kernel failures raised by pipeline functions
    pub fn kernel(msg: impl Into<String>) -> Self {
        PipelineError::Kernel(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_fault_reports_value() {
        let err = PipelineError::UnsupportedCombine(42);
        assert_eq!(err.to_string(), "combine strategy `42` not supported");
    }

    #[test]
    fn test_overlap_message() {
        let err = PipelineError::OverlappingRange {
            output: 1,
            axis: "row",
            start: 4,
            end: 8,
        };
        assert!(err.to_string().contains("row range 4..8"));
    }
}
