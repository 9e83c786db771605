//! Combine strategies for pipeline outputs

use crate::error::{PipelineError, Result};

/// Raw combine code as emitted by the pipeline compiler
pub type CombineCode = i64;

/// How batch/task results fold into a shared pipeline output
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CombineStrategy {
    /// Batch output lands in rows `[start - offset, end - offset)` of the result
    Rows,
    /// Batch output lands in columns `[start - offset, end - offset)`,
    /// rows `[0, expected_rows)` of the result
    Cols,
    /// Batch outputs are summed elementwise into the result
    Add,
}

impl CombineStrategy {
    pub const ROWS: CombineCode = 1;
    pub const COLS: CombineCode = 2;
    pub const ADD: CombineCode = 3;

    /// Decode a combine code; anything else is a configuration fault
    pub fn from_code(code: CombineCode) -> Result<Self> {
        match code {
            Self::ROWS => Ok(CombineStrategy::Rows),
            Self::COLS => Ok(CombineStrategy::Cols),
            Self::ADD => Ok(CombineStrategy::Add),
            other => Err(PipelineError::UnsupportedCombine(other)),
        }
    }

    pub fn code(self) -> CombineCode {
        match self {
            CombineStrategy::Rows => Self::ROWS,
            CombineStrategy::Cols => Self::COLS,
            CombineStrategy::Add => Self::ADD,
        }
    }

    /// ROWS/COLS write into a pre-allocated region without locking
    pub fn is_positional(self) -> bool {
        matches!(self, CombineStrategy::Rows | CombineStrategy::Cols)
    }
}

impl From<CombineStrategy> for CombineCode {
    fn from(strategy: CombineStrategy) -> Self {
        strategy.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        for s in [CombineStrategy::Rows, CombineStrategy::Cols, CombineStrategy::Add] {
            assert_eq!(CombineStrategy::from_code(s.code()).unwrap(), s);
        }
    }

    #[test]
    fn test_unknown_code() {
        assert_eq!(
            CombineStrategy::from_code(0),
            Err(PipelineError::UnsupportedCombine(0))
        );
        assert_eq!(
            CombineStrategy::from_code(-5),
            Err(PipelineError::UnsupportedCombine(-5))
        );
    }

    #[test]
    fn test_positional() {
        assert!(CombineStrategy::Rows.is_positional());
        assert!(CombineStrategy::Cols.is_positional());
        assert!(!CombineStrategy::Add.is_positional());
    }
}
