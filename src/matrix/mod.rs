//! Dense row-major matrices with row skip
//!
//! A matrix is a window `(start, rows, cols, row_skip)` over a shared buffer.
//! Slicing rows or columns only moves the window, so partitioned pipeline
//! inputs and result regions never copy data.

mod buffer;
pub mod dense;

use std::fmt::Debug;
use std::ops::Add;

pub use dense::DenseMatrix;

/// Numeric element types a pipeline can run on
pub trait Element:
    Copy + Default + PartialEq + PartialOrd + Debug + Add<Output = Self> + Send + Sync + 'static
{
    /// Additive identity
    const ZERO: Self;

    fn to_f64(self) -> f64;
}

impl Element for f64 {
    const ZERO: Self = 0.0;

    #[inline(always)]
    fn to_f64(self) -> f64 {
        self
    }
}

impl Element for f32 {
    const ZERO: Self = 0.0;

    #[inline(always)]
    fn to_f64(self) -> f64 {
        self as f64
    }
}

/// Memory a matrix buffer lives in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Space {
    /// Host RAM
    Host,
    /// Accelerator memory, touched on the host only after stream sync
    Device,
}

impl Space {
    pub fn name(self) -> &'static str {
        match self {
            Space::Host => "host",
            Space::Device => "device",
        }
    }
}
