//! Per-batch input views
//!
//! Row-partitioned inputs are sliced to the batch rows without copying;
//! broadcast inputs (constants, weights, whole-matrix operands) are handed
//! through untouched. Views are acquired through [`ScopedInputs`], which
//! releases them on every exit path, including a failing pipeline function.

use crate::error::{PipelineError, Result};
use crate::matrix::{DenseMatrix, Element, Space};

/// How an input is split across batches
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InputSplit {
    /// Broadcast: every batch sees the whole matrix
    None,
    /// Row-partitioned: every batch sees its own rows
    Rows,
}

impl InputSplit {
    /// Decode the split code emitted by the pipeline compiler
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(InputSplit::None),
            1 => Ok(InputSplit::Rows),
            other => Err(PipelineError::UnsupportedSplit(other)),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            InputSplit::None => 0,
            InputSplit::Rows => 1,
        }
    }
}

/// Inputs bound for one pipeline-function call
#[derive(Debug)]
pub struct InputViews<T: Element> {
    values: Vec<DenseMatrix<T>>,
    /// true where the provider created a view (and must release it)
    created: Vec<bool>,
}

impl<T: Element> InputViews<T> {
    pub fn with_capacity(n: usize) -> Self {
        InputViews {
            values: Vec::with_capacity(n),
            created: Vec::with_capacity(n),
        }
    }

    /// Add a view created for this batch
    pub fn push_view(&mut self, view: DenseMatrix<T>) {
        self.values.push(view);
        self.created.push(true);
    }

    /// Add a pass-through reference to a broadcast input
    pub fn push_broadcast(&mut self, input: DenseMatrix<T>) {
        self.values.push(input);
        self.created.push(false);
    }

    pub fn as_slice(&self) -> &[DenseMatrix<T>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of views this batch created
    pub fn created_count(&self) -> usize {
        self.created.iter().filter(|c| **c).count()
    }

    /// Split into (matrix, created-by-provider) pairs
    pub fn into_parts(self) -> impl Iterator<Item = (DenseMatrix<T>, bool)> {
        self.values.into_iter().zip(self.created)
    }
}

/// Creates and releases batch input views
pub trait ViewProvider<T: Element> {
    /// Number of declared pipeline inputs
    fn num_inputs(&self) -> usize;

    /// Check the inputs before the first batch (memory space, row coverage)
    fn validate(&self, _space: Space, _row_upper: usize) -> Result<()> {
        Ok(())
    }

    /// Inputs for rows `[start, end)`
    fn create_inputs(&mut self, start: usize, end: usize) -> Result<InputViews<T>>;

    /// Release exactly the views `create_inputs` made; returns how many
    fn cleanup_inputs(&mut self, views: InputViews<T>) -> usize;
}

/// Default provider: slices `Rows` inputs, passes `None` inputs through
#[derive(Clone, Debug)]
pub struct RowViewProvider<T: Element> {
    inputs: Vec<DenseMatrix<T>>,
    splits: Vec<InputSplit>,
}

impl<T: Element> RowViewProvider<T> {
    pub fn new(inputs: Vec<DenseMatrix<T>>, splits: Vec<InputSplit>) -> Result<Self> {
        if inputs.len() != splits.len() {
            return Err(PipelineError::ArityMismatch {
                what: "input splits",
                expected: inputs.len(),
                actual: splits.len(),
            });
        }
        Ok(RowViewProvider { inputs, splits })
    }

    /// Build from raw split codes; unknown codes are a configuration fault
    pub fn from_codes(inputs: Vec<DenseMatrix<T>>, codes: &[i64]) -> Result<Self> {
        let splits = codes
            .iter()
            .map(|&c| InputSplit::from_code(c))
            .collect::<Result<Vec<_>>>()?;
        Self::new(inputs, splits)
    }

    pub fn splits(&self) -> &[InputSplit] {
        &self.splits
    }
}

impl<T: Element> ViewProvider<T> for RowViewProvider<T> {
    fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    fn validate(&self, space: Space, row_upper: usize) -> Result<()> {
        for (input, split) in self.inputs.iter().zip(&self.splits) {
            if input.space() != space {
                return Err(PipelineError::SpaceMismatch {
                    context: "pipeline input",
                    expected: space.name(),
                    actual: input.space().name(),
                });
            }
            if *split == InputSplit::Rows && input.num_rows() < row_upper {
                return Err(PipelineError::OutOfBounds {
                    context: "partitioned input rows",
                    index: row_upper,
                    bound: input.num_rows(),
                });
            }
        }
        Ok(())
    }

    fn create_inputs(&mut self, start: usize, end: usize) -> Result<InputViews<T>> {
        let mut views = InputViews::with_capacity(self.inputs.len());
        for (input, split) in self.inputs.iter().zip(&self.splits) {
            match split {
                InputSplit::Rows => views.push_view(input.slice_rows(start, end)?),
                InputSplit::None => views.push_broadcast(input.clone()),
            }
        }
        Ok(views)
    }

    fn cleanup_inputs(&mut self, views: InputViews<T>) -> usize {
        let mut released = 0;
        for (view, created) in views.into_parts() {
            if created {
                released += 1;
            }
            drop(view);
        }
        released
    }
}

/// Views for one batch, released when dropped
pub struct ScopedInputs<'p, T: Element, P: ViewProvider<T> + ?Sized> {
    provider: &'p mut P,
    views: Option<InputViews<T>>,
}

impl<'p, T: Element, P: ViewProvider<T> + ?Sized> ScopedInputs<'p, T, P> {
    pub fn acquire(provider: &'p mut P, start: usize, end: usize) -> Result<Self> {
        let views = provider.create_inputs(start, end)?;
        Ok(ScopedInputs {
            provider,
            views: Some(views),
        })
    }

    pub fn inputs(&self) -> &[DenseMatrix<T>] {
        self.views.as_ref().map(InputViews::as_slice).unwrap_or(&[])
    }

    /// Views the provider created for this batch (broadcasts excluded)
    pub fn created_count(&self) -> usize {
        self.views.as_ref().map_or(0, InputViews::created_count)
    }

    /// Release now instead of at scope end
    pub fn release(mut self) -> usize {
        self.release_inner()
    }

    fn release_inner(&mut self) -> usize {
        match self.views.take() {
            Some(views) => self.provider.cleanup_inputs(views),
            None => 0,
        }
    }
}

impl<T: Element, P: ViewProvider<T> + ?Sized> Drop for ScopedInputs<'_, T, P> {
    fn drop(&mut self) {
        self.release_inner();
    }
}
