//! Compiled pipeline functions and their execution context
//!
//! A pipeline function is opaque to the engine: it receives the batch's input
//! views and one output slot per pipeline output, and must leave a matrix in
//! every slot. The engine never inspects or retries it.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::{PipelineError, Result};
use crate::matrix::{DenseMatrix, Element};

/// Output slots filled by a pipeline function, one per pipeline output
pub type OutputSlots<T> = [Option<DenseMatrix<T>>];

/// Signature of a compiled pipeline function
pub type PipelineFn<T> =
    dyn Fn(&mut OutputSlots<T>, &[DenseMatrix<T>], &PipelineContext) -> Result<()> + Send + Sync;

/// Execution context handed to every pipeline function call
#[derive(Clone, Default)]
pub struct PipelineContext {
    config: EngineConfig,
    user: Option<Arc<dyn Any + Send + Sync>>,
}

impl PipelineContext {
    pub fn new(config: EngineConfig) -> Self {
        PipelineContext { config, user: None }
    }

    /// Attach caller data (kernel handles, BLAS config, ...) for pipeline functions
    pub fn with_user_data<U: Any + Send + Sync>(mut self, data: U) -> Self {
        self.user = Some(Arc::new(data));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn user_data<U: Any>(&self) -> Option<&U> {
        self.user.as_deref().and_then(|u| u.downcast_ref::<U>())
    }
}

impl fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("config", &self.config)
            .field("user_data", &self.user.is_some())
            .finish()
    }
}

/// Table of compiled pipeline functions, indexed by function id
pub struct FunctionTable<T: Element> {
    funcs: Vec<Arc<PipelineFn<T>>>,
}

impl<T: Element> FunctionTable<T> {
    pub fn new() -> Self {
        FunctionTable { funcs: Vec::new() }
    }

    /// Register a function; returns its id
    pub fn push<F>(&mut self, f: F) -> usize
    where
        F: Fn(&mut OutputSlots<T>, &[DenseMatrix<T>], &PipelineContext) -> Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.funcs.push(Arc::new(f));
        self.funcs.len() - 1
    }

    /// Table with a single function at id 0
    pub fn single<F>(f: F) -> Self
    where
        F: Fn(&mut OutputSlots<T>, &[DenseMatrix<T>], &PipelineContext) -> Result<()>
            + Send
            + Sync
            + 'static,
    {
        let mut table = Self::new();
        table.push(f);
        table
    }

    pub fn get(&self, fid: usize) -> Result<Arc<PipelineFn<T>>> {
        self.funcs
            .get(fid)
            .cloned()
            .ok_or(PipelineError::UnknownFunction {
                fid,
                len: self.funcs.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }
}

impl<T: Element> Default for FunctionTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element> fmt::Debug for FunctionTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FunctionTable({} functions)", self.funcs.len())
    }
}
