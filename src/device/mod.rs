//! Device memory space
//!
//! Pipelines whose matrices live in accelerator memory run through
//! [`DeviceSpace`]. It behaves like a single in-order stream per task:
//!
//! - ROWS/COLS writes become device-to-device bulk copies into the claimed
//!   region (same row/column arithmetic as the host path)
//! - ADD becomes an elementwise kernel on the accumulator
//! - nothing is visible to other tasks until `fence`, which records an event
//!   and waits on it
//!
//! The task fences before it releases its region claims and again inside the
//! ADD critical section, so a slot is never unlocked over pending work.

pub mod kernels;
pub mod stream;

use log::trace;

use crate::builtins::ewise::check_same_shape;
use crate::config::EngineConfig;
use crate::error::{PipelineError, Result};
use crate::matrix::{DenseMatrix, Element, Space};
use crate::pipeline::slot::RegionWriter;
use crate::pipeline::space::MemorySpace;

pub use stream::{DeviceStream, Event};

/// Device data movement for one task
#[derive(Debug, Default)]
pub struct DeviceSpace {
    stream: DeviceStream,
    fence_each_batch: bool,
    fences: u64,
    copies: u64,
    kernels: u64,
}

impl DeviceSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        DeviceSpace {
            fence_each_batch: config.fence_each_batch,
            ..Self::default()
        }
    }

    pub fn stream(&self) -> &DeviceStream {
        &self.stream
    }

    /// Fences completed so far
    pub fn fences(&self) -> u64 {
        self.fences
    }

    /// Bulk copies issued so far
    pub fn copies(&self) -> u64 {
        self.copies
    }

    /// Add kernels issued so far
    pub fn kernels(&self) -> u64 {
        self.kernels
    }

    fn check_space<T: Element>(context: &'static str, m: &DenseMatrix<T>) -> Result<()> {
        if m.space() == Space::Device {
            Ok(())
        } else {
            Err(PipelineError::SpaceMismatch {
                context,
                expected: Space::Device.name(),
                actual: m.space().name(),
            })
        }
    }
}

impl<T: Element> MemorySpace<T> for DeviceSpace {
    fn space(&self) -> Space {
        Space::Device
    }

    fn copy_range(&mut self, dst: &mut RegionWriter<'_, T>, at: usize, src: &DenseMatrix<T>) -> Result<()> {
        Self::check_space("copy source", src)?;
        if dst.space() != Space::Device {
            return Err(PipelineError::SpaceMismatch {
                context: "copy target",
                expected: Space::Device.name(),
                actual: dst.space().name(),
            });
        }
        let target = dst.detach_block(at, src.shape())?;
        let source = src.clone();
        let held = vec![target.buffer_id(), source.buffer_id()];
        // SAFETY: `target` lies inside the region `dst` claims; the task fences
        // the stream before the claim is released.
        self.stream
            .enqueue(held, move || unsafe { kernels::copy_block(&target, &source) });
        self.copies += 1;
        Ok(())
    }

    fn elementwise_add(&mut self, acc: &mut DenseMatrix<T>, rhs: &DenseMatrix<T>) -> Result<()> {
        Self::check_space("accumulator", acc)?;
        Self::check_space("addend", rhs)?;
        check_same_shape("accumulate", acc, rhs)?;

        // Aliases other than our own pending ops force a private copy first
        if acc.alias_count() > 1 + self.stream.holds(acc.buffer_id()) {
            self.stream.synchronize();
            acc.make_unique()?;
            trace!("device add: detached aliased accumulator");
        }

        let target = acc.clone();
        let addend = rhs.clone();
        let held = vec![target.buffer_id(), addend.buffer_id()];
        // SAFETY: every other handle on the accumulator buffer belongs to an
        // earlier op of this stream, which runs first.
        self.stream
            .enqueue(held, move || unsafe { kernels::add_assign(&target, &addend) });
        self.kernels += 1;
        Ok(())
    }

    fn fence(&mut self) -> Result<()> {
        let event = self.stream.record_event();
        self.stream.wait_event(event);
        self.fences += 1;
        Ok(())
    }

    fn batch_done(&mut self) -> Result<()> {
        if self.fence_each_batch {
            MemorySpace::<T>::fence(self)
        } else {
            Ok(())
        }
    }
}
