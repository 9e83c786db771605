//! Result merger
//!
//! Folds every batch output into its shared result according to the output's
//! combine strategy:
//!
//! - **ROWS**: rows `[start - offset, end - offset)` of the result
//! - **COLS**: rows `[0, expected_rows)`, columns `[start - offset, end - offset)`
//! - **ADD**: elementwise sum into a task-local accumulator, handed to the
//!   shared slot once per task by [`merge_add`]
//!
//! ROWS/COLS regions are claimed once per task in [`ResultMerger::prepare`]
//! and written without locking until the merger is dropped.

use std::ops::Range;

use log::trace;

use crate::error::{PipelineError, Result};
use crate::matrix::{DenseMatrix, Element};
use crate::pipeline::combine::CombineStrategy;
use crate::pipeline::function::OutputSlots;
use crate::pipeline::reduce::{LocalReduce, MergeOutcome};
use crate::pipeline::slot::{ClaimAxis, RegionWriter, SharedResultSlot};
use crate::pipeline::space::MemorySpace;

enum Sink<'s, T: Element> {
    Rows(RegionWriter<'s, T>),
    Cols {
        writer: RegionWriter<'s, T>,
        expected_rows: usize,
    },
    Add(LocalReduce<DenseMatrix<T>>),
}

/// Task-local accumulator for one ADD output
pub struct AddPartial<T: Element> {
    pub output: usize,
    pub local: LocalReduce<DenseMatrix<T>>,
}

/// Per-task view of the shared results while batches run
pub struct ResultMerger<'s, T: Element> {
    sinks: Vec<Sink<'s, T>>,
    offset: usize,
}

impl<'s, T: Element> ResultMerger<'s, T> {
    /// Claim the task's ROWS/COLS regions and open one accumulator per ADD output
    ///
    /// `rows` is the task's absolute row range; `offset` translates it into
    /// result coordinates. Claims taken before a failing one are released
    /// when this returns the error.
    pub fn prepare(
        results: &'s [SharedResultSlot<T>],
        strategies: &[CombineStrategy],
        expected_rows: &[usize],
        rows: Range<usize>,
        offset: usize,
    ) -> Result<Self> {
        check_arity("combine strategies", results.len(), strategies.len())?;
        check_arity("expected row counts", results.len(), expected_rows.len())?;
        if rows.start < offset {
            return Err(PipelineError::OutOfBounds {
                context: "task offset",
                index: offset,
                bound: rows.start,
            });
        }
        let target = (rows.start - offset)..(rows.end.max(rows.start) - offset);

        let mut sinks = Vec::with_capacity(results.len());
        for (o, (slot, &strategy)) in results.iter().zip(strategies).enumerate() {
            let sink = match strategy {
                CombineStrategy::Rows => Sink::Rows(slot.claim(o, ClaimAxis::Rows, target.clone(), 0)?),
                CombineStrategy::Cols => Sink::Cols {
                    writer: slot.claim(o, ClaimAxis::Cols, target.clone(), expected_rows[o])?,
                    expected_rows: expected_rows[o],
                },
                CombineStrategy::Add => Sink::Add(LocalReduce::new()),
            };
            sinks.push(sink);
        }

        Ok(ResultMerger { sinks, offset })
    }

    pub fn num_outputs(&self) -> usize {
        self.sinks.len()
    }

    /// Fold the outputs of batch `batch` (absolute rows)
    ///
    /// Takes every output out of `outputs`, leaving the slots empty for the
    /// next batch.
    pub fn accumulate<S>(&mut self, space: &mut S, outputs: &mut OutputSlots<T>, batch: Range<usize>) -> Result<()>
    where
        S: MemorySpace<T> + ?Sized,
    {
        check_arity("pipeline outputs", self.sinks.len(), outputs.len())?;
        let at = batch.start.checked_sub(self.offset).ok_or(PipelineError::OutOfBounds {
            context: "batch start",
            index: batch.start,
            bound: self.offset,
        })?;
        let len = batch.len();

        for (o, (sink, out)) in self.sinks.iter_mut().zip(outputs.iter_mut()).enumerate() {
            let src = out.take().ok_or(PipelineError::MissingOutput { output: o })?;
            if src.space() != space.space() {
                return Err(PipelineError::SpaceMismatch {
                    context: "pipeline output",
                    expected: space.space().name(),
                    actual: src.space().name(),
                });
            }

            match sink {
                Sink::Rows(writer) => {
                    if src.num_rows() != len {
                        return Err(PipelineError::DimensionMismatch {
                            context: "ROWS batch output",
                            expected: (len, src.num_cols()),
                            actual: src.shape(),
                        });
                    }
                    space.copy_range(writer, at, &src)?;
                }
                Sink::Cols { writer, expected_rows } => {
                    if src.shape() != (*expected_rows, len) {
                        return Err(PipelineError::DimensionMismatch {
                            context: "COLS batch output",
                            expected: (*expected_rows, len),
                            actual: src.shape(),
                        });
                    }
                    space.copy_range(writer, at, &src)?;
                }
                Sink::Add(local) => {
                    local.fold(src, |acc, value| space.elementwise_add(acc, &value))?;
                }
            }
        }

        trace!("folded batch {:?} into {} outputs", batch, self.sinks.len());
        Ok(())
    }

    /// Release every ROWS/COLS claim and hand back the ADD accumulators
    ///
    /// Asynchronous writes into claimed regions must be fenced before this
    /// is called.
    pub fn into_add_partials(self) -> Vec<AddPartial<T>> {
        self.sinks
            .into_iter()
            .enumerate()
            .filter_map(|(output, sink)| match sink {
                Sink::Add(local) => Some(AddPartial { output, local }),
                Sink::Rows(_) | Sink::Cols { .. } => None,
            })
            .collect()
    }
}

/// Hand each task-local ADD accumulator to its shared slot
///
/// The slot mutex is held for the take-ownership store or for one in-place
/// add followed by a fence, so the slot never holds an incomplete sum once
/// the lock is released.
pub fn merge_add<T, S>(
    results: &[SharedResultSlot<T>],
    partials: Vec<AddPartial<T>>,
    space: &mut S,
) -> Result<Vec<MergeOutcome>>
where
    T: Element,
    S: MemorySpace<T> + ?Sized,
{
    let mut outcomes = Vec::with_capacity(partials.len());
    for AddPartial { output, local } in partials {
        let slot = results.get(output).ok_or(PipelineError::OutOfBounds {
            context: "result slots",
            index: output,
            bound: results.len(),
        })?;
        let outcome = local.merge_into(slot.cell(), |shared, partial| {
            space.elementwise_add(shared, partial)?;
            space.fence()
        })?;
        trace!("output {}: ADD hand-off {:?}", output, outcome);
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

fn check_arity(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(PipelineError::ArityMismatch { what, expected, actual })
    }
}
