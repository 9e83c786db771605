//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::ops::Range;
use std::sync::Arc;

use blawkvec::{
    CombineStrategy, CompiledPipelineTask, DenseMatrix, DevicePipelineTask, EngineConfig, FunctionTable,
    HostPipelineTask, InputSplit, PipelineContext, PipelineInvocation, Result, RowViewProvider, Space,
    TaskPartition, TaskStats,
};
use blawkvec::pipeline::OutputSlots;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn ctx() -> Arc<PipelineContext> {
    Arc::new(PipelineContext::new(EngineConfig::default()))
}

/// Deterministic `rows x cols` host input
pub fn input_matrix(rows: usize, cols: usize) -> DenseMatrix<f64> {
    DenseMatrix::from_fn(rows, cols, |i, j| 0.25 * (i * cols + j) as f64 + 1.0 / (j + 1) as f64)
}

/// Broadcast weights, one row
pub fn weights(cols: usize) -> DenseMatrix<f64> {
    DenseMatrix::from_fn(1, cols, |_, j| j as f64 - 0.5)
}

/// Cut `[lo, hi)` into `k` contiguous, near-equal task ranges
pub fn split_rows(lo: usize, hi: usize, k: usize) -> Vec<Range<usize>> {
    let n = hi - lo;
    (0..k).map(|t| lo + n * t / k..lo + n * (t + 1) / k).collect()
}

fn place(m: DenseMatrix<f64>, space: Space) -> Result<DenseMatrix<f64>> {
    match space {
        Space::Host => Ok(m),
        Space::Device => m.to_space(space),
    }
}

/// Pipeline with three outputs over inputs `[x (rows), w (broadcast)]`:
///
/// - ROWS: `2x + w`
/// - COLS: `x` transposed, `cols x batch`
/// - ADD: column sums of `x`, `1 x cols`
pub fn three_output_table() -> Arc<FunctionTable<f64>> {
    Arc::new(FunctionTable::single(
        |outs: &mut OutputSlots<f64>, ins: &[DenseMatrix<f64>], _ctx: &PipelineContext| {
            let x = &ins[0];
            let w = &ins[1];
            let (rows, cols) = x.shape();
            let space = x.space();
            outs[0] = Some(place(
                DenseMatrix::from_fn(rows, cols, |i, j| 2.0 * x.get(i, j) + w.get(0, j)),
                space,
            )?);
            outs[1] = Some(place(DenseMatrix::from_fn(cols, rows, |i, j| x.get(j, i)), space)?);
            outs[2] = Some(place(
                DenseMatrix::from_fn(1, cols, |_, j| (0..rows).map(|i| x.get(i, j)).sum()),
                space,
            )?);
            Ok(())
        },
    ))
}

fn three_output_partition(
    range: Range<usize>,
    cols: usize,
    batch_size: usize,
    funcs: &Arc<FunctionTable<f64>>,
    ctx: &Arc<PipelineContext>,
) -> TaskPartition<f64> {
    TaskPartition::new(range.start, range.end, Arc::clone(funcs), Arc::clone(ctx))
        .with_batch_size(batch_size)
        .with_output(CombineStrategy::ROWS, 0)
        .with_output(CombineStrategy::COLS, cols)
        .with_output(CombineStrategy::ADD, 0)
}

/// Run the three-output pipeline over all rows of `x` as `tasks` tasks
///
/// Returns the results (moved back to host memory) and per-task stats.
pub fn run_three_outputs(
    x: &DenseMatrix<f64>,
    w: &DenseMatrix<f64>,
    tasks: usize,
    batch_size: usize,
    space: Space,
    config: EngineConfig,
) -> (Vec<DenseMatrix<f64>>, Vec<TaskStats>) {
    let (rows, cols) = x.shape();
    let x = x.to_space(space).unwrap();
    let w = w.to_space(space).unwrap();
    let funcs = three_output_table();
    let ctx = Arc::new(PipelineContext::new(config));
    let inv = PipelineInvocation::allocate(
        &[CombineStrategy::Rows, CombineStrategy::Cols, CombineStrategy::Add],
        &[(rows, cols), (cols, rows), (1, cols)],
        space,
    )
    .unwrap();

    let provider = || RowViewProvider::new(vec![x.clone(), w.clone()], vec![InputSplit::Rows, InputSplit::None]).unwrap();
    let stats = match space {
        Space::Host => {
            let mut host: Vec<HostPipelineTask<'_, f64>> = split_rows(0, rows, tasks)
                .into_iter()
                .map(|r| {
                    let partition = three_output_partition(r, cols, batch_size, &funcs, &ctx);
                    CompiledPipelineTask::host(partition, provider(), inv.slots())
                })
                .collect();
            inv.run_parallel(&mut host).unwrap()
        }
        Space::Device => {
            let mut device: Vec<DevicePipelineTask<'_, f64>> = split_rows(0, rows, tasks)
                .into_iter()
                .map(|r| {
                    let partition = three_output_partition(r, cols, batch_size, &funcs, &ctx);
                    CompiledPipelineTask::device(partition, provider(), inv.slots())
                })
                .collect();
            inv.run_parallel(&mut device).unwrap()
        }
    };

    let results = inv
        .into_results()
        .into_iter()
        .map(|m| m.unwrap().to_space(Space::Host).unwrap())
        .collect();
    (results, stats)
}

pub fn assert_close(actual: &DenseMatrix<f64>, expected: &DenseMatrix<f64>, tol: f64) {
    assert_eq!(actual.shape(), expected.shape());
    for (a, e) in actual.to_vec().iter().zip(expected.to_vec()) {
        assert!((a - e).abs() <= tol * (1.0 + e.abs()), "{} vs {}", a, e);
    }
}
