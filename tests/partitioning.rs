//! Property tests for batch partitioning and batch-size independence

mod common;

use blawkvec::{BatchPartitioner, EngineConfig, Space};
use common::{input_matrix, run_three_outputs, weights};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Batches are ascending, disjoint, cover [rl, ru) exactly, and only the
    /// last one may be short
    #[test]
    fn batches_cover_range(rl in 0usize..10_000, len in 0usize..2_000, b in 1usize..300) {
        let ru = rl + len;
        let partitioner = BatchPartitioner::new(rl, ru, b);
        let batches: Vec<_> = partitioner.iter().collect();

        let mut next = rl;
        for (k, batch) in batches.iter().enumerate() {
            prop_assert_eq!(batch.start, next);
            prop_assert!(batch.end > batch.start);
            if k + 1 < batches.len() {
                prop_assert_eq!(batch.len(), b);
            } else {
                prop_assert!(batch.len() <= b);
            }
            next = batch.end;
        }
        prop_assert_eq!(next, ru);
        prop_assert_eq!(batches.len(), partitioner.len());

        // Restartable: a second walk yields the same batches
        prop_assert_eq!(partitioner.iter().collect::<Vec<_>>(), batches);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// ROWS and COLS content does not depend on batch size or task count
    #[test]
    fn rows_cols_batch_size_independent(
        rows in 1usize..40,
        cols in 1usize..4,
        b1 in 1usize..16,
        b2 in 1usize..16,
        tasks in 1usize..4,
    ) {
        let x = input_matrix(rows, cols);
        let w = weights(cols);
        let tasks = tasks.min(rows);
        let (first, _) = run_three_outputs(&x, &w, 1, b1, Space::Host, EngineConfig::default());
        let (second, _) = run_three_outputs(&x, &w, tasks, b2, Space::Host, EngineConfig::default());
        prop_assert_eq!(&first[0], &second[0]);
        prop_assert_eq!(&first[1], &second[1]);
    }
}
