// rust/sweep-reader/src/reader/assembler.rs

use crate::config::WorkerConfig;
use crate::dataset::SequenceDescription;
use crate::error::{ReaderError, Result};

use super::cursor::Cursor;
use super::sharding;

/// Largest accepted budget; the sample accounting is done in signed 32-bit range.
const MAX_BUDGET: u64 = i32::MAX as u64;

/// Rejects budgets that are zero or exceed the signed 32-bit range.
pub(crate) fn check_budget(which: &'static str, budget: u64) -> Result<()> {
    if budget == 0 || budget > MAX_BUDGET {
        return Err(ReaderError::invalid_budget(which, budget));
    }
    Ok(())
}

/// Walks the cursor forward and selects this worker's sequences.
///
/// Every walked sequence consumes the global budget, local or not, so the
/// batches of all workers stay disjoint and bounded together. Local
/// sequences also consume the local budget. The first walked sequence is
/// always taken, whatever its length, so an oversized sequence cannot stall
/// the reader; after that a sequence is taken only if both budgets can hold
/// it entirely.
pub(crate) fn next_sequence_descriptions(
    cursor: &mut Cursor,
    worker: &WorkerConfig,
    global_sample_budget: u64,
    local_sample_budget: u64,
) -> Result<Vec<SequenceDescription>> {
    check_budget("global", global_sample_budget)?;
    check_budget("local", local_sample_budget)?;

    let mut global_left = global_sample_budget as i64;
    let mut local_left = local_sample_budget as i64;
    let mut result = Vec::new();

    while global_left > 0 && local_left > 0 {
        let sequence = *cursor.current();
        let length = i64::from(sequence.number_of_samples);

        if !result.is_empty() && (local_left < length || global_left < length) {
            break;
        }

        if sharding::is_local(cursor.sequence_position(), worker) {
            result.push(sequence);
            local_left -= length;
        }

        global_left -= length;
        cursor.advance()?;
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::dataset::{Deserializer, MemoryDeserializer};
    use crate::reader::chunk_index::ChunkIndex;

    fn cursor_over(deserializer: MemoryDeserializer) -> Cursor {
        let deserializer = Arc::new(deserializer);
        let index = Arc::new(ChunkIndex::new(deserializer.chunk_descriptions()).unwrap());
        Cursor::new(deserializer, index).unwrap()
    }

    fn two_chunks() -> Cursor {
        cursor_over(
            MemoryDeserializer::builder(["x"])
                .chunk(&[2, 3, 1])
                .chunk(&[4, 2])
                .build(),
        )
    }

    fn ids(sequences: &[SequenceDescription]) -> Vec<u64> {
        sequences.iter().map(|s| s.id).collect()
    }

    #[test]
    fn test_budget_limits() {
        assert!(check_budget("global", 1).is_ok());
        assert!(check_budget("global", i32::MAX as u64).is_ok());
        assert!(matches!(
            check_budget("local", 0),
            Err(ReaderError::InvalidBudget { which: "local", value: 0 })
        ));
        assert!(check_budget("global", i32::MAX as u64 + 1).is_err());
    }

    #[test]
    fn test_single_worker_fills_budget() {
        let mut cursor = two_chunks();
        let worker = WorkerConfig::single();

        let batch = next_sequence_descriptions(&mut cursor, &worker, 6, 6).unwrap();
        assert_eq!(ids(&batch), vec![0, 1, 2]);
        assert_eq!(cursor.sample_position(), 6);

        let batch = next_sequence_descriptions(&mut cursor, &worker, 6, 6).unwrap();
        assert_eq!(ids(&batch), vec![3, 4]);
        assert_eq!(cursor.sample_position(), 12);
    }

    #[test]
    fn test_stops_before_sequence_that_does_not_fit() {
        let mut cursor = two_chunks();

        let batch = next_sequence_descriptions(&mut cursor, &WorkerConfig::single(), 4, 4).unwrap();
        assert_eq!(ids(&batch), vec![0]);
        assert_eq!(cursor.sample_position(), 2);
        assert_eq!(cursor.current().id, 1);
    }

    #[test]
    fn test_oversized_first_sequence_is_taken() {
        let mut cursor = two_chunks();
        cursor.seek(6).unwrap();

        let batch = next_sequence_descriptions(&mut cursor, &WorkerConfig::single(), 1, 1).unwrap();
        assert_eq!(ids(&batch), vec![3]);
        assert_eq!(cursor.sample_position(), 10);
    }

    #[test]
    fn test_two_workers_partition_first_batch() {
        let worker_0 = WorkerConfig::new(0, 2);
        let worker_1 = WorkerConfig::new(1, 2);

        let mut cursor = two_chunks();
        let batch = next_sequence_descriptions(&mut cursor, &worker_0, 6, 6).unwrap();
        assert_eq!(ids(&batch), vec![0, 2]);
        assert_eq!(batch.iter().map(|s| s.number_of_samples).sum::<u32>(), 3);
        assert_eq!(cursor.sample_position(), 6);

        let mut cursor = two_chunks();
        let batch = next_sequence_descriptions(&mut cursor, &worker_1, 6, 6).unwrap();
        assert_eq!(ids(&batch), vec![1]);
        assert_eq!(cursor.sample_position(), 6);
    }

    #[test]
    fn test_non_local_first_sequence_consumes_global_budget() {
        // Worker 1 does not own sequence 0 (length 5), which alone exceeds
        // the global budget; it is still walked, so nothing is returned.
        let mut cursor = cursor_over(MemoryDeserializer::builder(["x"]).chunk(&[5, 1]).build());

        let batch = next_sequence_descriptions(&mut cursor, &WorkerConfig::new(1, 2), 3, 3).unwrap();
        assert!(batch.is_empty());
        assert_eq!(cursor.sample_position(), 5);
    }

    #[test]
    fn test_local_budget_stops_batch() {
        let mut cursor = cursor_over(MemoryDeserializer::builder(["x"]).chunk(&[1; 10]).build());

        let batch = next_sequence_descriptions(&mut cursor, &WorkerConfig::new(0, 2), 10, 2).unwrap();
        assert_eq!(ids(&batch), vec![0, 2]);
        // The walk ends as soon as the local budget reaches zero.
        assert_eq!(cursor.sample_position(), 3);
    }

    #[test]
    fn test_invalid_budgets_leave_cursor_untouched() {
        let mut cursor = two_chunks();

        assert!(next_sequence_descriptions(&mut cursor, &WorkerConfig::single(), 0, 4).is_err());
        assert!(next_sequence_descriptions(&mut cursor, &WorkerConfig::single(), 4, 0).is_err());
        assert!(next_sequence_descriptions(
            &mut cursor,
            &WorkerConfig::single(),
            4,
            i32::MAX as u64 + 1
        )
        .is_err());
        assert_eq!(cursor.sample_position(), 0);
    }
}
