// rust/sweep-reader/src/reader/sharding.rs

use crate::config::WorkerConfig;

/// Whether the sequence at `sequence_position` in the global order belongs
/// to `worker`.
///
/// Sequences are dealt round-robin: worker `r` of `W` owns every position
/// `g` with `g % W == r`. Every worker walks the same global order, so the
/// partition needs no communication, only the same starting position and
/// worker count on every worker.
pub fn is_local(sequence_position: u64, worker: &WorkerConfig) -> bool {
    sequence_position % u64::from(worker.number_of_workers) == u64::from(worker.worker_rank)
}
