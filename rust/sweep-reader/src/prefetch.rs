// rust/sweep-reader/src/prefetch.rs

//! Read-ahead wrapper around a [`SweepReader`].
//!
//! A background thread owns the reader and keeps up to `buffer_size`
//! batches ready, so chunk materialization for the next batch overlaps
//! with the consumer's work on the current one. Budgets are fixed for
//! the lifetime of the wrapper.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};

use crate::config::PrefetchConfig;
use crate::dataset::Batch;
use crate::error::{ReaderError, Result};
use crate::reader::SweepReader;

/// Reader state right after a batch was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Progress {
    sample_position: u64,
    invalid_sequences: usize,
}

impl Progress {
    fn of(reader: &SweepReader) -> Self {
        Self {
            sample_position: reader.current_sample_position(),
            invalid_sequences: reader.invalid_sequences(),
        }
    }
}

type PrefetchItem = Result<(Batch, Progress)>;

struct Background {
    receiver: Receiver<PrefetchItem>,
    stop_flag: Arc<AtomicBool>,
    handle: JoinHandle<SweepReader>,
}

impl Background {
    fn spawn(
        reader: SweepReader,
        buffer_size: usize,
        global_sample_budget: u64,
        local_sample_budget: u64,
    ) -> Result<Self> {
        let (sender, receiver) = channel::bounded(buffer_size);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let thread_stop_flag = stop_flag.clone();

        let handle = thread::Builder::new()
            .name("sweep-prefetch".to_string())
            .spawn(move || {
                read_ahead(
                    reader,
                    sender,
                    thread_stop_flag,
                    global_sample_budget,
                    local_sample_budget,
                )
            })
            .map_err(|e| ReaderError::prefetch(format!("failed to spawn prefetch thread: {e}")))?;

        Ok(Self {
            receiver,
            stop_flag,
            handle,
        })
    }

    /// Stops the thread and hands back its reader.
    fn shutdown(self) -> Result<SweepReader> {
        self.stop_flag.store(true, Ordering::Relaxed);
        // Unblocks a pending send.
        drop(self.receiver);
        self.handle
            .join()
            .map_err(|_| ReaderError::prefetch("prefetch thread panicked"))
    }
}

fn read_ahead(
    mut reader: SweepReader,
    sender: Sender<PrefetchItem>,
    stop_flag: Arc<AtomicBool>,
    global_sample_budget: u64,
    local_sample_budget: u64,
) -> SweepReader {
    while !stop_flag.load(Ordering::Relaxed) {
        let item = reader
            .next_batch(global_sample_budget, local_sample_budget)
            .map(|batch| (batch, Progress::of(&reader)));
        let last = match &item {
            Ok((batch, _)) => batch.end_of_epoch,
            Err(_) => true,
        };

        if sender.send(item).is_err() || last {
            break;
        }
    }

    tracing::trace!(
        sample_position = reader.current_sample_position(),
        "prefetch thread finished"
    );
    reader
}

enum Source {
    Inline(Box<SweepReader>),
    Background(Background),
}

/// Minibatch reader that reads ahead on a background thread.
///
/// Batches are delivered in exactly the order, and with exactly the
/// content, that calling [`SweepReader::next_batch`] with the same budgets
/// would produce. Reading ahead stops after the batch that ends the epoch
/// or after the first error.
pub struct PrefetchingReader {
    source: Option<Source>,
    global_sample_budget: u64,
    local_sample_budget: u64,
    consumed: Progress,
    exhausted: bool,
    failed: bool,
}

impl PrefetchingReader {
    /// Wraps `reader`, reading batches of the given budgets.
    ///
    /// With prefetching disabled, batches are read on the calling thread.
    pub fn new(
        reader: SweepReader,
        config: &PrefetchConfig,
        global_sample_budget: u64,
        local_sample_budget: u64,
    ) -> Result<Self> {
        if global_sample_budget == 0 {
            return Err(ReaderError::invalid_budget("global", 0));
        }
        if local_sample_budget == 0 {
            return Err(ReaderError::invalid_budget("local", 0));
        }

        let consumed = Progress::of(&reader);
        let source = if config.enabled && config.buffer_size > 0 {
            tracing::debug!(
                buffer_size = config.buffer_size,
                global_sample_budget,
                local_sample_budget,
                "starting prefetch thread"
            );
            Source::Background(Background::spawn(
                reader,
                config.buffer_size,
                global_sample_budget,
                local_sample_budget,
            )?)
        } else {
            Source::Inline(Box::new(reader))
        };

        Ok(Self {
            source: Some(source),
            global_sample_budget,
            local_sample_budget,
            consumed,
            exhausted: false,
            failed: false,
        })
    }

    pub fn is_prefetching_enabled(&self) -> bool {
        matches!(self.source, Some(Source::Background(_)))
    }

    /// Sample position right after the last batch handed to the caller.
    ///
    /// This is the position to checkpoint; the wrapped reader itself may
    /// already be further ahead.
    pub fn consumed_position(&self) -> u64 {
        self.consumed.sample_position
    }

    /// Returns the next batch.
    ///
    /// After the batch that ends the epoch, every call returns an empty
    /// batch with `end_of_epoch` set.
    pub fn next_batch(&mut self) -> Result<Batch> {
        if self.exhausted {
            return Ok(Batch::empty(true));
        }

        let item = match &mut self.source {
            Some(Source::Inline(reader)) => reader
                .next_batch(self.global_sample_budget, self.local_sample_budget)
                .map(|batch| (batch, Progress::of(reader))),
            Some(Source::Background(background)) => match background.receiver.recv() {
                Ok(item) => item,
                Err(_) => Err(ReaderError::prefetch("prefetch thread stopped unexpectedly")),
            },
            None => Err(ReaderError::prefetch("reader already taken")),
        };

        let (batch, progress) = item.map_err(|e| {
            self.failed = true;
            e
        })?;
        self.consumed = progress;
        if batch.end_of_epoch {
            self.exhausted = true;
        }
        Ok(batch)
    }

    /// Stops reading ahead and returns the reader, positioned right after
    /// the last batch handed to the caller.
    ///
    /// Batches read ahead but never delivered are discarded, along with
    /// any invalid sequences the cleaner counted in them.
    pub fn into_inner(mut self) -> Result<SweepReader> {
        match self.source.take() {
            Some(Source::Inline(reader)) => Ok(*reader),
            Some(Source::Background(background)) => {
                let mut reader = background.shutdown()?;
                reader.set_current_sample_position(self.consumed.sample_position)?;
                reader.set_invalid_sequences(self.consumed.invalid_sequences);
                Ok(reader)
            }
            None => Err(ReaderError::prefetch("reader already taken")),
        }
    }
}

impl Iterator for PrefetchingReader {
    type Item = Result<Batch>;

    /// Yields batches up to and including the one that ends the epoch, or
    /// up to the first error.
    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted || self.failed {
            return None;
        }
        Some(self.next_batch())
    }
}

impl Drop for PrefetchingReader {
    fn drop(&mut self) {
        if let Some(Source::Background(background)) = self.source.take() {
            let _ = background.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EpochConfig, EpochSize, ReaderConfig, WorkerConfig};
    use crate::dataset::MemoryDeserializer;

    fn reader(worker: WorkerConfig) -> SweepReader {
        let deserializer = MemoryDeserializer::builder(["features"])
            .chunk(&[2, 3, 1])
            .chunk(&[4, 2])
            .chunk(&[1, 1, 1, 1])
            .build();
        let mut config = ReaderConfig::default();
        config.extraction.multithreaded = false;

        let mut reader = SweepReader::new(Arc::new(deserializer), &config).unwrap();
        reader
            .start_epoch(EpochConfig::new(0, EpochSize::FullSweep, worker))
            .unwrap();
        reader
    }

    fn enabled(buffer_size: usize) -> PrefetchConfig {
        PrefetchConfig {
            enabled: true,
            buffer_size,
        }
    }

    fn disabled() -> PrefetchConfig {
        PrefetchConfig {
            enabled: false,
            buffer_size: 2,
        }
    }

    fn drain(reader: &mut SweepReader) -> Vec<Vec<u64>> {
        let mut ids = Vec::new();
        loop {
            let batch = reader.next_batch(3, 3).unwrap();
            ids.push(batch.sequence_ids());
            if batch.end_of_epoch {
                return ids;
            }
        }
    }

    #[test]
    fn test_prefetched_batches_match_direct_reads() {
        let expected = drain(&mut reader(WorkerConfig::new(0, 2)));

        for config in [enabled(1), enabled(4), disabled()] {
            let prefetching =
                PrefetchingReader::new(reader(WorkerConfig::new(0, 2)), &config, 3, 3).unwrap();
            let actual: Vec<Vec<u64>> = prefetching
                .map(|batch| batch.unwrap().sequence_ids())
                .collect();
            assert_eq!(actual, expected);
        }
    }

    #[test]
    fn test_prefetching_disabled() {
        let prefetching = PrefetchingReader::new(reader(WorkerConfig::single()), &disabled(), 3, 3)
            .unwrap();
        assert!(!prefetching.is_prefetching_enabled());
    }

    #[test]
    fn test_end_of_epoch_repeats_after_exhaustion() {
        let mut prefetching =
            PrefetchingReader::new(reader(WorkerConfig::single()), &enabled(2), 100, 100).unwrap();

        let batch = prefetching.next_batch().unwrap();
        assert!(batch.end_of_epoch);
        assert_eq!(batch.number_of_sequences(), 9);

        let batch = prefetching.next_batch().unwrap();
        assert!(batch.end_of_epoch && batch.is_empty());
        assert_eq!(prefetching.consumed_position(), 16);
    }

    #[test]
    fn test_into_inner_rewinds_to_consumed_position() {
        let mut prefetching =
            PrefetchingReader::new(reader(WorkerConfig::single()), &enabled(4), 3, 3).unwrap();
        prefetching.next_batch().unwrap();
        let consumed = prefetching.consumed_position();

        let mut reader = prefetching.into_inner().unwrap();
        assert_eq!(reader.current_sample_position(), consumed);

        let mut expected = self::reader(WorkerConfig::single());
        expected.next_batch(3, 3).unwrap();
        assert_eq!(
            reader.next_batch(3, 3).unwrap().sequence_ids(),
            expected.next_batch(3, 3).unwrap().sequence_ids()
        );
    }

    #[test]
    fn test_into_inner_forgets_invalid_sequences_read_ahead() {
        let deserializer = MemoryDeserializer::builder(["x"])
            .chunk(&[1, 1, 1, 1])
            .invalid_sequence(2)
            .build();
        let mut config = ReaderConfig::default();
        config.extraction.multithreaded = false;
        config.cleaning.max_invalid_sequences = 1;
        let reader = SweepReader::new(Arc::new(deserializer), &config).unwrap();

        let mut prefetching = PrefetchingReader::new(reader, &enabled(4), 1, 1).unwrap();
        assert_eq!(prefetching.next_batch().unwrap().sequence_ids(), vec![0]);
        // Let the thread read the rest of the epoch, including sequence 2.
        thread::sleep(std::time::Duration::from_millis(50));

        let mut reader = prefetching.into_inner().unwrap();
        assert_eq!(reader.current_sample_position(), 1);
        assert_eq!(reader.invalid_sequences(), 0);

        let ids: Vec<Vec<u64>> = (0..3)
            .map(|_| reader.next_batch(1, 1).unwrap().sequence_ids())
            .collect();
        assert_eq!(ids, vec![vec![1], vec![], vec![3]]);
        assert_eq!(reader.invalid_sequences(), 1);
    }

    #[test]
    fn test_zero_budget_rejected() {
        let result = PrefetchingReader::new(reader(WorkerConfig::single()), &enabled(2), 0, 3);
        assert!(matches!(
            result,
            Err(ReaderError::InvalidBudget { which: "global", .. })
        ));
    }

    #[test]
    fn test_error_ends_prefetching() {
        let deserializer = MemoryDeserializer::builder(["x"])
            .chunk(&[1, 1, 1, 1])
            .failing_sequence(2)
            .build();
        let mut config = ReaderConfig::default();
        config.extraction.multithreaded = false;
        let reader = SweepReader::new(Arc::new(deserializer), &config).unwrap();

        let mut prefetching = PrefetchingReader::new(reader, &enabled(2), 2, 2).unwrap();
        assert_eq!(prefetching.next_batch().unwrap().sequence_ids(), vec![0, 1]);
        assert!(matches!(
            prefetching.next_batch(),
            Err(ReaderError::Extraction { sequence_id: 2, .. })
        ));
        assert!(matches!(
            prefetching.next_batch(),
            Err(ReaderError::Prefetch { .. })
        ));
        assert_eq!(prefetching.consumed_position(), 2);
    }

    #[test]
    fn test_iterator_stops_after_error() {
        let deserializer = MemoryDeserializer::builder(["x"])
            .chunk(&[1, 1, 1, 1])
            .failing_sequence(0)
            .build();
        let reader = SweepReader::new(Arc::new(deserializer), &ReaderConfig::default()).unwrap();

        let results: Vec<_> = PrefetchingReader::new(reader, &enabled(2), 2, 2)
            .unwrap()
            .collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }
}
