// rust/sweep-reader/src/reader/sweep.rs

use std::sync::Arc;

use crate::checkpoint::ReaderCheckpoint;
use crate::config::{EpochConfig, EpochSize, ReaderConfig, WorkerConfig};
use crate::dataset::{Batch, ChunkId, Deserializer, StreamDescription};
use crate::error::{ReaderError, Result};

use super::assembler;
use super::chunk_index::ChunkIndex;
use super::cleaner::SequenceCleaner;
use super::cursor::{Cursor, CursorPosition};
use super::materializer::{ChunkCache, Materializer};

/// Sequential, non-randomized minibatch reader.
///
/// Walks the dataset chunk by chunk in ascending id order, wrapping at the
/// end of each sweep, and deals sequences to workers round-robin by their
/// global sequence position. The reader keeps its position at sample
/// granularity, so a run can be checkpointed and resumed exactly.
///
/// A reader is driven from one thread; only payload extraction fans out to
/// the extraction pool.
pub struct SweepReader {
    deserializer: Arc<dyn Deserializer>,
    streams: Vec<StreamDescription>,
    index: Arc<ChunkIndex>,
    cursor: Cursor,
    cache: ChunkCache,
    materializer: Materializer,
    cleaner: SequenceCleaner,
    epoch: EpochConfig,
    epoch_size: u64,
}

impl SweepReader {
    /// Creates a reader positioned at sample 0 of epoch 0, as the only worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the dataset has no
    /// samples, or the first chunk's sequences cannot be loaded.
    pub fn new(deserializer: Arc<dyn Deserializer>, config: &ReaderConfig) -> Result<Self> {
        config.validate()?;

        let streams = deserializer.stream_descriptions();
        let index = Arc::new(ChunkIndex::new(deserializer.chunk_descriptions())?);
        let cursor = Cursor::new(deserializer.clone(), index.clone())?;
        let materializer = Materializer::new(&config.extraction, streams.len())?;
        let epoch = EpochConfig::default();

        tracing::debug!(
            chunks = index.chunk_count(),
            streams = streams.len(),
            total_samples = index.total_samples(),
            total_sequences = index.total_sequences(),
            "sweep reader created"
        );

        Ok(Self {
            deserializer,
            streams,
            epoch_size: epoch.epoch_size.resolve(index.total_samples()),
            index,
            cursor,
            cache: ChunkCache::default(),
            materializer,
            cleaner: SequenceCleaner::new(config.cleaning.max_invalid_sequences),
            epoch,
        })
    }

    /// Starts an epoch: stores the configuration and seeks to
    /// `epoch_size * epoch_index`.
    pub fn start_epoch(&mut self, config: EpochConfig) -> Result<()> {
        config.validate()?;

        let epoch_size = config.epoch_size.resolve(self.index.total_samples());
        let start = epoch_size.checked_mul(config.epoch_index).ok_or_else(|| {
            ReaderError::config(format!(
                "epoch {} of {epoch_size} samples starts beyond the addressable range",
                config.epoch_index
            ))
        })?;

        self.epoch = config;
        self.epoch_size = epoch_size;

        tracing::debug!(
            epoch_index = config.epoch_index,
            epoch_size,
            worker_rank = config.worker.worker_rank,
            number_of_workers = config.worker.number_of_workers,
            start,
            "starting epoch"
        );
        self.set_current_sample_position(start)
    }

    /// Moves to the first sequence boundary at or after `sample_position`.
    pub fn set_current_sample_position(&mut self, sample_position: u64) -> Result<()> {
        self.cursor.seek(sample_position)
    }

    /// Switches to free streaming for the given worker layout.
    ///
    /// The epoch index becomes 0 and the epoch size unbounded. The position
    /// is left untouched.
    pub fn set_configuration(&mut self, worker: WorkerConfig) -> Result<()> {
        worker.validate()?;
        self.epoch = EpochConfig::new(0, EpochSize::Unbounded, worker);
        self.epoch_size = EpochSize::Unbounded.resolve(self.index.total_samples());
        Ok(())
    }

    pub fn current_sample_position(&self) -> u64 {
        self.cursor.sample_position()
    }

    pub fn current_sequence_position(&self) -> u64 {
        self.cursor.sequence_position()
    }

    pub fn cursor_position(&self) -> CursorPosition {
        self.cursor.position()
    }

    pub fn epoch_config(&self) -> &EpochConfig {
        &self.epoch
    }

    /// Sample position at which the current epoch ends.
    pub fn epoch_end(&self) -> u64 {
        self.epoch_size.saturating_mul(self.epoch.epoch_index.saturating_add(1))
    }

    pub fn stream_descriptions(&self) -> &[StreamDescription] {
        &self.streams
    }

    /// Samples in one sweep over the dataset.
    pub fn total_samples(&self) -> u64 {
        self.index.total_samples()
    }

    pub fn chunk_count(&self) -> usize {
        self.index.chunk_count()
    }

    /// Ids of the realized chunks retained from the last batch.
    pub fn retained_chunks(&self) -> Vec<ChunkId> {
        self.cache.chunk_ids()
    }

    /// Invalid sequences dropped so far.
    pub fn invalid_sequences(&self) -> usize {
        self.cleaner.invalid_sequences()
    }

    pub(crate) fn set_invalid_sequences(&mut self, invalid_sequences: usize) {
        self.cleaner.set_invalid_sequences(invalid_sequences);
    }

    /// Reads this worker's share of the next minibatch.
    ///
    /// `global_sample_budget` bounds the samples walked across all workers
    /// and is clamped so the batch stays inside the current epoch and sweep;
    /// `local_sample_budget` bounds the samples returned to this worker. The
    /// first sequence of a batch is taken even if it exceeds either budget.
    ///
    /// Once the position reaches the epoch end, an empty batch with
    /// `end_of_epoch` set is returned without further work.
    ///
    /// # Errors
    ///
    /// Zero budgets are rejected before anything moves. Any later failure
    /// (a window load, chunk fetch, extraction or cleaner error) leaves the
    /// position unspecified: sequences walked before the failure stay
    /// consumed. Seek with [`set_current_sample_position`] or
    /// [`restore`] before reading on.
    ///
    /// [`set_current_sample_position`]: Self::set_current_sample_position
    /// [`restore`]: Self::restore
    pub fn next_batch(
        &mut self,
        global_sample_budget: u64,
        local_sample_budget: u64,
    ) -> Result<Batch> {
        if global_sample_budget == 0 {
            return Err(ReaderError::invalid_budget("global", 0));
        }
        if local_sample_budget == 0 {
            return Err(ReaderError::invalid_budget("local", 0));
        }

        let position = self.cursor.sample_position();
        let epoch_end = self.epoch_end();
        if position >= epoch_end {
            return Ok(Batch::empty(true));
        }

        let total_samples = self.index.total_samples();
        let global_sample_budget = global_sample_budget
            .min(epoch_end - position)
            .min(total_samples - position % total_samples);
        if global_sample_budget == 0 {
            return Err(ReaderError::DegenerateBudget { position });
        }

        let sequences = assembler::next_sequence_descriptions(
            &mut self.cursor,
            &self.epoch.worker,
            global_sample_budget,
            local_sample_budget,
        )?;

        let end_of_epoch = self.cursor.sample_position() >= epoch_end;
        if sequences.is_empty() {
            return Ok(Batch::empty(end_of_epoch));
        }

        self.cache.resolve(&sequences, self.deserializer.as_ref())?;
        let data = self.materializer.extract(&self.cache, &sequences)?;

        let mut batch = Batch {
            data,
            sequences,
            end_of_epoch,
        };
        self.cleaner.clean(&mut batch)?;
        Ok(batch)
    }

    /// Captures the position and epoch settings for a later [`restore`](Self::restore).
    pub fn checkpoint(&self) -> ReaderCheckpoint {
        ReaderCheckpoint::new(self.cursor.sample_position(), self.epoch)
    }

    /// Re-applies a checkpoint's epoch settings and position.
    pub fn restore(&mut self, checkpoint: &ReaderCheckpoint) -> Result<()> {
        checkpoint.epoch.validate()?;

        self.epoch = checkpoint.epoch;
        self.epoch_size = checkpoint.epoch.epoch_size.resolve(self.index.total_samples());
        self.set_current_sample_position(checkpoint.sample_position)
    }
}
