// rust/sweep-reader/src/reader/cursor.rs

use std::sync::Arc;

use crate::dataset::{ChunkId, Deserializer, SequenceDescription};
use crate::error::{ReaderError, Result};

use super::chunk_index::ChunkIndex;

/// Snapshot of the cursor's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorPosition {
    pub chunk_id: ChunkId,
    pub sequence_in_chunk: usize,
    /// Absolute sample position, counting every sweep from the start.
    pub sample_position: u64,
    /// Absolute sequence position, counting every sweep from the start.
    pub sequence_position: u64,
}

/// Outcome of advancing the cursor by one sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    WithinChunk,
    /// The window was swapped for the next non-empty chunk.
    CrossedBoundary { chunk_id: ChunkId },
}

/// Sequence descriptions of exactly the chunk under the cursor.
#[derive(Debug)]
struct SequenceWindow {
    chunk_id: ChunkId,
    sequences: Vec<SequenceDescription>,
}

impl SequenceWindow {
    fn load(
        deserializer: &dyn Deserializer,
        index: &ChunkIndex,
        chunk_id: ChunkId,
    ) -> Result<Self> {
        let sequences = deserializer.sequences_for_chunk(chunk_id)?;
        let description = index.chunk(chunk_id);

        let samples: u64 = sequences.iter().map(|s| u64::from(s.number_of_samples)).sum();
        if sequences.len() as u64 != description.number_of_sequences
            || samples != description.number_of_samples
        {
            return Err(ReaderError::deserializer(format!(
                "chunk {chunk_id} window has {} sequences / {samples} samples, description says {} / {}",
                sequences.len(),
                description.number_of_sequences,
                description.number_of_samples
            )));
        }

        if let Some(foreign) = sequences.iter().find(|s| s.chunk_id != chunk_id) {
            return Err(ReaderError::deserializer(format!(
                "sequence {} in window of chunk {chunk_id} claims chunk {}",
                foreign.id, foreign.chunk_id
            )));
        }

        tracing::trace!(chunk_id, sequences = sequences.len(), "loaded sequence window");
        Ok(Self {
            chunk_id,
            sequences,
        })
    }
}

/// Walks the global sequence order: ascending chunk id, wrapping at the
/// end of each sweep. The order is the same for every worker.
pub struct Cursor {
    deserializer: Arc<dyn Deserializer>,
    index: Arc<ChunkIndex>,
    window: SequenceWindow,
    sequence_in_chunk: usize,
    sample_position: u64,
    sequence_position: u64,
}

impl Cursor {
    /// Creates a cursor at sample position 0.
    pub fn new(deserializer: Arc<dyn Deserializer>, index: Arc<ChunkIndex>) -> Result<Self> {
        let first = index.locate(0);
        let window = SequenceWindow::load(deserializer.as_ref(), &index, first)?;

        Ok(Self {
            deserializer,
            index,
            window,
            sequence_in_chunk: 0,
            sample_position: 0,
            sequence_position: 0,
        })
    }

    pub fn position(&self) -> CursorPosition {
        CursorPosition {
            chunk_id: self.window.chunk_id,
            sequence_in_chunk: self.sequence_in_chunk,
            sample_position: self.sample_position,
            sequence_position: self.sequence_position,
        }
    }

    pub fn sample_position(&self) -> u64 {
        self.sample_position
    }

    pub fn sequence_position(&self) -> u64 {
        self.sequence_position
    }

    /// Sequence under the cursor.
    pub fn current(&self) -> &SequenceDescription {
        &self.window.sequences[self.sequence_in_chunk]
    }

    /// Moves past the current sequence.
    ///
    /// On the last sequence of a chunk the window is replaced by the next
    /// chunk with sequences. The replacement is loaded before any state
    /// changes, so a failed load leaves the cursor where it was.
    pub fn advance(&mut self) -> Result<Step> {
        let length = u64::from(self.current().number_of_samples);

        let step = if self.sequence_in_chunk + 1 < self.window.sequences.len() {
            self.sequence_in_chunk += 1;
            Step::WithinChunk
        } else {
            let window = self.load_next_window()?;
            let chunk_id = window.chunk_id;
            self.window = window;
            self.sequence_in_chunk = 0;
            Step::CrossedBoundary { chunk_id }
        };

        self.sample_position += length;
        self.sequence_position += 1;
        Ok(step)
    }

    fn load_next_window(&self) -> Result<SequenceWindow> {
        let mut chunk_id = self.window.chunk_id;
        // The index guarantees at least one chunk with samples, hence with sequences.
        for _ in 0..self.index.chunk_count() {
            chunk_id = self.index.next_chunk(chunk_id);
            if self.index.chunk(chunk_id).number_of_sequences > 0 {
                return SequenceWindow::load(self.deserializer.as_ref(), &self.index, chunk_id);
            }
        }
        Err(ReaderError::deserializer("no chunk with sequences to advance to"))
    }

    /// Repositions the cursor at the first sequence boundary at or after
    /// `sample_position`.
    ///
    /// Linear in the number of sequences skipped inside the target chunk;
    /// meant for epoch boundaries and checkpoint restore.
    pub fn seek(&mut self, sample_position: u64) -> Result<()> {
        let total_samples = self.index.total_samples();
        let sweep = sample_position / total_samples;
        let sweep_offset = sample_position % total_samples;

        let chunk_id = self.index.locate(sweep_offset);
        if chunk_id != self.window.chunk_id {
            self.window = SequenceWindow::load(self.deserializer.as_ref(), &self.index, chunk_id)?;
        }

        self.sequence_in_chunk = 0;
        self.sample_position = sweep * total_samples + self.index.sample_offset(chunk_id);
        self.sequence_position =
            sweep * self.index.total_sequences() + self.index.sequence_offset(chunk_id);

        let target = sweep_offset - self.index.sample_offset(chunk_id);
        let mut skipped = 0u64;
        while skipped < target {
            skipped += u64::from(self.current().number_of_samples);
            self.advance()?;
        }

        tracing::debug!(
            requested = sample_position,
            sample_position = self.sample_position,
            sequence_position = self.sequence_position,
            chunk_id = self.window.chunk_id,
            "cursor repositioned"
        );
        Ok(())
    }
}
