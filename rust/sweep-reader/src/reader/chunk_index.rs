// rust/sweep-reader/src/reader/chunk_index.rs

use crate::dataset::{ChunkDescription, ChunkId};
use crate::error::{ReaderError, Result};

/// Prefix sums over the chunk descriptions of one sweep.
///
/// `sample_offsets[i]` is the number of samples in chunks `[0, i)` and
/// `sequence_offsets[i]` the number of sequences. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct ChunkIndex {
    chunks: Vec<ChunkDescription>,
    sample_offsets: Vec<u64>,
    sequence_offsets: Vec<u64>,
    total_samples: u64,
    total_sequences: u64,
}

impl ChunkIndex {
    /// Builds the index.
    ///
    /// # Errors
    ///
    /// Fails if chunk ids are not contiguous from 0 or if the dataset has
    /// no samples.
    pub fn new(chunks: Vec<ChunkDescription>) -> Result<Self> {
        let mut sample_offsets = Vec::with_capacity(chunks.len());
        let mut sequence_offsets = Vec::with_capacity(chunks.len());
        let mut total_samples = 0u64;
        let mut total_sequences = 0u64;

        for (position, chunk) in chunks.iter().enumerate() {
            if chunk.id as usize != position {
                return Err(ReaderError::InvalidChunkId {
                    chunk_id: chunk.id,
                    position,
                });
            }

            sample_offsets.push(total_samples);
            sequence_offsets.push(total_sequences);
            total_samples += chunk.number_of_samples;
            total_sequences += chunk.number_of_sequences;
        }

        if total_samples == 0 {
            return Err(ReaderError::EmptyDataset);
        }

        Ok(Self {
            chunks,
            sample_offsets,
            sequence_offsets,
            total_samples,
            total_sequences,
        })
    }

    /// Returns the chunk whose sample range contains `sweep_offset`.
    ///
    /// The offset must be below [`total_samples`](Self::total_samples).
    /// Chunks without samples are never returned.
    pub fn locate(&self, sweep_offset: u64) -> ChunkId {
        debug_assert!(sweep_offset < self.total_samples);
        let upper = self.sample_offsets.partition_point(|&offset| offset <= sweep_offset);
        (upper - 1) as ChunkId
    }

    pub fn chunk(&self, chunk_id: ChunkId) -> &ChunkDescription {
        &self.chunks[chunk_id as usize]
    }

    pub fn sample_offset(&self, chunk_id: ChunkId) -> u64 {
        self.sample_offsets[chunk_id as usize]
    }

    pub fn sequence_offset(&self, chunk_id: ChunkId) -> u64 {
        self.sequence_offsets[chunk_id as usize]
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Chunk following `chunk_id` in sweep order, wrapping to 0.
    pub fn next_chunk(&self, chunk_id: ChunkId) -> ChunkId {
        ((chunk_id as usize + 1) % self.chunks.len()) as ChunkId
    }

    /// Samples in one sweep.
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    /// Sequences in one sweep.
    pub fn total_sequences(&self) -> u64 {
        self.total_sequences
    }
}
