// rust/sweep-reader/src/dataset/traits.rs

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Identifier of a chunk. Chunks are numbered contiguously from 0.
pub type ChunkId = u32;

/// Identifier of a sequence, as assigned by the deserializer.
pub type SequenceId = u64;

/// One data stream exposed by the dataset (an input "view").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescription {
    /// Position of the stream in every per-stream result.
    pub id: usize,
    pub name: String,
}

impl StreamDescription {
    pub fn new(id: usize, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Size information for one chunk of the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDescription {
    pub id: ChunkId,
    pub number_of_samples: u64,
    pub number_of_sequences: u64,
}

/// One training example residing in a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceDescription {
    pub id: SequenceId,
    pub chunk_id: ChunkId,
    pub number_of_samples: u32,
}

/// Raw payload of one sequence in one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceData {
    pub data: Bytes,
    pub number_of_samples: u32,
    /// `false` when the deserializer could not decode this sequence.
    pub valid: bool,
}

impl SequenceData {
    pub fn new(data: impl Into<Bytes>, number_of_samples: u32) -> Self {
        Self {
            data: data.into(),
            number_of_samples,
            valid: true,
        }
    }

    /// A payload flagged as malformed; dropped by the sequence cleaner.
    pub fn invalid(number_of_samples: u32) -> Self {
        Self {
            data: Bytes::new(),
            number_of_samples,
            valid: false,
        }
    }
}

/// A realized chunk that can materialize the payloads of its sequences.
///
/// Implementations are shared between the reader's chunk cache and the
/// extraction workers, so `get_sequence` may be called concurrently for
/// distinct sequences.
pub trait Chunk: Send + Sync {
    /// Returns one payload per stream, in stream order.
    fn get_sequence(&self, sequence_id: SequenceId) -> Result<Vec<SequenceData>>;
}

/// Source of chunk and sequence descriptions and realized chunks.
///
/// The reader calls `stream_descriptions` and `chunk_descriptions` once
/// at construction. `sequences_for_chunk` and `get_chunk` are only called
/// from the thread driving the reader.
pub trait Deserializer: Send + Sync {
    fn stream_descriptions(&self) -> Vec<StreamDescription>;

    /// Chunk descriptions ordered by id, ids contiguous from 0.
    fn chunk_descriptions(&self) -> Vec<ChunkDescription>;

    /// Sequence descriptions of one chunk, in sweep order.
    fn sequences_for_chunk(&self, chunk_id: ChunkId) -> Result<Vec<SequenceDescription>>;

    fn get_chunk(&self, chunk_id: ChunkId) -> Result<Arc<dyn Chunk>>;
}

/// Result of one `next_batch` call.
///
/// `data[j][i]` is the payload of stream `j` for sequence `i`, and
/// `sequences[i]` describes sequence `i`.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub data: Vec<Vec<SequenceData>>,
    pub sequences: Vec<SequenceDescription>,
    pub end_of_epoch: bool,
}

impl Batch {
    /// A batch carrying no sequences.
    pub fn empty(end_of_epoch: bool) -> Self {
        Self {
            data: Vec::new(),
            sequences: Vec::new(),
            end_of_epoch,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn number_of_sequences(&self) -> usize {
        self.sequences.len()
    }

    /// Total samples over the batch's sequences.
    pub fn number_of_samples(&self) -> u64 {
        self.sequences
            .iter()
            .map(|s| u64::from(s.number_of_samples))
            .sum()
    }

    /// Ids of the sequences in batch order.
    pub fn sequence_ids(&self) -> Vec<SequenceId> {
        self.sequences.iter().map(|s| s.id).collect()
    }
}
