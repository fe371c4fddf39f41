// rust/sweep-reader/src/dataset/memory.rs

//! In-memory deserializer.
//!
//! Holds every chunk's sequences in memory and records how often windows
//! and chunks are requested, which makes it convenient for tests and for
//! feeding small datasets through the reader.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::error::{ReaderError, Result};

use super::traits::{
    Chunk, ChunkDescription, ChunkId, Deserializer, SequenceData, SequenceDescription, SequenceId,
    StreamDescription,
};

/// One sequence held by the in-memory deserializer.
#[derive(Debug, Clone)]
pub struct MemorySequence {
    pub id: SequenceId,
    pub number_of_samples: u32,
    /// One payload per stream.
    pub payloads: Vec<Bytes>,
    pub valid: bool,
}

#[derive(Debug)]
struct MemoryChunk {
    id: ChunkId,
    sequences: Arc<Vec<MemorySequence>>,
    failing: Arc<HashSet<SequenceId>>,
}

impl Chunk for MemoryChunk {
    fn get_sequence(&self, sequence_id: SequenceId) -> Result<Vec<SequenceData>> {
        if self.failing.contains(&sequence_id) {
            return Err(ReaderError::deserializer(format!(
                "failed to decode sequence {sequence_id}"
            )));
        }

        let sequence = self
            .sequences
            .iter()
            .find(|s| s.id == sequence_id)
            .ok_or_else(|| {
                ReaderError::deserializer(format!(
                    "sequence {sequence_id} not found in chunk {}",
                    self.id
                ))
            })?;

        Ok(sequence
            .payloads
            .iter()
            .map(|payload| {
                if sequence.valid {
                    SequenceData::new(payload.clone(), sequence.number_of_samples)
                } else {
                    SequenceData::invalid(sequence.number_of_samples)
                }
            })
            .collect())
    }
}

/// A `Deserializer` over chunks held in memory.
#[derive(Debug)]
pub struct MemoryDeserializer {
    streams: Vec<StreamDescription>,
    chunks: Vec<Arc<Vec<MemorySequence>>>,
    failing: Arc<HashSet<SequenceId>>,
    window_loads: AtomicUsize,
    chunk_requests: Mutex<Vec<ChunkId>>,
}

impl MemoryDeserializer {
    /// Starts a builder with the given stream names.
    pub fn builder<I, S>(streams: I) -> MemoryDeserializerBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MemoryDeserializerBuilder::new(streams)
    }

    /// Number of `sequences_for_chunk` calls served so far.
    pub fn window_loads(&self) -> usize {
        self.window_loads.load(Ordering::Relaxed)
    }

    /// Chunk ids passed to `get_chunk`, in call order.
    pub fn chunk_requests(&self) -> Vec<ChunkId> {
        self.chunk_requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn total_sequences(&self) -> usize {
        self.chunks.iter().map(|c| c.len()).sum()
    }

    fn chunk(&self, chunk_id: ChunkId) -> Result<&Arc<Vec<MemorySequence>>> {
        self.chunks.get(chunk_id as usize).ok_or_else(|| {
            ReaderError::deserializer(format!(
                "chunk {chunk_id} out of range (total chunks: {})",
                self.chunks.len()
            ))
        })
    }
}

impl Deserializer for MemoryDeserializer {
    fn stream_descriptions(&self) -> Vec<StreamDescription> {
        self.streams.clone()
    }

    fn chunk_descriptions(&self) -> Vec<ChunkDescription> {
        self.chunks
            .iter()
            .enumerate()
            .map(|(id, sequences)| ChunkDescription {
                id: id as ChunkId,
                number_of_samples: sequences
                    .iter()
                    .map(|s| u64::from(s.number_of_samples))
                    .sum(),
                number_of_sequences: sequences.len() as u64,
            })
            .collect()
    }

    fn sequences_for_chunk(&self, chunk_id: ChunkId) -> Result<Vec<SequenceDescription>> {
        let sequences = self.chunk(chunk_id)?;
        self.window_loads.fetch_add(1, Ordering::Relaxed);

        Ok(sequences
            .iter()
            .map(|s| SequenceDescription {
                id: s.id,
                chunk_id,
                number_of_samples: s.number_of_samples,
            })
            .collect())
    }

    fn get_chunk(&self, chunk_id: ChunkId) -> Result<Arc<dyn Chunk>> {
        let sequences = self.chunk(chunk_id)?.clone();
        if let Ok(mut requests) = self.chunk_requests.lock() {
            requests.push(chunk_id);
        }

        Ok(Arc::new(MemoryChunk {
            id: chunk_id,
            sequences,
            failing: self.failing.clone(),
        }))
    }
}

/// Builder for [`MemoryDeserializer`].
///
/// Sequence ids are assigned in insertion order across all chunks, so the
/// id of a sequence equals its position in the sweep.
#[derive(Debug)]
pub struct MemoryDeserializerBuilder {
    streams: Vec<StreamDescription>,
    chunks: Vec<Vec<MemorySequence>>,
    invalid: HashSet<SequenceId>,
    failing: HashSet<SequenceId>,
    next_id: SequenceId,
}

impl MemoryDeserializerBuilder {
    pub fn new<I, S>(streams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let streams = streams
            .into_iter()
            .enumerate()
            .map(|(id, name)| StreamDescription::new(id, name))
            .collect();

        Self {
            streams,
            chunks: Vec::new(),
            invalid: HashSet::new(),
            failing: HashSet::new(),
            next_id: 0,
        }
    }

    /// Appends a chunk whose sequences have the given lengths.
    ///
    /// Payloads are generated as `"<stream name>/<sequence id>"`.
    pub fn chunk(mut self, lengths: &[u32]) -> Self {
        let mut sequences = Vec::with_capacity(lengths.len());
        for &number_of_samples in lengths {
            let id = self.next_id;
            self.next_id += 1;

            let payloads = self
                .streams
                .iter()
                .map(|stream| Bytes::from(format!("{}/{id}", stream.name)))
                .collect();

            sequences.push(MemorySequence {
                id,
                number_of_samples,
                payloads,
                valid: true,
            });
        }
        self.chunks.push(sequences);
        self
    }

    /// Flags a sequence as malformed so its payloads come back invalid.
    pub fn invalid_sequence(mut self, id: SequenceId) -> Self {
        self.invalid.insert(id);
        self
    }

    /// Makes `get_sequence` fail for the given sequence.
    pub fn failing_sequence(mut self, id: SequenceId) -> Self {
        self.failing.insert(id);
        self
    }

    pub fn build(self) -> MemoryDeserializer {
        let invalid = self.invalid;
        let chunks = self
            .chunks
            .into_iter()
            .map(|mut sequences| {
                for sequence in &mut sequences {
                    sequence.valid = !invalid.contains(&sequence.id);
                }
                Arc::new(sequences)
            })
            .collect();

        MemoryDeserializer {
            streams: self.streams,
            chunks,
            failing: Arc::new(self.failing),
            window_loads: AtomicUsize::new(0),
            chunk_requests: Mutex::new(Vec::new()),
        }
    }
}
