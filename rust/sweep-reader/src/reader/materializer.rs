// rust/sweep-reader/src/reader/materializer.rs

//! Chunk resolution and per-sequence payload extraction.

use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::prelude::*;

use crate::config::ExtractionConfig;
use crate::dataset::{Chunk, ChunkId, Deserializer, SequenceData, SequenceDescription};
use crate::error::{ReaderError, Result};

/// Realized chunks referenced by the most recent batch.
#[derive(Default)]
pub(crate) struct ChunkCache {
    chunks: BTreeMap<ChunkId, Arc<dyn Chunk>>,
}

impl ChunkCache {
    /// Replaces the cache with exactly the chunks `sequences` reference.
    ///
    /// Chunks already cached are reused; the others are requested from the
    /// deserializer. Chunks the new batch does not reference are released.
    /// On error the previous cache is kept.
    pub(crate) fn resolve(
        &mut self,
        sequences: &[SequenceDescription],
        deserializer: &dyn Deserializer,
    ) -> Result<()> {
        let mut resolved: BTreeMap<ChunkId, Arc<dyn Chunk>> = BTreeMap::new();

        for sequence in sequences {
            if resolved.contains_key(&sequence.chunk_id) {
                continue;
            }

            let chunk = match self.chunks.get(&sequence.chunk_id) {
                Some(chunk) => chunk.clone(),
                None => {
                    tracing::trace!(chunk_id = sequence.chunk_id, "fetching chunk");
                    deserializer.get_chunk(sequence.chunk_id)?
                }
            };
            resolved.insert(sequence.chunk_id, chunk);
        }

        self.chunks = resolved;
        Ok(())
    }

    pub(crate) fn get(&self, chunk_id: ChunkId) -> Option<&Arc<dyn Chunk>> {
        self.chunks.get(&chunk_id)
    }

    pub(crate) fn chunk_ids(&self) -> Vec<ChunkId> {
        self.chunks.keys().copied().collect()
    }
}

/// Turns sequence descriptions into per-stream payloads, optionally on a
/// fixed-size worker pool.
pub(crate) struct Materializer {
    pool: Option<rayon::ThreadPool>,
    stream_count: usize,
}

impl Materializer {
    pub(crate) fn new(config: &ExtractionConfig, stream_count: usize) -> Result<Self> {
        let pool = if config.multithreaded {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.threads)
                .thread_name(|i| format!("sweep-extract-{i}"))
                .build()
                .map_err(|e| {
                    ReaderError::config_with_source("failed to build extraction thread pool", e)
                })?;
            Some(pool)
        } else {
            None
        };

        Ok(Self { pool, stream_count })
    }

    /// Extracts every sequence; `result[j][i]` is stream `j` of sequence `i`.
    ///
    /// All extraction units run to completion before the first failure, in
    /// sequence order, is returned.
    pub(crate) fn extract(
        &self,
        cache: &ChunkCache,
        sequences: &[SequenceDescription],
    ) -> Result<Vec<Vec<SequenceData>>> {
        let extract_one = |sequence: &SequenceDescription| self.extract_one(cache, sequence);

        let extracted: Vec<Result<Vec<SequenceData>>> = match &self.pool {
            Some(pool) if sequences.len() > 1 => {
                pool.install(|| sequences.par_iter().map(extract_one).collect())
            }
            _ => sequences.iter().map(extract_one).collect(),
        };

        let mut data: Vec<Vec<SequenceData>> = (0..self.stream_count)
            .map(|_| Vec::with_capacity(sequences.len()))
            .collect();

        for streams in extracted {
            for (stream, payload) in data.iter_mut().zip(streams?) {
                stream.push(payload);
            }
        }

        Ok(data)
    }

    fn extract_one(
        &self,
        cache: &ChunkCache,
        sequence: &SequenceDescription,
    ) -> Result<Vec<SequenceData>> {
        let chunk = cache.get(sequence.chunk_id).ok_or(ReaderError::MissingChunk {
            chunk_id: sequence.chunk_id,
        })?;

        let payloads = chunk
            .get_sequence(sequence.id)
            .map_err(|e| ReaderError::extraction(sequence.id, sequence.chunk_id, e))?;

        if payloads.len() != self.stream_count {
            return Err(ReaderError::extraction(
                sequence.id,
                sequence.chunk_id,
                ReaderError::deserializer(format!(
                    "expected {} stream payloads, got {}",
                    self.stream_count,
                    payloads.len()
                )),
            ));
        }

        Ok(payloads)
    }
}
