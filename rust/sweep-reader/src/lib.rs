// rust/sweep-reader/src/lib.rs

//! Sweep Reader - Sequential Minibatch Reading
//!
//! This crate reads a chunked dataset in a fixed, non-randomized order and
//! assembles minibatches under sample budgets, sharding sequences across
//! data-parallel workers without any coordination between them. It
//! provides the chunk index, cursor, sharding policy, batch assembly, chunk
//! caching with parallel payload extraction, epoch control, read-ahead
//! prefetching and position checkpoints.

pub mod config;
pub mod error;

// Re-export commonly used types for convenience
pub use config::{EpochConfig, EpochSize, ReaderConfig, WorkerConfig};
pub use error::{ReaderError, Result};

pub mod dataset;
pub use dataset::{Batch, Chunk, Deserializer, SequenceData, SequenceDescription};

pub mod reader;
pub use reader::SweepReader;

pub mod checkpoint;
pub use checkpoint::ReaderCheckpoint;

pub mod prefetch;
pub use prefetch::PrefetchingReader;
