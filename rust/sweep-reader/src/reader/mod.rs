// rust/sweep-reader/src/reader/mod.rs

//! Sequential minibatch reading with worker sharding.
//!
//! The reader walks one fixed global sequence order (chunks in ascending
//! id order, wrapping at the end of each sweep). Each worker keeps the
//! sequences whose global position modulo the worker count equals its
//! rank, and every walked sequence counts against the global budget, so
//! workers that start from the same position produce disjoint batches
//! without talking to each other.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sweep_reader::config::{EpochConfig, EpochSize, ReaderConfig, WorkerConfig};
//! use sweep_reader::dataset::MemoryDeserializer;
//! use sweep_reader::reader::SweepReader;
//!
//! let deserializer = MemoryDeserializer::builder(["features"])
//!     .chunk(&[2, 3, 1])
//!     .chunk(&[4, 2])
//!     .build();
//!
//! let mut reader = SweepReader::new(Arc::new(deserializer), &ReaderConfig::default())?;
//! reader.start_epoch(EpochConfig::new(0, EpochSize::FullSweep, WorkerConfig::new(0, 2)))?;
//!
//! let batch = reader.next_batch(6, 6)?;
//! assert_eq!(batch.sequence_ids(), vec![0, 2]);
//! assert_eq!(reader.current_sample_position(), 6);
//! # Ok::<(), sweep_reader::ReaderError>(())
//! ```

mod assembler;
mod chunk_index;
mod cleaner;
mod cursor;
mod materializer;
mod sharding;
mod sweep;

pub use chunk_index::ChunkIndex;
pub use cleaner::SequenceCleaner;
pub use cursor::{Cursor, CursorPosition, Step};
pub use sharding::is_local;
pub use sweep::SweepReader;
