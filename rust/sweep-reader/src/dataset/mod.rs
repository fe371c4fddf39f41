// rust/sweep-reader/src/dataset/mod.rs

//! Dataset model consumed by the reader.
//!
//! The reader does not know how chunks are stored. A [`Deserializer`]
//! describes the dataset as an ordered list of chunks, each holding an
//! ordered list of sequences, and hands out realized [`Chunk`]s that
//! materialize per-stream sequence payloads.
//!
//! # Example
//!
//! ```
//! use sweep_reader::dataset::{Deserializer, MemoryDeserializer};
//!
//! let deserializer = MemoryDeserializer::builder(["features"])
//!     .chunk(&[2, 3, 1])
//!     .chunk(&[4, 2])
//!     .build();
//!
//! let chunks = deserializer.chunk_descriptions();
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[1].number_of_samples, 6);
//! ```

mod memory;
mod traits;

pub use memory::{MemoryDeserializer, MemoryDeserializerBuilder, MemorySequence};
pub use traits::{
    Batch, Chunk, ChunkDescription, ChunkId, Deserializer, SequenceData, SequenceDescription,
    SequenceId, StreamDescription,
};
