// rust/sweep-reader/src/error.rs

use std::path::PathBuf;
use thiserror::Error;

use crate::dataset::{ChunkId, SequenceId};

#[derive(Error, Debug)]
pub enum ReaderError {

    #[error("Expected input to contain samples, but the total number of samples is 0")]
    EmptyDataset,

    #[error("Chunk description at position {position} has id {chunk_id}; ids must be contiguous from 0")]
    InvalidChunkId {
        chunk_id: ChunkId,
        position: usize,
    },

    #[error("Invalid {which} sample budget {value}: must be in 1..={max}", max = i32::MAX)]
    InvalidBudget {
        which: &'static str,
        value: u64,
    },

    #[error("Global sample budget clamped to zero at sample position {position}")]
    DegenerateBudget {
        position: u64,
    },

    #[error("Invalid chunk requested: chunk {chunk_id} is not in the resolved chunk set")]
    MissingChunk {
        chunk_id: ChunkId,
    },

    #[error("Deserializer error: {message}")]
    Deserializer {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Failed to extract sequence {sequence_id} from chunk {chunk_id}: {source}")]
    Extraction {
        sequence_id: SequenceId,
        chunk_id: ChunkId,
        #[source]
        source: Box<ReaderError>,
    },

    #[error("Number of invalid sequences ({count}) exceeds the maximum allowed ({max})")]
    TooManyInvalidSequences {
        count: usize,
        max: usize,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Checkpoint error: {message}")]
    Checkpoint {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("I/O error at '{path}': {message}")]
    Io {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Prefetch error: {message}")]
    Prefetch {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, ReaderError>;

// Convenience constructors
impl ReaderError {

    pub fn invalid_budget(which: &'static str, value: u64) -> Self {
        Self::InvalidBudget { which, value }
    }

    pub fn deserializer(message: impl Into<String>) -> Self {
        Self::Deserializer {
            message: message.into(),
            source: None,
        }
    }

    pub fn deserializer_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Deserializer {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn extraction(sequence_id: SequenceId, chunk_id: ChunkId, source: ReaderError) -> Self {
        Self::Extraction {
            sequence_id,
            chunk_id,
            source: Box::new(source),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn checkpoint(message: impl Into<String>) -> Self {
        Self::Checkpoint {
            message: message.into(),
            source: None,
        }
    }

    pub fn checkpoint_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Checkpoint {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn io(path: impl Into<PathBuf>, message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn prefetch(message: impl Into<String>) -> Self {
        Self::Prefetch {
            message: message.into(),
        }
    }
}
