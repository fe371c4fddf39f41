// rust/sweep-reader/src/checkpoint.rs

//! Reader position checkpoints.
//!
//! The encoded form is:
//! ```text
//! +----------------------+
//! | Header length (u32)  |  <- little-endian
//! +----------------------+
//! | Header (bincode)     |  <- CheckpointHeader
//! +----------------------+
//! | Payload (bincode)    |  <- ReaderCheckpoint
//! +----------------------+
//! ```

use std::hash::Hasher;
use std::path::Path;

use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

use crate::config::EpochConfig;
use crate::error::{ReaderError, Result};

/// Header of an encoded checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointHeader {
    /// Magic bytes identifying a reader checkpoint ("SWRC")
    pub magic: [u8; 4],
    pub version: u32,
    /// Size of the encoded payload
    pub payload_size: u64,
    /// XXHash64 checksum of the encoded payload
    pub checksum: u64,
}

impl CheckpointHeader {
    pub const MAGIC: [u8; 4] = *b"SWRC";

    pub const VERSION: u32 = 1;

    pub fn new(payload_size: u64, checksum: u64) -> Self {
        Self {
            magic: Self::MAGIC,
            version: Self::VERSION,
            payload_size,
            checksum,
        }
    }

    pub fn validate_magic(&self) -> bool {
        self.magic == Self::MAGIC
    }

    pub fn validate_version(&self) -> bool {
        self.version == Self::VERSION
    }
}

/// Everything needed to resume reading where a run left off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderCheckpoint {
    pub sample_position: u64,
    pub epoch: EpochConfig,
}

impl ReaderCheckpoint {
    pub fn new(sample_position: u64, epoch: EpochConfig) -> Self {
        Self {
            sample_position,
            epoch,
        }
    }

    /// Serializes the checkpoint with its header.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)
            .map_err(|e| ReaderError::checkpoint_with_source("failed to serialize checkpoint", e))?;

        let header = CheckpointHeader::new(payload.len() as u64, checksum(&payload));
        let header_bytes = bincode::serialize(&header)
            .map_err(|e| ReaderError::checkpoint_with_source("failed to serialize header", e))?;

        let mut encoded = Vec::with_capacity(4 + header_bytes.len() + payload.len());
        encoded.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        encoded.extend_from_slice(&header_bytes);
        encoded.extend_from_slice(&payload);
        Ok(encoded)
    }

    /// Parses and verifies an encoded checkpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is truncated, the magic bytes or
    /// version do not match, or the checksum or size is wrong.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(ReaderError::checkpoint("checkpoint too small"));
        }
        let (len_bytes, rest) = data.split_at(4);
        let header_len =
            u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;

        if rest.len() < header_len {
            return Err(ReaderError::checkpoint(
                "checkpoint truncated: header incomplete",
            ));
        }
        let (header_bytes, payload) = rest.split_at(header_len);

        let header: CheckpointHeader = bincode::deserialize(header_bytes)
            .map_err(|e| ReaderError::checkpoint_with_source("failed to deserialize header", e))?;

        if !header.validate_magic() {
            return Err(ReaderError::checkpoint(format!(
                "invalid magic bytes: expected {:?}, got {:?}",
                CheckpointHeader::MAGIC,
                header.magic
            )));
        }

        if !header.validate_version() {
            return Err(ReaderError::checkpoint(format!(
                "unsupported version: expected {}, got {}",
                CheckpointHeader::VERSION,
                header.version
            )));
        }

        if payload.len() as u64 != header.payload_size {
            return Err(ReaderError::checkpoint(format!(
                "size mismatch: expected {}, got {}",
                header.payload_size,
                payload.len()
            )));
        }

        let computed = checksum(payload);
        if computed != header.checksum {
            return Err(ReaderError::checkpoint(format!(
                "checksum mismatch: expected {}, got {computed}",
                header.checksum
            )));
        }

        bincode::deserialize(payload)
            .map_err(|e| ReaderError::checkpoint_with_source("failed to deserialize checkpoint", e))
    }

    /// Writes the checkpoint to `path` through a temporary file and rename.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let encoded = self.encode()?;

        let file_name = path
            .file_name()
            .ok_or_else(|| ReaderError::checkpoint(format!("invalid checkpoint path {path:?}")))?;
        let temp_path = path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));

        std::fs::write(&temp_path, &encoded)
            .map_err(|e| ReaderError::io(&temp_path, "failed to write checkpoint", e))?;
        std::fs::rename(&temp_path, path)
            .map_err(|e| ReaderError::io(path, "failed to move checkpoint into place", e))?;

        tracing::debug!(path = %path.display(), sample_position = self.sample_position, "saved reader checkpoint");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|e| ReaderError::io(path, "failed to read checkpoint", e))?;
        Self::decode(&data)
    }
}

fn checksum(data: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(data);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EpochSize, WorkerConfig};
    use tempfile::TempDir;

    fn sample_checkpoint() -> ReaderCheckpoint {
        ReaderCheckpoint::new(
            1234,
            EpochConfig::new(3, EpochSize::Samples(500), WorkerConfig::new(2, 8)),
        )
    }

    #[test]
    fn test_header_new() {
        let header = CheckpointHeader::new(100, 42);
        assert!(header.validate_magic());
        assert!(header.validate_version());
        assert_eq!(header.payload_size, 100);
        assert_eq!(header.checksum, 42);
    }

    #[test]
    fn test_encode_decode() {
        let checkpoint = sample_checkpoint();
        let decoded = ReaderCheckpoint::decode(&checkpoint.encode().unwrap()).unwrap();
        assert_eq!(decoded, checkpoint);
    }

    #[test]
    fn test_unbounded_epoch_survives_encoding() {
        let checkpoint = ReaderCheckpoint::new(
            99,
            EpochConfig::new(0, EpochSize::Unbounded, WorkerConfig::single()),
        );
        let decoded = ReaderCheckpoint::decode(&checkpoint.encode().unwrap()).unwrap();
        assert_eq!(decoded.epoch.epoch_size, EpochSize::Unbounded);
    }

    #[test]
    fn test_decode_too_small() {
        assert!(ReaderCheckpoint::decode(&[1, 2]).is_err());
    }

    #[test]
    fn test_decode_truncated_header() {
        let encoded = sample_checkpoint().encode().unwrap();
        assert!(ReaderCheckpoint::decode(&encoded[..8]).is_err());
    }

    #[test]
    fn test_decode_corrupted_payload() {
        let mut encoded = sample_checkpoint().encode().unwrap();
        let last = encoded.len() - 1;
        encoded[last] ^= 0xFF;

        let err = ReaderCheckpoint::decode(&encoded).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_decode_truncated_payload() {
        let encoded = sample_checkpoint().encode().unwrap();
        let err = ReaderCheckpoint::decode(&encoded[..encoded.len() - 1]).unwrap_err();
        assert!(err.to_string().contains("size mismatch"));
    }

    #[test]
    fn test_decode_bad_magic() {
        let mut encoded = sample_checkpoint().encode().unwrap();
        // Magic bytes are the first header field.
        encoded[4] = b'X';

        let err = ReaderCheckpoint::decode(&encoded).unwrap_err();
        assert!(err.to_string().contains("invalid magic bytes"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reader.ckpt");

        let checkpoint = sample_checkpoint();
        checkpoint.save(&path).unwrap();

        assert_eq!(ReaderCheckpoint::load(&path).unwrap(), checkpoint);
        assert!(!dir.path().join(".reader.ckpt.tmp").exists());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = ReaderCheckpoint::load(dir.path().join("missing.ckpt"));
        assert!(matches!(result, Err(ReaderError::Io { .. })));
    }
}
