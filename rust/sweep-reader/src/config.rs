// rust/sweep-reader/src/config.rs

//! Configuration for the sweep reader.
//!
//! [`ReaderConfig`] holds the static settings (worker pool, cleaning
//! tolerance, prefetching) and is parsed from TOML with environment
//! variable overrides. [`EpochConfig`] and [`WorkerConfig`] are the
//! per-epoch settings supplied by the training loop at run time.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::{ReaderError, Result};

// Top-level reader configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub extraction: ExtractionConfig,
    pub cleaning: CleaningConfig,
    pub prefetch: PrefetchConfig,
}

/// Per-sequence payload extraction settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Whether sequences of a batch are extracted on a worker pool.
    pub multithreaded: bool,
    /// Size of the extraction worker pool.
    pub threads: usize,
}

/// Tolerance for malformed sequences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    /// Invalid sequences tolerated over the reader's lifetime before failing.
    pub max_invalid_sequences: usize,
}

/// Background read-ahead settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    pub enabled: bool,
    /// Number of batches read ahead of the consumer.
    pub buffer_size: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            multithreaded: true,
            threads: 4,
        }
    }
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_size: 2,
        }
    }
}

impl FromStr for ReaderConfig {
    type Err = ReaderError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| ReaderError::config_with_source("failed to parse TOML config", e))
    }
}

impl ReaderConfig {
    // Load configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ReaderError::io(path, "failed to read config file", e))?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    // Apply environment variable overrides.
    //
    // Variables are prefixed with `SWEEP_` followed by section and field:
    // - `SWEEP_EXTRACTION_MULTITHREADED` overrides `extraction.multithreaded`
    // - `SWEEP_EXTRACTION_THREADS` overrides `extraction.threads`
    // - `SWEEP_CLEANING_MAX_INVALID_SEQUENCES` overrides `cleaning.max_invalid_sequences`
    // - `SWEEP_PREFETCH_ENABLED` overrides `prefetch.enabled`
    // - `SWEEP_PREFETCH_BUFFER_SIZE` overrides `prefetch.buffer_size`
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_value("SWEEP_EXTRACTION_MULTITHREADED") {
            self.extraction.multithreaded = v;
        }
        if let Some(v) = env_value("SWEEP_EXTRACTION_THREADS") {
            self.extraction.threads = v;
        }
        if let Some(v) = env_value("SWEEP_CLEANING_MAX_INVALID_SEQUENCES") {
            self.cleaning.max_invalid_sequences = v;
        }
        if let Some(v) = env_value("SWEEP_PREFETCH_ENABLED") {
            self.prefetch.enabled = v;
        }
        if let Some(v) = env_value("SWEEP_PREFETCH_BUFFER_SIZE") {
            self.prefetch.buffer_size = v;
        }
        self
    }

    // Validate all configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.extraction.multithreaded && self.extraction.threads == 0 {
            return Err(ReaderError::config(
                "extraction.threads must be greater than 0 when extraction.multithreaded is set",
            ));
        }

        if self.prefetch.enabled && self.prefetch.buffer_size == 0 {
            return Err(ReaderError::config(
                "prefetch.buffer_size must be greater than 0 when prefetch.enabled is set",
            ));
        }

        Ok(())
    }
}

// Unparsable values are ignored.
fn env_value<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|val| val.parse().ok())
}

/// Epoch size used by [`EpochSize::Unbounded`]; halved so that
/// `size * (index + 1)` cannot overflow for index 0 and 1.
pub const UNBOUNDED_EPOCH_SIZE: u64 = u64::MAX / 2;

/// Length of an epoch in samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpochSize {
    /// One full sweep over the dataset.
    #[default]
    FullSweep,
    Samples(u64),
    /// No epoch boundary; used for free streaming.
    Unbounded,
}

impl EpochSize {
    /// Resolves the size against the dataset's total sample count.
    pub fn resolve(self, total_samples: u64) -> u64 {
        match self {
            EpochSize::FullSweep => total_samples,
            EpochSize::Samples(samples) => samples,
            EpochSize::Unbounded => UNBOUNDED_EPOCH_SIZE,
        }
    }
}

/// Position of this process among the cooperating workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub worker_rank: u32,
    pub number_of_workers: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::single()
    }
}

impl WorkerConfig {
    pub fn new(worker_rank: u32, number_of_workers: u32) -> Self {
        Self {
            worker_rank,
            number_of_workers,
        }
    }

    /// The only worker of a non-distributed run.
    pub fn single() -> Self {
        Self::new(0, 1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.number_of_workers == 0 {
            return Err(ReaderError::config("number_of_workers must be greater than 0"));
        }
        if self.worker_rank >= self.number_of_workers {
            return Err(ReaderError::config(format!(
                "worker_rank {} out of range (number_of_workers: {})",
                self.worker_rank, self.number_of_workers
            )));
        }
        Ok(())
    }
}

/// Settings for one epoch, supplied by the caller to `start_epoch`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochConfig {
    pub epoch_index: u64,
    pub epoch_size: EpochSize,
    pub worker: WorkerConfig,
}

impl EpochConfig {
    pub fn new(epoch_index: u64, epoch_size: EpochSize, worker: WorkerConfig) -> Self {
        Self {
            epoch_index,
            epoch_size,
            worker,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.worker.validate()?;
        if self.epoch_size == EpochSize::Samples(0) {
            return Err(ReaderError::config("epoch_size must be greater than 0"));
        }
        Ok(())
    }
}
