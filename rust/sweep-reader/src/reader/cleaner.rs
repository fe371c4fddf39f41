// rust/sweep-reader/src/reader/cleaner.rs

use crate::dataset::Batch;
use crate::error::{ReaderError, Result};

/// Drops malformed sequences from batches, up to a lifetime tolerance.
#[derive(Debug)]
pub struct SequenceCleaner {
    max_invalid_sequences: usize,
    invalid_sequences: usize,
}

impl SequenceCleaner {
    pub fn new(max_invalid_sequences: usize) -> Self {
        Self {
            max_invalid_sequences,
            invalid_sequences: 0,
        }
    }

    /// Invalid sequences dropped so far.
    pub fn invalid_sequences(&self) -> usize {
        self.invalid_sequences
    }

    /// Resets the running count, e.g. when batches that were cleaned are
    /// discarded and will be read again.
    pub(crate) fn set_invalid_sequences(&mut self, invalid_sequences: usize) {
        self.invalid_sequences = invalid_sequences;
    }

    /// Removes every sequence with an invalid payload in any stream.
    ///
    /// # Errors
    ///
    /// Fails once the total number of invalid sequences seen exceeds the
    /// configured maximum.
    pub fn clean(&mut self, batch: &mut Batch) -> Result<()> {
        let keep: Vec<bool> = (0..batch.sequences.len())
            .map(|i| batch.data.iter().all(|stream| stream[i].valid))
            .collect();

        let dropped = keep.iter().filter(|&&k| !k).count();
        if dropped == 0 {
            return Ok(());
        }

        self.invalid_sequences += dropped;
        if self.invalid_sequences > self.max_invalid_sequences {
            return Err(ReaderError::TooManyInvalidSequences {
                count: self.invalid_sequences,
                max: self.max_invalid_sequences,
            });
        }

        tracing::warn!(
            dropped,
            total = self.invalid_sequences,
            max = self.max_invalid_sequences,
            "dropped invalid sequences from batch"
        );

        retain_by_mask(&mut batch.sequences, &keep);
        for stream in &mut batch.data {
            retain_by_mask(stream, &keep);
        }
        Ok(())
    }
}

fn retain_by_mask<T>(items: &mut Vec<T>, keep: &[bool]) {
    let mut mask = keep.iter();
    items.retain(|_| mask.next().copied().unwrap_or(true));
}
