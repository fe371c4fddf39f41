// rust/sweep-reader/tests/sweep_properties.rs

//! Property tests for sweep order, sharding and budget accounting.

use std::sync::Arc;

use proptest::prelude::*;
use sweep_reader::dataset::{Deserializer, MemoryDeserializer};
use sweep_reader::reader::{ChunkIndex, Cursor};
use sweep_reader::{EpochConfig, EpochSize, ReaderConfig, SweepReader, WorkerConfig};

fn dataset(chunks: &[Vec<u32>]) -> MemoryDeserializer {
    chunks
        .iter()
        .fold(MemoryDeserializer::builder(["features", "labels"]), |builder, lengths| {
            builder.chunk(lengths)
        })
        .build()
}

fn serial_reader(chunks: &[Vec<u32>]) -> SweepReader {
    let mut config = ReaderConfig::default();
    config.extraction.multithreaded = false;
    SweepReader::new(Arc::new(dataset(chunks)), &config).unwrap()
}

fn chunk_lengths() -> impl Strategy<Value = Vec<Vec<u32>>> {
    prop::collection::vec(prop::collection::vec(1u32..=5, 1..=4), 1..=5)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_locate_finds_containing_chunk(chunks in chunk_lengths()) {
        let deserializer = dataset(&chunks);
        let index = ChunkIndex::new(deserializer.chunk_descriptions()).unwrap();

        for offset in 0..index.total_samples() {
            let chunk_id = index.locate(offset);
            let start = index.sample_offset(chunk_id);
            let end = start + index.chunk(chunk_id).number_of_samples;
            prop_assert!(start <= offset && offset < end, "offset {} outside chunk {}", offset, chunk_id);
        }
    }

    #[test]
    fn test_full_sweep_of_advances_returns_to_start(chunks in chunk_lengths()) {
        let deserializer = Arc::new(dataset(&chunks));
        let index = Arc::new(ChunkIndex::new(deserializer.chunk_descriptions()).unwrap());
        let mut cursor = Cursor::new(deserializer, index.clone()).unwrap();

        let start = cursor.position();
        for _ in 0..index.total_sequences() {
            cursor.advance().unwrap();
        }
        let end = cursor.position();

        prop_assert_eq!(end.chunk_id, start.chunk_id);
        prop_assert_eq!(end.sequence_in_chunk, start.sequence_in_chunk);
        prop_assert_eq!(end.sample_position, start.sample_position + index.total_samples());
        prop_assert_eq!(end.sequence_position, start.sequence_position + index.total_sequences());
    }

    #[test]
    fn test_workers_partition_the_sweep(
        chunks in chunk_lengths(),
        workers in 1u32..=4,
        global in 1u64..=20,
        local in 1u64..=20,
    ) {
        let total_sequences: u64 = chunks.iter().map(|c| c.len() as u64).sum();
        let mut seen = Vec::new();

        for rank in 0..workers {
            let mut reader = serial_reader(&chunks);
            reader
                .start_epoch(EpochConfig::new(0, EpochSize::FullSweep, WorkerConfig::new(rank, workers)))
                .unwrap();

            let mut ids = Vec::new();
            for _ in 0..=total_sequences {
                let batch = reader.next_batch(global, local).unwrap();

                // Only a lone first sequence may exceed the local budget.
                prop_assert!(batch.number_of_sequences() <= 1 || batch.number_of_samples() <= local);

                ids.extend(batch.sequence_ids());
                if batch.end_of_epoch {
                    break;
                }
            }

            let expected: Vec<u64> = (0..total_sequences)
                .filter(|id| id % u64::from(workers) == u64::from(rank))
                .collect();
            prop_assert_eq!(&ids, &expected);
            prop_assert_eq!(reader.current_sample_position(), reader.total_samples());
            seen.extend(ids);
        }

        seen.sort_unstable();
        prop_assert_eq!(seen, (0..total_sequences).collect::<Vec<_>>());
    }

    #[test]
    fn test_batches_stay_inside_epoch_and_sweep(
        chunks in chunk_lengths(),
        sweeps_per_epoch in 1u64..=3,
        epoch_index in 0u64..=2,
        workers in 1u32..=3,
        global in 1u64..=30,
        local in 1u64..=30,
    ) {
        let mut reader = serial_reader(&chunks);
        let total = reader.total_samples();
        reader
            .start_epoch(EpochConfig::new(
                epoch_index,
                EpochSize::Samples(total * sweeps_per_epoch),
                WorkerConfig::new(0, workers),
            ))
            .unwrap();
        let epoch_end = reader.epoch_end();
        let mut end_flags = 0;

        for _ in 0..=(total * sweeps_per_epoch) {
            let before = reader.current_sample_position();
            let sweep_end = (before / total + 1) * total;
            let batch = reader.next_batch(global, local).unwrap();
            let after = reader.current_sample_position();

            prop_assert!(after <= epoch_end.min(sweep_end));
            prop_assert_eq!(batch.end_of_epoch, after >= epoch_end);
            if batch.end_of_epoch {
                end_flags += 1;
                break;
            }
        }
        prop_assert_eq!(end_flags, 1);
    }

    #[test]
    fn test_seek_snaps_to_next_boundary_repeatably(chunks in chunk_lengths(), target in 0u64..60) {
        let max_length = u64::from(chunks.iter().flatten().copied().max().unwrap_or(1));
        let mut reader = serial_reader(&chunks);

        reader.set_current_sample_position(target).unwrap();
        let first = reader.cursor_position();
        reader.set_current_sample_position(target).unwrap();
        let second = reader.cursor_position();

        prop_assert_eq!(first, second);
        prop_assert!(first.sample_position >= target);
        prop_assert!(first.sample_position < target + max_length);
    }
}
