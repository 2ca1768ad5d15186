// ============================================================
// Layer 4 - Data Pipeline
// ============================================================
// Everything between the raw parallel corpus and tensor batches.
//
//   corpus .tsv
//       │
//       ▼
//   TsvCorpusLoader   → reads rows, skips malformed or non-UTF-8 ones
//       │
//       ▼
//   Cleaners          → Han-only + jieba (zh), lowercase ASCII (en)
//       │
//       ▼
//   Vocabulary        → (domain layer) ids, encode to max_len
//       │
//       ▼
//   EncodedCorpus     → encoder_input / decoder_input / decoder_target
//       │
//       ▼
//   TranslationDataset → implements Burn's Dataset trait
//       │
//       ▼
//   DataLoader        → Burn's seeded shuffle (single, data-parallel)
//   ShardSampler      → per-worker index order (distributed)
//       │
//       ▼
//   TranslationBatcher → stacks items into Int tensors
//
// Reference: Burn Book §4 (Datasets and Dataloaders)
//            Rust Book §13 (Iterators and Closures)

/// Reads the tab separated parallel corpus
pub mod loader;

/// Per-language text normalisation
pub mod cleaner;

/// Encoded corpus artifact and Burn Dataset
pub mod dataset;

/// Implements Burn's Batcher trait for translation batches
pub mod batcher;

/// Per-worker sharding for distributed training
pub mod sampler;
