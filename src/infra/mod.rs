// ============================================================
// Layer 6 - Infrastructure Layer
// ============================================================
// Everything that touches the filesystem on behalf of the other
// layers:
//
//   artifacts.rs  - the prepared artifact directory: both
//                   vocabularies, the encoded corpus, the prepare
//                   settings and the two embedding matrices
//
//   vectors.rs    - pretrained word vectors read from flat text
//                   files (GloVe / Tencent layout)
//
//   checkpoint.rs - best/last model checkpoints of a run, their
//                   loss metadata and the configs needed to
//                   rebuild the model
//
//   run_dir.rs    - allocates runs/train0, runs/train1, ...
//
//   metrics.rs    - per-epoch CSV log of a run
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Prepared vocabularies, corpus and embedding matrices
pub mod artifacts;

/// Pretrained word-vector files
pub mod vectors;

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Per-run output directory allocation
pub mod run_dir;

/// Training metrics CSV logger
pub mod metrics;
