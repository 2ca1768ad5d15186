// ============================================================
// Layer 2 - Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers, one use case
// per CLI subcommand:
//
//   prepare   → corpus + word vectors  → artifact dir
//   train     → artifact dir           → runs/trainN
//   translate → artifact dir + run dir → text
//
// Rules for this layer:
//   - No ML math or model code here
//   - No printing here (that's Layer 1)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Corpus cleaning, vocabularies, encoding, embedding matrices
pub mod prepare_use_case;

// The training workflow
pub mod train_use_case;

// Loading a trained run and translating with it
pub mod translate_use_case;
