// ============================================================
// Layer 3 - Domain Layer
// ============================================================
// Pure Rust structs and traits that define the core concepts of
// the translator.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// One source/target row of the parallel corpus
pub mod sentence_pair;

// Token <-> id mapping, reserved ids, fixed-length encoding
pub mod vocabulary;

// Core abstractions (traits) that other layers implement
pub mod traits;
