// ============================================================
// Layer 3 - Core Traits (Abstractions)
// ============================================================
// The seams between layers. The application layer talks to these
// traits; the data and infra layers provide the implementations:
//
//   CorpusSource     <- data::loader::TsvCorpusLoader
//   TextCleaner      <- data::cleaner::{ChineseCleaner, EnglishCleaner}
//   EmbeddingSource  <- infra::vectors::PretrainedVectors
//   Translator       <- application::translate_use_case::TranslateUseCase
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;

use crate::domain::sentence_pair::SentencePair;

// ─── CorpusSource ─────────────────────────────────────────────────────────────
/// Anything that can produce raw (uncleaned) parallel sentences.
pub trait CorpusSource {
    /// Load every usable sentence pair. Malformed rows are skipped by
    /// the implementation, not reported as errors.
    fn load_pairs(&self) -> Result<Vec<SentencePair>>;
}

// ─── TextCleaner ──────────────────────────────────────────────────────────────
/// A pure, language-specific normaliser producing whitespace
/// separated tokens.
pub trait TextCleaner {
    fn clean(&self, text: &str) -> String;
}

// ─── EmbeddingSource ──────────────────────────────────────────────────────────
/// A pretrained word-vector table: a membership test plus a lookup.
pub trait EmbeddingSource {
    /// Length of every vector in the table
    fn dim(&self) -> usize;

    fn contains(&self, token: &str) -> bool;

    fn vector(&self, token: &str) -> Option<&[f32]>;
}

// ─── Translator ───────────────────────────────────────────────────────────────
/// Anything that turns one source sentence into target text.
pub trait Translator {
    fn translate(&self, text: &str) -> Result<String>;
}
