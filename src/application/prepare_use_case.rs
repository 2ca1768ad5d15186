// ============================================================
// Layer 2 - PrepareUseCase
// ============================================================
// Turns a raw parallel corpus into the artifact directory that
// training and translation read:
//
//   Step 1: Load sentence pairs from the .tsv          (Layer 4 - data)
//   Step 2: Clean both sides                           (Layer 4 - data)
//   Step 3: Frequency-filtered candidate vocabularies  (Layer 3 - domain)
//   Step 4: Load pretrained vectors for the candidates (Layer 6 - infra)
//   Step 5: Keep only tokens that have a vector        (Layer 3 - domain)
//   Step 6: Encode every pair to max_len               (Layer 4 - data)
//   Step 7: Build both embedding matrices              (Layer 5 - ml)
//   Step 8: Save everything                            (Layer 6 - infra)
//
// Tokens below min_freq or without a pretrained vector are
// dropped from the vocabulary and encode as <unk> from then on.
//
// Reference: Rust Book §8 (Collections)
//            Rust Book §13 (Iterators and Closures)

use anyhow::{bail, Result};
use burn::backend::NdArray;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::data::{
    cleaner::{ChineseCleaner, EnglishCleaner},
    dataset::EncodedCorpus,
    loader::TsvCorpusLoader,
};
use crate::domain::{
    sentence_pair::SentencePair,
    traits::{CorpusSource, TextCleaner},
    vocabulary::Vocabulary,
};
use crate::infra::{artifacts::ArtifactStore, vectors::PretrainedVectors};
use crate::ml::model::pretrained_matrix;

/// Backend the embedding matrices are built on. They are plain data
/// and are written at full precision, so any backend can load them.
type PrepareBackend = NdArray;

// ─── Prepare Configuration ───────────────────────────────────────────────────
/// Saved as prepare_config.json; `translate` reads `max_len` back from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareConfig {
    pub corpus:       String,
    pub artifact_dir: String,
    pub zh_vectors:   String,
    pub en_vectors:   String,
    pub min_freq:     usize,
    pub max_len:      usize,
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            corpus:       "data/en-zh.tsv".to_string(),
            artifact_dir: "artifacts".to_string(),
            zh_vectors:   "data/zh_vectors.txt".to_string(),
            en_vectors:   "data/en_vectors.txt".to_string(),
            min_freq:     10,
            max_len:      50,
        }
    }
}

impl PrepareConfig {
    pub fn validate(&self) -> Result<()> {
        // <sos> + at least one token + <eos>
        if self.max_len < 3 {
            bail!("max_len must be at least 3, got {}", self.max_len);
        }
        if self.min_freq == 0 {
            bail!("min_freq must be at least 1");
        }
        Ok(())
    }
}

/// What `prepare` produced, for the CLI to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareSummary {
    pub pairs:        usize,
    pub source_vocab: usize,
    pub target_vocab: usize,
}

// ─── PrepareUseCase ───────────────────────────────────────────────────────────
pub struct PrepareUseCase {
    config: PrepareConfig,
}

impl PrepareUseCase {
    pub fn new(config: PrepareConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<PrepareSummary> {
        let cfg = &self.config;
        cfg.validate()?;

        // ── Step 1: Load ──────────────────────────────────────────────────────
        let raw = TsvCorpusLoader::new(&cfg.corpus).load_pairs()?;

        // ── Step 2: Clean ─────────────────────────────────────────────────────
        let pairs = clean_pairs(&raw, &ChineseCleaner::new(), &EnglishCleaner::new());

        // ── Step 3: Candidate vocabularies ────────────────────────────────────
        let zh_sentences: Vec<&str> = pairs.iter().map(|p| p.source.as_str()).collect();
        let en_sentences: Vec<&str> = pairs.iter().map(|p| p.target.as_str()).collect();
        let zh_candidates = Vocabulary::from_corpus(&zh_sentences, cfg.min_freq);
        let en_candidates = Vocabulary::from_corpus(&en_sentences, cfg.min_freq);
        tracing::info!(
            "Candidate vocab (min_freq={}): zh={} en={}",
            cfg.min_freq,
            zh_candidates.len(),
            en_candidates.len()
        );

        // ── Step 4: Pretrained vectors, restricted to the candidates ──────────
        // Vector files hold millions of rows; keeping only candidate
        // tokens bounds memory by the corpus vocabulary.
        let zh_vectors = PretrainedVectors::load(&cfg.zh_vectors, Some(&token_set(&zh_candidates)))?;
        let en_vectors = PretrainedVectors::load(&cfg.en_vectors, Some(&token_set(&en_candidates)))?;

        // ── Step 5: Intersect ─────────────────────────────────────────────────
        let zh_vocab = zh_candidates.intersect(&zh_vectors);
        let en_vocab = en_candidates.intersect(&en_vectors);
        tracing::info!("Final vocab: zh={} en={}", zh_vocab.len(), en_vocab.len());

        // ── Step 6: Encode ────────────────────────────────────────────────────
        let corpus = EncodedCorpus::encode(&pairs, &zh_vocab, &en_vocab, cfg.max_len);

        // ── Step 7: Embedding matrices ────────────────────────────────────────
        let device    = Default::default();
        let zh_matrix = pretrained_matrix::<PrepareBackend, _>(&zh_vocab, &zh_vectors, &device)?;
        let en_matrix = pretrained_matrix::<PrepareBackend, _>(&en_vocab, &en_vectors, &device)?;

        // ── Step 8: Save ──────────────────────────────────────────────────────
        let store = ArtifactStore::new(&cfg.artifact_dir);
        store.create()?;
        store.save_vocabularies(&zh_vocab, &en_vocab)?;
        store.save_corpus(&corpus)?;
        store.save_settings(cfg)?;
        store.save_embeddings(zh_matrix, en_matrix)?;
        tracing::info!("Artifacts written to '{}'", store.dir().display());

        Ok(PrepareSummary {
            pairs:        corpus.len(),
            source_vocab: zh_vocab.len(),
            target_vocab: en_vocab.len(),
        })
    }
}

fn clean_pairs<S: TextCleaner, T: TextCleaner>(
    pairs:  &[SentencePair],
    source: &S,
    target: &T,
) -> Vec<SentencePair> {
    pairs
        .iter()
        .map(|p| SentencePair::new(source.clean(&p.source), target.clean(&p.target)))
        .collect()
}

fn token_set(vocab: &Vocabulary) -> HashSet<String> {
    vocab.content_tokens().map(str::to_string).collect()
}
