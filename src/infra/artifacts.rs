// ============================================================
// Layer 6 - Artifact Store
// ============================================================
// Everything `prepare` produces and `train` / `translate` consume,
// kept together in one directory:
//
//   <artifact_dir>/
//     zh_vocab.json          ← source vocabulary (tokens in id order)
//     en_vocab.json          ← target vocabulary
//     encoded_data.json      ← encoder_input / decoder_input / decoder_target
//     prepare_config.json    ← settings the corpus was encoded with
//     zh_emb.mpk.gz          ← source embedding matrix [zh_vocab, dim]
//     en_emb.mpk.gz          ← target embedding matrix [en_vocab, dim]
//
// The same vocabularies must be used for training and for
// inference, otherwise ids silently mean different words. Every
// later step therefore loads them from here instead of rebuilding.
//
// Matrices go through Burn's NamedMpkGzFileRecorder at full
// precision so they can be written on one backend (ndarray in
// prepare) and read on another (wgpu in train).
//
// Reference: Burn Book §5 (Records)
//            serde_json crate documentation

use anyhow::{bail, Context, Result};
use burn::{
    module::Param,
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::data::dataset::EncodedCorpus;
use crate::domain::vocabulary::Vocabulary;

const SOURCE_VOCAB:    &str = "zh_vocab.json";
const TARGET_VOCAB:    &str = "en_vocab.json";
const ENCODED_CORPUS:  &str = "encoded_data.json";
const PREPARE_CONFIG:  &str = "prepare_config.json";
const SOURCE_EMBEDDING: &str = "zh_emb";
const TARGET_EMBEDDING: &str = "en_emb";

pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory for a fresh `prepare` run.
    pub fn create(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create artifact dir '{}'", self.dir.display()))
    }

    // ─── Vocabularies ─────────────────────────────────────────────────────────
    pub fn save_vocabularies(&self, source: &Vocabulary, target: &Vocabulary) -> Result<()> {
        write_json(&self.dir.join(SOURCE_VOCAB), source)?;
        write_json(&self.dir.join(TARGET_VOCAB), target)
    }

    /// (source, target). Reserved ids are validated on load.
    pub fn load_vocabularies(&self) -> Result<(Vocabulary, Vocabulary)> {
        let source = read_json(&self.dir.join(SOURCE_VOCAB))?;
        let target = read_json(&self.dir.join(TARGET_VOCAB))?;
        Ok((source, target))
    }

    // ─── Encoded corpus ───────────────────────────────────────────────────────
    pub fn save_corpus(&self, corpus: &EncodedCorpus) -> Result<()> {
        write_json(&self.dir.join(ENCODED_CORPUS), corpus)
    }

    pub fn load_corpus(&self) -> Result<EncodedCorpus> {
        let corpus: EncodedCorpus = read_json(&self.dir.join(ENCODED_CORPUS))?;
        corpus.validate()?;
        Ok(corpus)
    }

    // ─── Prepare settings ─────────────────────────────────────────────────────
    pub fn save_settings<T: Serialize>(&self, settings: &T) -> Result<()> {
        write_json(&self.dir.join(PREPARE_CONFIG), settings)
    }

    pub fn load_settings<T: DeserializeOwned>(&self) -> Result<T> {
        read_json(&self.dir.join(PREPARE_CONFIG))
    }

    // ─── Embedding matrices ───────────────────────────────────────────────────
    pub fn save_embeddings<B: Backend>(&self, source: Tensor<B, 2>, target: Tensor<B, 2>) -> Result<()> {
        save_matrix(&self.dir.join(SOURCE_EMBEDDING), source)?;
        save_matrix(&self.dir.join(TARGET_EMBEDDING), target)
    }

    /// Load both matrices and check their row counts against the
    /// vocabularies they belong to.
    pub fn load_embeddings<B: Backend>(
        &self,
        source_vocab: &Vocabulary,
        target_vocab: &Vocabulary,
        device:       &B::Device,
    ) -> Result<(Tensor<B, 2>, Tensor<B, 2>)> {
        let source = load_matrix::<B>(&self.dir.join(SOURCE_EMBEDDING), device)?;
        let target = load_matrix::<B>(&self.dir.join(TARGET_EMBEDDING), device)?;

        for (side, matrix, vocab) in [("source", &source, source_vocab), ("target", &target, target_vocab)] {
            let [rows, _] = matrix.dims();
            if rows != vocab.len() {
                bail!(
                    "{side} embedding matrix has {rows} rows but the vocabulary has {} tokens",
                    vocab.len()
                );
            }
        }
        Ok((source, target))
    }
}

fn recorder() -> NamedMpkGzFileRecorder<FullPrecisionSettings> {
    NamedMpkGzFileRecorder::<FullPrecisionSettings>::new()
}

fn save_matrix<B: Backend>(path: &Path, matrix: Tensor<B, 2>) -> Result<()> {
    recorder()
        .record(Param::from_tensor(matrix), path.to_path_buf())
        .map_err(|e| anyhow::anyhow!("Cannot save embedding matrix '{}': {:?}", path.display(), e))?;
    tracing::debug!("Saved embedding matrix '{}'", path.display());
    Ok(())
}

fn load_matrix<B: Backend>(path: &Path, device: &B::Device) -> Result<Tensor<B, 2>> {
    let param: Param<Tensor<B, 2>> = recorder()
        .load(path.to_path_buf(), device)
        .map_err(|e| {
            anyhow::anyhow!(
                "Cannot load embedding matrix '{}'. Have you run 'prepare'? ({:?})",
                path.display(),
                e
            )
        })?;
    Ok(param.val())
}

pub(crate) fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Cannot write '{}'", path.display()))?;
    tracing::debug!("Wrote '{}'", path.display());
    Ok(())
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Cannot parse '{}'", path.display()))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;
    use tempdir::TempDir;

    use crate::domain::sentence_pair::SentencePair;

    type TestBackend = NdArray;

    fn vocab(extra: &[&str]) -> Vocabulary {
        let mut tokens: Vec<String> = ["<pad>", "<unk>", "<sos>", "<eos>"]
            .iter()
            .map(|t| t.to_string())
            .collect();
        tokens.extend(extra.iter().map(|t| t.to_string()));
        Vocabulary::from_tokens(tokens).unwrap()
    }

    #[test]
    fn test_vocabularies_and_corpus_round_trip() {
        let tmp   = TempDir::new("artifacts").unwrap();
        let store = ArtifactStore::new(tmp.path());
        let zh = vocab(&["你好"]);
        let en = vocab(&["hello"]);
        let corpus = EncodedCorpus::encode(&[SentencePair::new("你好", "hello")], &zh, &en, 5);

        store.save_vocabularies(&zh, &en).unwrap();
        store.save_corpus(&corpus).unwrap();

        let (zh2, en2) = store.load_vocabularies().unwrap();
        assert_eq!(zh2, zh);
        assert_eq!(en2.id("hello"), 4);
        assert_eq!(store.load_corpus().unwrap(), corpus);
    }

    #[test]
    fn test_embeddings_round_trip() {
        let tmp    = TempDir::new("artifacts").unwrap();
        let store  = ArtifactStore::new(tmp.path());
        let device = Default::default();

        let values: Vec<f32> = (0..10).map(|v| v as f32).collect();
        let source = Tensor::<TestBackend, 2>::from_data(TensorData::new(values, [5, 2]), &device);
        let target = Tensor::<TestBackend, 2>::zeros([6, 3], &device);
        store.save_embeddings(source.clone(), target).unwrap();

        let (loaded, target) = store
            .load_embeddings::<TestBackend>(&vocab(&["a"]), &vocab(&["x", "y"]), &device)
            .unwrap();
        assert_eq!(target.dims(), [6, 3]);
        loaded.into_data().assert_approx_eq(&source.into_data(), 6);
    }

    #[test]
    fn test_embedding_rows_must_match_vocabulary() {
        let tmp    = TempDir::new("artifacts").unwrap();
        let store  = ArtifactStore::new(tmp.path());
        let device = Default::default();

        let source = Tensor::<TestBackend, 2>::zeros([5, 2], &device);
        let target = Tensor::<TestBackend, 2>::zeros([5, 2], &device);
        store.save_embeddings(source, target).unwrap();

        let result = store.load_embeddings::<TestBackend>(&vocab(&["a"]), &vocab(&[]), &device);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_artifacts_are_errors() {
        let tmp   = TempDir::new("artifacts").unwrap();
        let store = ArtifactStore::new(tmp.path().join("empty"));
        assert!(store.load_vocabularies().is_err());
        assert!(store.load_corpus().is_err());
    }
}
