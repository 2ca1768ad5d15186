// ============================================================
// Layer 2 - TranslateUseCase
// ============================================================
// Loads everything a trained run needs to translate:
//
//   artifact dir → both vocabularies, max_len from prepare
//   run dir      → model_config.json + best/last checkpoint
//
// The vocabulary sizes are checked against the model config
// before the weights are read, so a run trained on a different
// artifact dir fails here instead of producing garbage ids.
//
// Reference: Rust Book §10 (Traits)

use anyhow::{bail, Result};
use burn::prelude::*;
use std::path::Path;

use crate::application::prepare_use_case::PrepareConfig;
use crate::data::cleaner::ChineseCleaner;
use crate::domain::traits::Translator;
use crate::infra::{
    artifacts::ArtifactStore,
    checkpoint::{CheckpointKind, CheckpointManager, CheckpointMeta},
};
use crate::ml::{translator::GreedyTranslator, InferBackend};

pub struct TranslateUseCase<B: Backend = InferBackend> {
    translator: GreedyTranslator<B, ChineseCleaner>,
    meta:       CheckpointMeta,
}

impl<B: Backend> TranslateUseCase<B> {
    pub fn open(
        artifact_dir: impl AsRef<Path>,
        run_dir:      impl AsRef<Path>,
        kind:         CheckpointKind,
        device:       B::Device,
    ) -> Result<Self> {
        let store = ArtifactStore::new(artifact_dir.as_ref());
        let (source_vocab, target_vocab) = store.load_vocabularies()?;
        let settings: PrepareConfig = store.load_settings()?;

        let checkpoints = CheckpointManager::new(run_dir.as_ref());
        let config      = checkpoints.load_model_config()?;
        if (config.source_vocab_size, config.target_vocab_size) != (source_vocab.len(), target_vocab.len()) {
            bail!(
                "Run '{}' was trained with vocab sizes zh={} en={}, artifacts in '{}' have zh={} en={}",
                checkpoints.dir().display(),
                config.source_vocab_size,
                config.target_vocab_size,
                store.dir().display(),
                source_vocab.len(),
                target_vocab.len()
            );
        }

        let (model, meta) = checkpoints.load::<B>(kind, &config, &device)?;
        let translator = GreedyTranslator::new(
            model,
            ChineseCleaner::new(),
            source_vocab,
            target_vocab,
            settings.max_len,
            device,
        );
        Ok(Self { translator, meta })
    }

    /// Metadata of the checkpoint in use
    pub fn checkpoint(&self) -> &CheckpointMeta {
        &self.meta
    }
}

impl<B: Backend> Translator for TranslateUseCase<B> {
    fn translate(&self, text: &str) -> Result<String> {
        Ok(self.translator.translate(text))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};
    use std::fs;
    use tempdir::TempDir;

    use crate::application::{
        prepare_use_case::PrepareUseCase,
        train_use_case::{EmbeddingMode, ExecutionMode, TrainConfig, TrainUseCase},
    };
    use crate::domain::vocabulary::Vocabulary;

    const CORPUS: &str = "\
i love you\t我爱你
you are good\t你很好
i am good\t我很好
good\t好
this row is broken
love you\t爱你
";

    // Both single characters and the words jieba may keep whole, so the
    // vocabulary is non-trivial whichever way the segmenter cuts.
    const ZH_VECTORS: &str = "\
8 3
我 0.1 0.2 0.3
你 0.3 0.2 0.1
爱 0.5 0.5 0.5
很 0.0 0.1 0.0
好 0.9 0.8 0.7
很好 0.4 0.4 0.1
爱你 0.2 0.6 0.2
我爱你 0.7 0.1 0.7
";

    const EN_VECTORS: &str = "\
i 0.1 0.1 0.1 0.1
love 0.2 0.2 0.2 0.2
you 0.3 0.3 0.3 0.3
are 0.4 0.4 0.4 0.4
am 0.5 0.5 0.5 0.5
good 0.6 0.6 0.6 0.6
";

    /// prepare → train (pretrained, frozen embeddings) on a six line corpus.
    fn prepared_and_trained(tmp: &TempDir) -> (String, std::path::PathBuf) {
        let corpus = tmp.path().join("corpus.tsv");
        let zh     = tmp.path().join("zh.txt");
        let en     = tmp.path().join("en.txt");
        fs::write(&corpus, CORPUS).unwrap();
        fs::write(&zh, ZH_VECTORS).unwrap();
        fs::write(&en, EN_VECTORS).unwrap();

        let artifact_dir = tmp.path().join("artifacts").display().to_string();
        let summary = PrepareUseCase::new(PrepareConfig {
            corpus:       corpus.display().to_string(),
            artifact_dir: artifact_dir.clone(),
            zh_vectors:   zh.display().to_string(),
            en_vectors:   en.display().to_string(),
            min_freq:     1,
            max_len:      8,
        })
        .execute()
        .unwrap();
        assert_eq!(summary.pairs, 5);

        let train = TrainConfig {
            artifact_dir:  artifact_dir.clone(),
            runs_dir:      tmp.path().join("runs").display().to_string(),
            batch_size:    2,
            epochs:        3,
            lr:            1e-2,
            hidden_size:   8,
            num_layers:    2,
            dropout:       0.0,
            seed:          3,
            mode:          ExecutionMode::Single,
            workers:       1,
            embeddings:    EmbeddingMode::Pretrained,
            ..TrainConfig::default()
        };
        let (run_dir, report) = TrainUseCase::new(train)
            .run::<Autodiff<NdArray>>(&[NdArrayDevice::Cpu])
            .unwrap();
        assert_eq!(report.epoch_losses.len(), 3);
        assert!(run_dir.ends_with("train0"));

        (artifact_dir, run_dir)
    }

    #[test]
    fn test_prepare_train_translate_end_to_end() {
        let tmp = TempDir::new("e2e").unwrap();
        let (artifact_dir, run_dir) = prepared_and_trained(&tmp);

        let use_case = TranslateUseCase::<NdArray>::open(
            &artifact_dir,
            &run_dir,
            CheckpointKind::Best,
            NdArrayDevice::Cpu,
        )
        .unwrap();
        assert_eq!(use_case.checkpoint().name, "best");

        let (_, en) = ArtifactStore::new(&artifact_dir).load_vocabularies().unwrap();
        assert!(en.contains("good"));
        for input in ["我爱你", "", "完全陌生的句子"] {
            let output = use_case.translate(input).unwrap();
            let words: Vec<&str> = output.split_whitespace().collect();
            assert!(words.len() <= 8, "'{input}' produced {} words", words.len());
            assert!(words.iter().all(|w| en.contains(w)), "unexpected output '{output}'");
            assert!(!words.contains(&"<eos>"));
        }
    }

    #[test]
    fn test_mismatched_artifacts_are_rejected() {
        let tmp = TempDir::new("e2e").unwrap();
        let (artifact_dir, run_dir) = prepared_and_trained(&tmp);

        // Shrink the target vocabulary behind the run's back
        let store = ArtifactStore::new(&artifact_dir);
        let (zh, en) = store.load_vocabularies().unwrap();
        let kept     = (0..en.len() as u32 - 1).map(|id| en.token(id).to_string()).collect();
        let smaller  = Vocabulary::from_tokens(kept).unwrap();
        store.save_vocabularies(&zh, &smaller).unwrap();

        let result = TranslateUseCase::<NdArray>::open(&artifact_dir, &run_dir, CheckpointKind::Last, NdArrayDevice::Cpu);
        assert!(result.is_err());
    }
}
