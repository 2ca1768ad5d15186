// ============================================================
// Layer 2 - TrainUseCase
// ============================================================
// Orchestrates one training run in order:
//
//   Step 1: Validate the config                       (this file)
//   Step 2: Load vocabularies + encoded corpus        (Layer 6 - infra)
//   Step 3: Build the Burn dataset                    (Layer 4 - data)
//   Step 4: Build the model, pretrained or learned    (Layer 5 - ml)
//           embeddings
//   Step 5: Allocate runs/trainN, save both configs   (Layer 6 - infra)
//   Step 6: Run the training loop                     (Layer 5 - ml)
//
// `prepare` must have been run on the artifact dir first.
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::{bail, Result};
use burn::{prelude::*, tensor::backend::AutodiffBackend};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::Arc};

use crate::data::dataset::TranslationDataset;
use crate::infra::{
    artifacts::ArtifactStore,
    checkpoint::CheckpointManager,
    metrics::MetricsLogger,
    run_dir::allocate_run_dir,
};
use crate::ml::{
    model::{Seq2SeqConfig, DEFAULT_EMBEDDING_DIM},
    train_devices,
    trainer::{run_training, RunOutputs, TrainingReport},
    TrainBackend,
};

// ─── Execution and embedding modes ───────────────────────────────────────────
/// How the training work is spread over devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// One device
    Single,
    /// One controller, each batch split across all devices
    DataParallel,
    /// One worker per device, each on its own shard, gradients reduced on rank 0
    Distributed,
}

/// Where the embedding tables come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingMode {
    /// Matrices written by `prepare`, frozen during training
    Pretrained,
    /// Randomly initialised and trained with the rest of the model
    Learned,
}

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run.
// Saved as train_config.json in the run dir so a run can always be
// traced back to the settings that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub artifact_dir:  String,
    pub runs_dir:      String,
    /// Rows per optimizer step (data-parallel: whole batch before the
    /// split; distributed: rows per worker)
    pub batch_size:    usize,
    pub epochs:        usize,
    pub lr:            f64,
    pub hidden_size:   usize,
    pub num_layers:    usize,
    pub dropout:       f64,
    /// Only used with learned embeddings; pretrained ones bring their own
    pub embedding_dim: usize,
    pub seed:          u64,
    pub mode:          ExecutionMode,
    pub workers:       usize,
    pub embeddings:    EmbeddingMode,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            artifact_dir:  "artifacts".to_string(),
            runs_dir:      "runs".to_string(),
            batch_size:    100,
            epochs:        150,
            lr:            1e-3,
            hidden_size:   256,
            num_layers:    3,
            dropout:       0.3,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            seed:          42,
            mode:          ExecutionMode::Single,
            workers:       1,
            embeddings:    EmbeddingMode::Pretrained,
        }
    }
}

impl TrainConfig {
    /// Reject settings the training loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.epochs == 0 {
            bail!("epochs must be at least 1");
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            bail!("lr must be a positive number, got {}", self.lr);
        }
        if self.hidden_size == 0 || self.embedding_dim == 0 {
            bail!("hidden_size and embedding_dim must be at least 1");
        }
        if self.num_layers == 0 {
            bail!("num_layers must be at least 1");
        }
        if !(0.0..1.0).contains(&self.dropout) {
            bail!("dropout must be in [0, 1), got {}", self.dropout);
        }
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.mode == ExecutionMode::Single && self.workers != 1 {
            bail!("mode 'single' runs on exactly one worker, got {}", self.workers);
        }
        Ok(())
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Train on the wgpu backend, one device per worker.
    pub fn execute(&self) -> Result<(PathBuf, TrainingReport)> {
        let devices = train_devices(self.config.workers);
        self.run::<TrainBackend>(&devices)
    }

    /// Run the whole pipeline on backend `B`. Returns the run directory
    /// and the per-epoch report.
    pub fn run<B: AutodiffBackend>(&self, devices: &[B::Device]) -> Result<(PathBuf, TrainingReport)> {
        let cfg = &self.config;

        // ── Step 1: Validate ──────────────────────────────────────────────────
        cfg.validate()?;
        let Some(device) = devices.first() else {
            bail!("No training device available");
        };

        // ── Step 2: Load prepared artifacts ───────────────────────────────────
        let store = ArtifactStore::new(&cfg.artifact_dir);
        let (source_vocab, target_vocab) = store.load_vocabularies()?;
        let corpus = store.load_corpus()?;
        tracing::info!(
            "Loaded {} encoded pairs, vocab zh={} en={}",
            corpus.len(),
            source_vocab.len(),
            target_vocab.len()
        );

        // ── Step 3: Burn dataset ──────────────────────────────────────────────
        let dataset = Arc::new(TranslationDataset::try_from(corpus)?);

        // ── Step 4: Model ─────────────────────────────────────────────────────
        // Seed before any parameter is created so runs are reproducible
        B::seed(cfg.seed);
        let (model_config, model) = match cfg.embeddings {
            EmbeddingMode::Pretrained => {
                let (source, target) = store.load_embeddings::<B>(&source_vocab, &target_vocab, device)?;
                let [_, source_dim] = source.dims();
                let [_, target_dim] = target.dims();
                let model_config = self.model_config(source_vocab.len(), target_vocab.len(), source_dim, target_dim);
                let model = model_config
                    .init::<B>(device)
                    .with_embeddings(source, target)?
                    .freeze_embeddings();
                (model_config, model)
            }
            EmbeddingMode::Learned => {
                let model_config = self.model_config(
                    source_vocab.len(),
                    target_vocab.len(),
                    cfg.embedding_dim,
                    cfg.embedding_dim,
                );
                let model = model_config.init::<B>(device);
                (model_config, model)
            }
        };

        // ── Step 5: Run directory ─────────────────────────────────────────────
        let run_dir = allocate_run_dir(&cfg.runs_dir, "train")?;
        let outputs = RunOutputs {
            checkpoints: CheckpointManager::new(&run_dir),
            metrics:     MetricsLogger::new(&run_dir)?,
        };
        outputs.checkpoints.save_configs(cfg, &model_config)?;

        // ── Step 6: Train ─────────────────────────────────────────────────────
        let report = run_training(cfg, model, dataset, devices, &outputs)?;
        Ok((run_dir, report))
    }

    fn model_config(&self, source_vocab: usize, target_vocab: usize, source_dim: usize, target_dim: usize) -> Seq2SeqConfig {
        Seq2SeqConfig::new(
            source_vocab,
            target_vocab,
            source_dim,
            target_dim,
            self.config.hidden_size,
            self.config.num_layers,
        )
        .with_dropout(self.config.dropout)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TrainConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_configs_are_rejected() {
        let cases: Vec<fn(&mut TrainConfig)> = vec![
            |c| c.batch_size = 0,
            |c| c.epochs = 0,
            |c| c.lr = 0.0,
            |c| c.lr = f64::NAN,
            |c| c.num_layers = 0,
            |c| c.dropout = 1.0,
            |c| c.dropout = -0.1,
            |c| c.workers = 0,
            |c| c.workers = 2,
        ];
        for mutate in cases {
            let mut cfg = TrainConfig::default();
            mutate(&mut cfg);
            assert!(cfg.validate().is_err(), "{cfg:?} should be rejected");
        }
    }

    #[test]
    fn test_multi_worker_modes_accept_several_workers() {
        let cfg = TrainConfig { mode: ExecutionMode::Distributed, workers: 4, ..TrainConfig::default() };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_modes_serialise_as_kebab_case() {
        let json = serde_json::to_string(&ExecutionMode::DataParallel).unwrap();
        assert_eq!(json, "\"data-parallel\"");
        let mode: EmbeddingMode = serde_json::from_str("\"learned\"").unwrap();
        assert_eq!(mode, EmbeddingMode::Learned);
    }
}
