// ============================================================
// Layer 6 - Checkpoint Manager
// ============================================================
// Saves and restores model weights for one training run using
// Burn's NamedMpkGzFileRecorder at full precision.
//
// A run keeps exactly two checkpoints, each overwritten in place:
//   best  → lowest epoch-average loss seen so far
//   last  → weights after the final epoch
//
// File layout of a run directory:
//   runs/train0/
//     train_config.json   ← hyperparameters of the run (serde)
//     model_config.json   ← Seq2SeqConfig (Burn Config)
//     best.mpk.gz         ← weights
//     best.json           ← {name, version, epoch, loss}
//     last.mpk.gz
//     last.json
//     metrics.csv         ← written by the metrics logger
//
// Why save the model config separately?
//   Translation needs the exact architecture (vocab sizes,
//   embedding dims, hidden size, layer count) to rebuild the
//   model before loading the weights into it.
//
// Loading is strict. Burn's load_record takes whatever tensors
// the record holds, so after loading the parameter count, the
// layer count and the embedding / projection shapes are compared
// with a freshly built model. Any difference is an error and the
// loaded model is dropped.
//
// Reference: Burn Book §5 (Records and Checkpointing)
//            Rust Book §9 (Error Handling)

use anyhow::{anyhow, bail, Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::application::train_use_case::TrainConfig;
use crate::infra::artifacts::{read_json, write_json};
use crate::ml::model::{Seq2SeqConfig, Seq2SeqModel};

/// Bumped whenever the parameter layout of Seq2SeqModel changes.
pub const CHECKPOINT_VERSION: u32 = 1;

const TRAIN_CONFIG: &str = "train_config.json";
const MODEL_CONFIG: &str = "model_config.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointKind {
    Best,
    Last,
}

impl CheckpointKind {
    pub fn name(self) -> &'static str {
        match self {
            CheckpointKind::Best => "best",
            CheckpointKind::Last => "last",
        }
    }
}

/// Sidecar written next to every checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub name:    String,
    pub version: u32,
    pub epoch:   usize,
    pub loss:    f64,
}

/// Manages the checkpoints and configs of one run directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // ─── Configs ──────────────────────────────────────────────────────────────
    /// Save both configs. Called once before the first epoch.
    pub fn save_configs(&self, train: &TrainConfig, model: &Seq2SeqConfig) -> Result<()> {
        write_json(&self.dir.join(TRAIN_CONFIG), train)?;
        let path = self.dir.join(MODEL_CONFIG);
        model
            .save(&path)
            .with_context(|| format!("Cannot write model config '{}'", path.display()))?;
        Ok(())
    }

    pub fn load_model_config(&self) -> Result<Seq2SeqConfig> {
        let path = self.dir.join(MODEL_CONFIG);
        Seq2SeqConfig::load(&path).map_err(|e| {
            anyhow!(
                "Cannot read model config '{}'. Make sure you have run 'train' first. ({:?})",
                path.display(),
                e
            )
        })
    }

    // ─── Weights ──────────────────────────────────────────────────────────────
    /// Write `<kind>.mpk.gz` and `<kind>.json`, replacing earlier ones.
    pub fn save<B: Backend>(
        &self,
        kind:  CheckpointKind,
        model: &Seq2SeqModel<B>,
        epoch: usize,
        loss:  f64,
    ) -> Result<()> {
        let path = self.dir.join(kind.name());
        NamedMpkGzFileRecorder::<FullPrecisionSettings>::new()
            .record(model.clone().into_record(), path.clone())
            .map_err(|e| anyhow!("Failed to save checkpoint to '{}': {:?}", path.display(), e))?;

        let meta = CheckpointMeta {
            name:    kind.name().to_string(),
            version: CHECKPOINT_VERSION,
            epoch,
            loss,
        };
        write_json(&self.dir.join(format!("{}.json", kind.name())), &meta)?;

        tracing::debug!("Saved {} checkpoint: epoch {}, loss {:.4}", kind.name(), epoch, loss);
        Ok(())
    }

    pub fn load_meta(&self, kind: CheckpointKind) -> Result<CheckpointMeta> {
        let meta: CheckpointMeta = read_json(&self.dir.join(format!("{}.json", kind.name())))?;
        if meta.version != CHECKPOINT_VERSION {
            bail!(
                "Checkpoint '{}' has version {}, this build reads version {}",
                kind.name(),
                meta.version,
                CHECKPOINT_VERSION
            );
        }
        Ok(meta)
    }

    /// Rebuild the model described by `config` and load the `kind`
    /// checkpoint into it.
    pub fn load<B: Backend>(
        &self,
        kind:   CheckpointKind,
        config: &Seq2SeqConfig,
        device: &B::Device,
    ) -> Result<(Seq2SeqModel<B>, CheckpointMeta)> {
        let meta = self.load_meta(kind)?;
        let path = self.dir.join(kind.name());

        let record: <Seq2SeqModel<B> as Module<B>>::Record = NamedMpkGzFileRecorder::<FullPrecisionSettings>::new()
            .load(path.clone(), device)
            .map_err(|e| {
                anyhow!(
                    "Cannot load checkpoint '{}'. Have you trained the model first? ({:?})",
                    path.display(),
                    e
                )
            })?;

        let layers = (record.network.encoder.layers.len(), record.network.decoder.layers.len());
        if layers != (config.num_layers, config.num_layers) {
            bail!(
                "Checkpoint '{}' has {}/{} GRU layers, config expects {}",
                kind.name(),
                layers.0,
                layers.1,
                config.num_layers
            );
        }

        let fresh    = config.init::<B>(device);
        let expected = fresh.num_params();
        let model    = fresh.load_record(record);
        check_architecture(&model, config, expected)
            .with_context(|| format!("Checkpoint '{}' does not match the model config", kind.name()))?;

        tracing::info!("Loaded {} checkpoint from epoch {} (loss {:.4})", meta.name, meta.epoch, meta.loss);
        Ok((model, meta))
    }
}

fn check_architecture<B: Backend>(
    model:    &Seq2SeqModel<B>,
    config:   &Seq2SeqConfig,
    expected: usize,
) -> Result<()> {
    let shapes = [
        ("source embedding", model.embeddings.source.weight.dims(), [config.source_vocab_size, config.source_embedding_dim]),
        ("target embedding", model.embeddings.target.weight.dims(), [config.target_vocab_size, config.target_embedding_dim]),
        ("projection",       model.network.projection.weight.dims(), [config.hidden_size, config.target_vocab_size]),
    ];
    for (what, actual, wanted) in shapes {
        if actual != wanted {
            bail!("{what} is {actual:?}, expected {wanted:?}");
        }
    }

    let found = model.num_params();
    if found != expected {
        bail!("{found} parameters loaded, expected {expected}");
    }
    Ok(())
}
