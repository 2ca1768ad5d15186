// ============================================================
// Layer 5 - Training Loop
// ============================================================
// Teacher-forced training with Adam, for all three execution
// modes. This file holds the single-device loop and the pieces
// every mode shares; the multi-device loops live in parallel.rs.
//
// Batches:
//   single and data-parallel modes pull shuffled batches from a Burn
//   DataLoader seeded with cfg.seed; distributed workers each walk
//   their own ShardSampler shard.
//
// Per batch:
//   forward  → masked cross entropy (positions 1.., <pad> ignored)
//   backward → gradients split into the two parameter groups
//   step     → one Adam step per group that is trainable
//
// Parameter groups:
//   network     encoder/decoder GRUs, layer norms, projection.
//               Always trained.
//   embeddings  source/target tables. Trained only when they are
//               learned from scratch; pretrained tables are frozen
//               and get neither gradients nor an optimizer.
//
// Per epoch:
//   mean of the batch losses; a "best" checkpoint whenever that
//   mean is strictly lower than every earlier one, a "last"
//   checkpoint after the final epoch. Only the writer worker
//   touches the run directory or prints progress.
//
// Key Burn insight:
//   GradientsParams::from_module pulls the gradients of one
//   submodule out of the backward pass. Calling it once per group
//   gives each optimizer exactly the gradients of its own params.
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::{bail, Result};
use burn::{
    data::{dataloader::DataLoaderBuilder, dataset::Dataset},
    optim::{AdamConfig, GradientsAccumulator, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::application::train_use_case::{EmbeddingMode, ExecutionMode, TrainConfig};
use crate::data::{
    batcher::{TranslationBatch, TranslationBatcher},
    dataset::TranslationDataset,
};
use crate::infra::{
    checkpoint::{CheckpointKind, CheckpointManager},
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::model::{EmbeddingTables, Seq2SeqModel, Seq2SeqNetwork};
use crate::ml::parallel::{train_data_parallel, train_distributed};

// ─── Worker identity ──────────────────────────────────────────────────────────
/// Who this worker is. `is_writer` is decided once here and passed down;
/// nothing below re-derives it from the rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerRole {
    pub rank:       usize,
    pub world_size: usize,
    pub is_writer:  bool,
}

impl WorkerRole {
    pub fn new(rank: usize, world_size: usize) -> Self {
        Self { rank, world_size, is_writer: rank == 0 }
    }

    pub fn single() -> Self {
        Self::new(0, 1)
    }
}

// ─── Best loss ────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, Default)]
pub struct BestLossTracker {
    best: Option<f64>,
}

impl BestLossTracker {
    /// True when `loss` is strictly lower than everything recorded so far.
    /// NaN never counts as an improvement.
    pub fn record(&mut self, loss: f64) -> bool {
        if loss.is_nan() {
            return false;
        }
        match self.best {
            Some(best) if loss >= best => false,
            _ => {
                self.best = Some(loss);
                true
            }
        }
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }
}

// ─── Gradients per parameter group ────────────────────────────────────────────
pub struct GroupGradients {
    pub network:    GradientsParams,
    pub embeddings: Option<GradientsParams>,
}

impl GroupGradients {
    /// Backward pass of `loss`, split into the two groups.
    pub fn from_loss<B: AutodiffBackend>(
        loss:             Tensor<B, 1>,
        model:            &Seq2SeqModel<B>,
        train_embeddings: bool,
    ) -> Self {
        let mut grads  = loss.backward();
        let network    = GradientsParams::from_module(&mut grads, &model.network);
        let embeddings = train_embeddings
            .then(|| GradientsParams::from_module(&mut grads, &model.embeddings));
        Self { network, embeddings }
    }

    /// Move every gradient onto the device that holds `model`.
    pub fn to_device<B: AutodiffBackend>(self, device: &B::Device, model: &Seq2SeqModel<B>) -> Self {
        Self {
            network:    self.network.to_device(device, &model.network),
            embeddings: self.embeddings.map(|g| g.to_device(device, &model.embeddings)),
        }
    }
}

/// Sums gradients from several replicas, group by group.
pub struct GroupAccumulator<B: AutodiffBackend> {
    network:    GradientsAccumulator<Seq2SeqNetwork<B>>,
    embeddings: Option<GradientsAccumulator<EmbeddingTables<B>>>,
}

impl<B: AutodiffBackend> GroupAccumulator<B> {
    pub fn new(train_embeddings: bool) -> Self {
        Self {
            network:    GradientsAccumulator::new(),
            embeddings: train_embeddings.then(GradientsAccumulator::new),
        }
    }

    /// `grads` must already live on the device of `model`.
    pub fn accumulate(&mut self, model: &Seq2SeqModel<B>, grads: GroupGradients) {
        self.network.accumulate(&model.network, grads.network);
        if let (Some(acc), Some(g)) = (self.embeddings.as_mut(), grads.embeddings) {
            acc.accumulate(&model.embeddings, g);
        }
    }

    pub fn take(&mut self) -> GroupGradients {
        GroupGradients {
            network:    self.network.grads(),
            embeddings: self.embeddings.as_mut().map(|acc| acc.grads()),
        }
    }
}

// ─── Optimizers per parameter group ───────────────────────────────────────────
pub struct GroupOptimizers<ON, OE> {
    network:    ON,
    embeddings: Option<OE>,
}

/// Adam for the network and, when the tables are learned, a second Adam
/// for the embeddings.
///
/// m = β1*m + (1-β1)*g        (mean)
/// v = β2*v + (1-β2)*g²       (variance)
/// θ = θ - lr * m / (√v + ε)  (update)
pub fn group_optimizers<B: AutodiffBackend>(
    train_embeddings: bool,
) -> GroupOptimizers<impl Optimizer<Seq2SeqNetwork<B>, B>, impl Optimizer<EmbeddingTables<B>, B>> {
    let adam = AdamConfig::new().with_epsilon(1e-8);
    GroupOptimizers {
        network:    adam.init::<B, Seq2SeqNetwork<B>>(),
        embeddings: train_embeddings.then(|| adam.init::<B, EmbeddingTables<B>>()),
    }
}

impl<ON, OE> GroupOptimizers<ON, OE> {
    pub fn step<B>(&mut self, lr: f64, model: Seq2SeqModel<B>, grads: GroupGradients) -> Seq2SeqModel<B>
    where
        B:  AutodiffBackend,
        ON: Optimizer<Seq2SeqNetwork<B>, B>,
        OE: Optimizer<EmbeddingTables<B>, B>,
    {
        let Seq2SeqModel { embeddings, network } = model;
        let network = self.network.step(lr, network, grads.network);
        let embeddings = match (self.embeddings.as_mut(), grads.embeddings) {
            (Some(optim), Some(g)) => optim.step(lr, embeddings, g),
            _ => embeddings,
        };
        Seq2SeqModel { embeddings, network }
    }
}

/// Loss value and group gradients of one batch.
pub fn compute_gradients<B: AutodiffBackend>(
    model:            &Seq2SeqModel<B>,
    batch:            TranslationBatch<B>,
    normalizer:       f64,
    train_embeddings: bool,
) -> (f64, GroupGradients) {
    let loss = model.forward_loss(
        batch.encoder_input,
        batch.decoder_input,
        batch.decoder_target,
        normalizer,
    );
    let value = loss.clone().into_scalar().elem::<f64>();
    (value, GroupGradients::from_loss(loss, model, train_embeddings))
}

// ─── Epoch reporting ──────────────────────────────────────────────────────────
/// Where the writer puts checkpoints and metrics.
pub struct RunOutputs {
    pub checkpoints: CheckpointManager,
    pub metrics:     MetricsLogger,
}

#[derive(Debug, Clone, Default)]
pub struct TrainingReport {
    pub epoch_losses: Vec<f64>,
    pub best_epoch:   Option<usize>,
    pub best_loss:    Option<f64>,
}

/// Per-worker epoch bookkeeping. Every side effect is gated on
/// `role.is_writer`.
pub struct EpochReporter<'a> {
    role:         WorkerRole,
    outputs:      &'a RunOutputs,
    total_epochs: usize,
    tracker:      BestLossTracker,
    report:       TrainingReport,
}

impl<'a> EpochReporter<'a> {
    pub fn new(role: WorkerRole, outputs: &'a RunOutputs, total_epochs: usize) -> Self {
        Self {
            role,
            outputs,
            total_epochs,
            tracker: BestLossTracker::default(),
            report:  TrainingReport::default(),
        }
    }

    pub fn end_epoch<B: Backend>(
        &mut self,
        model:    &Seq2SeqModel<B>,
        epoch:    usize,
        avg_loss: f64,
        elapsed:  Duration,
    ) -> Result<()> {
        self.report.epoch_losses.push(avg_loss);
        if !self.role.is_writer {
            return Ok(());
        }

        let is_best = self.tracker.record(avg_loss);
        if is_best {
            self.outputs.checkpoints.save(CheckpointKind::Best, model, epoch, avg_loss)?;
            self.report.best_epoch = Some(epoch);
        }
        self.report.best_loss = self.tracker.best();

        let seconds = elapsed.as_secs_f64();
        self.outputs.metrics.log(&EpochMetrics::new(epoch, avg_loss, seconds, is_best))?;

        println!(
            "Epoch {:>3}/{} | avg_loss={:.4} | time={:.2}s{}",
            epoch,
            self.total_epochs,
            avg_loss,
            seconds,
            if is_best { " | best" } else { "" },
        );
        Ok(())
    }

    /// Write the "last" checkpoint and hand back the report.
    pub fn finish<B: Backend>(self, model: &Seq2SeqModel<B>) -> Result<TrainingReport> {
        if self.role.is_writer {
            let last_loss = self.report.epoch_losses.last().copied().unwrap_or(f64::NAN);
            let epochs    = self.report.epoch_losses.len();
            self.outputs.checkpoints.save(CheckpointKind::Last, model, epochs, last_loss)?;
            tracing::info!("Saved last checkpoint to '{}'", self.outputs.checkpoints.dir().display());
            tracing::info!("Epoch metrics in '{}'", self.outputs.metrics.csv_path().display());
        }
        Ok(self.report)
    }
}

pub(crate) fn mean(sum: f64, count: usize) -> f64 {
    if count > 0 { sum / count as f64 } else { f64::NAN }
}

// ─── Entry point ──────────────────────────────────────────────────────────────
/// Train `model` on `dataset` with the mode chosen in `cfg`. The model
/// must already live on `devices[0]`.
pub fn run_training<B: AutodiffBackend>(
    cfg:     &TrainConfig,
    model:   Seq2SeqModel<B>,
    dataset: Arc<TranslationDataset>,
    devices: &[B::Device],
    outputs: &RunOutputs,
) -> Result<TrainingReport> {
    if devices.is_empty() {
        bail!("No training device available");
    }
    if dataset.is_empty() {
        bail!("The encoded corpus is empty, nothing to train on");
    }

    tracing::info!(
        "Training {} params on {} device(s), mode {:?}",
        model.num_params(),
        devices.len(),
        cfg.mode
    );

    let report = match cfg.mode {
        ExecutionMode::Single       => train_single(cfg, model, dataset, &devices[0], outputs)?,
        ExecutionMode::DataParallel => train_data_parallel(cfg, model, dataset, devices, outputs)?,
        ExecutionMode::Distributed  => train_distributed(cfg, model, &dataset, devices, outputs)?,
    };

    tracing::info!("Training complete!");
    Ok(report)
}

fn train_single<B: AutodiffBackend>(
    cfg:     &TrainConfig,
    model:   Seq2SeqModel<B>,
    dataset: Arc<TranslationDataset>,
    device:  &B::Device,
    outputs: &RunOutputs,
) -> Result<TrainingReport> {
    let role             = WorkerRole::single();
    let train_embeddings = cfg.embeddings == EmbeddingMode::Learned;
    let mut optim        = group_optimizers::<B>(train_embeddings);
    let mut reporter     = EpochReporter::new(role, outputs, cfg.epochs);
    let mut model        = model;

    // ── Step 1: DataLoader ────────────────────────────────────────────────────
    // Reshuffled on every iter() call, reproducibly from the seed
    let loader = DataLoaderBuilder::new(TranslationBatcher::<B>::new(device.clone()))
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .num_workers(1)
        .build(dataset);

    // ── Step 2: Epoch loop ────────────────────────────────────────────────────
    for epoch in 1..=cfg.epochs {
        let start        = Instant::now();
        let mut loss_sum = 0.0f64;
        let mut batches  = 0usize;

        for batch in loader.iter() {
            let normalizer = batch.scored_targets.max(1) as f64;

            let (loss, grads) = compute_gradients(&model, batch, normalizer, train_embeddings);
            model = optim.step(cfg.lr, model, grads);

            tracing::trace!("epoch {} batch {} loss {:.4}", epoch, batches, loss);
            loss_sum += loss;
            batches  += 1;
        }

        reporter.end_epoch(&model, epoch, mean(loss_sum, batches), start.elapsed())?;
    }

    reporter.finish(&model)
}
