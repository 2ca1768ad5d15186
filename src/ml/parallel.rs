// ============================================================
// Layer 5 - Multi-Device Training
// ============================================================
// Two ways to spread training over several devices.
//
// Data parallel (one controller):
//   batches come from the same seeded DataLoader order as single
//   mode; each batch is cut row-wise into one shard per device.
//   Replicas forked from the current model compute their shard's
//   gradients on scoped threads; the controller moves the
//   gradients to the main device, sums them and takes one
//   optimizer step. Every shard divides its summed token loss by
//   the token count of the WHOLE batch, so the sum of the shard
//   losses (and gradients) equals the full-batch value.
//
// Distributed (one worker per device):
//   every worker holds a full replica and walks its own shard of
//   the dataset (see ShardSampler). After each batch:
//
//     rank r > 0                     rank 0
//     ─────────                      ──────
//     grads ──── WorkerMessage ────▶ wait for every rank
//                                    sum grads, Adam step
//     wait ◀──── LeaderMessage ───── updated replica per rank
//
//   This is a blocking collective: nobody starts the next batch
//   until everyone has reported. Each worker scales its loss by
//   1 / world_size, so the reduced gradient is the mean over
//   workers. A worker that fails or disappears aborts the
//   whole run; there is no retry and no timeout.
//
// Only rank 0 (the writer) touches the run directory.
//
// Reference: Burn Book §5 (Multi-device training)
//            Rust Book §16 (Fearless Concurrency)

use anyhow::{anyhow, bail, Result};
use burn::{
    data::{
        dataloader::{batcher::Batcher, DataLoaderBuilder},
        dataset::Dataset,
    },
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc,
    },
    thread,
    time::Instant,
};

use crate::application::train_use_case::{EmbeddingMode, TrainConfig};
use crate::data::{
    batcher::{ItemBatcher, TranslationBatcher},
    dataset::{TranslationDataset, TranslationItem},
    sampler::ShardSampler,
};
use crate::ml::model::Seq2SeqModel;
use crate::ml::trainer::{
    compute_gradients, group_optimizers, mean, EpochReporter, GroupAccumulator, GroupGradients,
    RunOutputs, TrainingReport, WorkerRole,
};

// ─── Data parallel ────────────────────────────────────────────────────────────
pub fn train_data_parallel<B: AutodiffBackend>(
    cfg:     &TrainConfig,
    model:   Seq2SeqModel<B>,
    dataset: Arc<TranslationDataset>,
    devices: &[B::Device],
    outputs: &RunOutputs,
) -> Result<TrainingReport> {
    let main             = &devices[0];
    let train_embeddings = cfg.embeddings == EmbeddingMode::Learned;
    let batchers: Vec<TranslationBatcher<B>> =
        devices.iter().cloned().map(TranslationBatcher::new).collect();
    let mut optim    = group_optimizers::<B>(train_embeddings);
    let mut reporter = EpochReporter::new(WorkerRole::single(), outputs, cfg.epochs);
    let mut model    = model;

    // Items stay on the host until they are split across devices
    let loader = DataLoaderBuilder::new(ItemBatcher)
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .num_workers(1)
        .build(dataset);

    for epoch in 1..=cfg.epochs {
        let start        = Instant::now();
        let mut loss_sum = 0.0f64;
        let mut batches  = 0usize;

        for items in loader.iter() {
            let normalizer = items.iter().map(TranslationItem::scored_targets).sum::<usize>().max(1) as f64;
            let shards     = split_rows(items, devices.len());

            // ── Replica forward/backward, one thread per non-empty shard ────
            let results: Vec<Result<(f64, GroupGradients)>> = thread::scope(|scope| {
                let handles: Vec<_> = shards
                    .into_iter()
                    .zip(&batchers)
                    .filter(|(shard, _)| !shard.is_empty())
                    .map(|(shard, batcher)| {
                        let replica = model.clone().fork(&batcher.device);
                        scope.spawn(move || {
                            let batch = batcher.batch(shard);
                            compute_gradients(&replica, batch, normalizer, train_embeddings)
                        })
                    })
                    .collect();

                handles
                    .into_iter()
                    .map(|h| h.join().map_err(|_| anyhow!("A data-parallel replica panicked")))
                    .collect()
            });

            // ── Reduce on the main device and step once ─────────────────────
            let mut accumulator = GroupAccumulator::<B>::new(train_embeddings);
            for result in results {
                let (loss, grads) = result?;
                loss_sum += loss;
                accumulator.accumulate(&model, grads.to_device(main, &model));
            }
            model    = optim.step(cfg.lr, model, accumulator.take());
            batches += 1;
        }

        reporter.end_epoch(&model, epoch, mean(loss_sum, batches), start.elapsed())?;
    }

    reporter.finish(&model)
}

/// Cut `items` into `parts` contiguous runs of near-equal size. Trailing
/// runs may be empty when there are fewer items than parts.
fn split_rows<T>(items: Vec<T>, parts: usize) -> Vec<Vec<T>> {
    let parts     = parts.max(1);
    let per_part  = items.len().div_ceil(parts).max(1);
    let mut runs  = Vec::with_capacity(parts);
    let mut items = items.into_iter();
    for _ in 0..parts {
        runs.push(items.by_ref().take(per_part).collect());
    }
    runs
}

// ─── Distributed ──────────────────────────────────────────────────────────────
enum WorkerMessage {
    Gradients { loss: f64, grads: GroupGradients },
    Failed(String),
}

enum LeaderMessage<M> {
    Update(M),
    Abort,
}

pub fn train_distributed<B: AutodiffBackend>(
    cfg:     &TrainConfig,
    model:   Seq2SeqModel<B>,
    dataset: &TranslationDataset,
    devices: &[B::Device],
    outputs: &RunOutputs,
) -> Result<TrainingReport> {
    let world_size = devices.len();

    // One channel pair per follower rank, so the leader can tell which
    // rank went missing and followers never read each other's updates.
    let (to_leader, from_workers): (Vec<Sender<WorkerMessage>>, Vec<Receiver<WorkerMessage>>) =
        (1..world_size).map(|_| mpsc::channel()).unzip();
    let (to_workers, from_leader): (
        Vec<Sender<LeaderMessage<Seq2SeqModel<B>>>>,
        Vec<Receiver<LeaderMessage<Seq2SeqModel<B>>>>,
    ) = (1..world_size).map(|_| mpsc::channel()).unzip();

    thread::scope(|scope| {
        let followers: Vec<_> = to_leader
            .into_iter()
            .zip(from_leader)
            .zip(&devices[1..])
            .enumerate()
            .map(|(i, ((tx, rx), device))| {
                let role    = WorkerRole::new(i + 1, world_size);
                let replica = model.clone().fork(device);
                scope.spawn(move || run_follower(cfg, replica, dataset, device, role, tx, rx))
            })
            .collect();

        let leader = Leader { devices, from_workers, to_workers };
        let report = leader.run(cfg, model, dataset, WorkerRole::new(0, world_size), outputs);

        // The leader has dropped its channels by now, so every follower
        // either finished or is unblocked with an error.
        let mut follower_error = None;
        for (i, handle) in followers.into_iter().enumerate() {
            let outcome = handle
                .join()
                .unwrap_or_else(|_| Err(anyhow!("rank {} panicked", i + 1)));
            if let Err(e) = outcome {
                tracing::debug!("rank {} stopped: {:#}", i + 1, e);
                follower_error.get_or_insert(e);
            }
        }

        match (report, follower_error) {
            (Err(e), _)        => Err(e),
            (Ok(_), Some(e))   => Err(e),
            (Ok(report), None) => Ok(report),
        }
    })
}

/// Rank 0: trains its own shard and steps the model for every rank.
struct Leader<'d, B: AutodiffBackend> {
    devices:      &'d [B::Device],
    from_workers: Vec<Receiver<WorkerMessage>>,
    to_workers:   Vec<Sender<LeaderMessage<Seq2SeqModel<B>>>>,
}

impl<B: AutodiffBackend> Leader<'_, B> {
    fn run(
        self,
        cfg:     &TrainConfig,
        model:   Seq2SeqModel<B>,
        dataset: &TranslationDataset,
        role:    WorkerRole,
        outputs: &RunOutputs,
    ) -> Result<TrainingReport> {
        let device           = &self.devices[0];
        let train_embeddings = cfg.embeddings == EmbeddingMode::Learned;
        let sampler          = ShardSampler::new(dataset.len(), role.rank, role.world_size, cfg.seed);
        let batcher          = TranslationBatcher::<B>::new(device.clone());
        let mut optim        = group_optimizers::<B>(train_embeddings);
        let mut reporter     = EpochReporter::new(role, outputs, cfg.epochs);
        let mut model        = model;

        for epoch in 1..=cfg.epochs {
            let start        = Instant::now();
            let mut loss_sum = 0.0f64;
            let mut batches  = 0usize;

            for indices in sampler.epoch_batches(epoch, cfg.batch_size) {
                let batch      = batcher.batch(dataset.gather(&indices));
                let normalizer = (batch.scored_targets.max(1) * role.world_size) as f64;
                let (mut global_loss, grads) = compute_gradients(&model, batch, normalizer, train_embeddings);

                let mut accumulator = GroupAccumulator::<B>::new(train_embeddings);
                accumulator.accumulate(&model, grads);

                // ── Gather: block until every rank has reported ──────────────
                for (i, rx) in self.from_workers.iter().enumerate() {
                    let rank = i + 1;
                    match rx.recv() {
                        Ok(WorkerMessage::Gradients { loss, grads }) => {
                            global_loss += loss;
                            accumulator.accumulate(&model, grads.to_device(device, &model));
                        }
                        Ok(WorkerMessage::Failed(reason)) => {
                            self.abort();
                            bail!("rank {rank} failed: {reason}");
                        }
                        Err(_) => {
                            self.abort();
                            bail!("rank {rank} disconnected during gradient synchronisation");
                        }
                    }
                }

                model = optim.step(cfg.lr, model, accumulator.take());

                // ── Broadcast the updated replica ────────────────────────────
                for (i, tx) in self.to_workers.iter().enumerate() {
                    let replica = model.clone().fork(&self.devices[i + 1]);
                    if tx.send(LeaderMessage::Update(replica)).is_err() {
                        self.abort();
                        bail!("rank {} disconnected before receiving the update", i + 1);
                    }
                }

                loss_sum += global_loss;
                batches  += 1;
            }

            reporter.end_epoch(&model, epoch, mean(loss_sum, batches), start.elapsed())?;
        }

        reporter.finish(&model)
    }

    fn abort(&self) {
        for tx in &self.to_workers {
            let _ = tx.send(LeaderMessage::Abort);
        }
    }
}

/// Rank r > 0: trains its shard and applies whatever the leader sends back.
fn run_follower<B: AutodiffBackend>(
    cfg:         &TrainConfig,
    model:       Seq2SeqModel<B>,
    dataset:     &TranslationDataset,
    device:      &B::Device,
    role:        WorkerRole,
    to_leader:   Sender<WorkerMessage>,
    from_leader: Receiver<LeaderMessage<Seq2SeqModel<B>>>,
) -> Result<()> {
    let train_embeddings = cfg.embeddings == EmbeddingMode::Learned;
    let sampler          = ShardSampler::new(dataset.len(), role.rank, role.world_size, cfg.seed);
    let batcher          = TranslationBatcher::<B>::new(device.clone());
    let mut model        = model;

    for epoch in 1..=cfg.epochs {
        for indices in sampler.epoch_batches(epoch, cfg.batch_size) {
            let step = panic::catch_unwind(AssertUnwindSafe(|| {
                let batch      = batcher.batch(dataset.gather(&indices));
                let normalizer = (batch.scored_targets.max(1) * role.world_size) as f64;
                compute_gradients(&model, batch, normalizer, train_embeddings)
            }));

            let message = match step {
                Ok((loss, grads)) => WorkerMessage::Gradients { loss, grads },
                Err(_) => {
                    let _ = to_leader.send(WorkerMessage::Failed(format!(
                        "panicked in epoch {epoch}"
                    )));
                    bail!("rank {} panicked in epoch {}", role.rank, epoch);
                }
            };
            if to_leader.send(message).is_err() {
                bail!("rank {}: leader is gone", role.rank);
            }

            match from_leader.recv() {
                Ok(LeaderMessage::Update(updated)) => model = updated,
                Ok(LeaderMessage::Abort) | Err(_) => {
                    bail!("rank {}: run aborted by the leader", role.rank)
                }
            }
        }
    }

    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArrayDevice;
    use tempdir::TempDir;

    use crate::application::train_use_case::ExecutionMode;
    use crate::ml::trainer::run_training;
    use crate::ml::trainer::tests::{outputs, tiny_config, tiny_dataset, tiny_model};

    #[test]
    fn test_split_rows() {
        let runs = split_rows((0..5).collect::<Vec<_>>(), 2);
        assert_eq!(runs, vec![vec![0, 1, 2], vec![3, 4]]);

        let runs = split_rows(vec![1], 3);
        assert_eq!(runs.iter().map(Vec::len).collect::<Vec<_>>(), vec![1, 0, 0]);
    }

    #[test]
    fn test_data_parallel_matches_single_device_loss() {
        // Both modes draw the same shuffled batches from the seed, so the
        // same model gives the same losses whether a batch is computed
        // whole or as two shards.
        let (dataset, src, tgt) = tiny_dataset();
        let device = NdArrayDevice::Cpu;
        let model  = tiny_model(src, tgt);

        let single_dir = TempDir::new("single").unwrap();
        let single = run_training(
            &tiny_config(2, ExecutionMode::Single, 1),
            model.clone(),
            dataset.clone(),
            &[device],
            &outputs(&single_dir),
        )
        .unwrap();

        let parallel_dir = TempDir::new("parallel").unwrap();
        let parallel = run_training(
            &tiny_config(2, ExecutionMode::DataParallel, 2),
            model,
            dataset,
            &[device, device],
            &outputs(&parallel_dir),
        )
        .unwrap();

        for (a, b) in single.epoch_losses.iter().zip(&parallel.epoch_losses) {
            assert!((a - b).abs() < 1e-3, "single {a} vs data-parallel {b}");
        }
    }

    #[test]
    fn test_distributed_run_completes_and_only_rank_zero_writes() {
        let (dataset, src, tgt) = tiny_dataset();
        let device = NdArrayDevice::Cpu;
        let tmp    = TempDir::new("distributed").unwrap();

        let report = run_training(
            &tiny_config(3, ExecutionMode::Distributed, 2),
            tiny_model(src, tgt),
            dataset,
            &[device, device],
            &outputs(&tmp),
        )
        .unwrap();

        assert_eq!(report.epoch_losses.len(), 3);
        assert!(report.epoch_losses.iter().all(|l| l.is_finite()));
        assert!(tmp.path().join("best.mpk.gz").exists());
        assert!(tmp.path().join("last.mpk.gz").exists());

        let csv = std::fs::read_to_string(tmp.path().join("metrics.csv")).unwrap();
        assert_eq!(csv.lines().count(), 4);
    }

    #[test]
    fn test_leader_aborts_when_a_rank_disappears() {
        let (dataset, src, tgt) = tiny_dataset();
        let tmp = TempDir::new("abort").unwrap();
        let cfg = tiny_config(1, ExecutionMode::Distributed, 2);

        let (to_leader, from_worker) = mpsc::channel::<WorkerMessage>();
        let (to_worker, _from_leader) = mpsc::channel();
        drop(to_leader);

        let devices = [NdArrayDevice::Cpu, NdArrayDevice::Cpu];
        let leader = Leader { devices: &devices[..], from_workers: vec![from_worker], to_workers: vec![to_worker] };
        let result = leader.run(&cfg, tiny_model(src, tgt), &dataset, WorkerRole::new(0, 2), &outputs(&tmp));

        let err = result.err().expect("leader must fail");
        assert!(format!("{err:#}").contains("rank 1"));
    }

    #[test]
    fn test_follower_stops_when_leader_aborts() {
        let (dataset, src, tgt) = tiny_dataset();
        let cfg = tiny_config(1, ExecutionMode::Distributed, 2);

        let (to_leader, _from_worker) = mpsc::channel();
        let (to_worker, from_leader) = mpsc::channel();
        to_worker.send(LeaderMessage::Abort).unwrap();

        let device = NdArrayDevice::Cpu;
        let result = run_follower(&cfg, tiny_model(src, tgt), &dataset, &device, WorkerRole::new(1, 2), to_leader, from_leader);
        assert!(result.is_err());
    }
}
