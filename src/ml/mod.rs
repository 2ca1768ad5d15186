// ============================================================
// Layer 5 - ML / Model Layer (Burn)
// ============================================================
// All the tensor work of the translator lives here.
//
//   model.rs      - GRU encoder-decoder
//                   • source / target embedding tables
//                   • layer norm on both embedded inputs
//                   • stacked GRU encoder, stacked GRU decoder,
//                     each layer an explicit step-by-step recurrence
//                   • output layer norm + vocabulary projection
//                   • masked cross entropy
//
//   trainer.rs    - single-device training loop, the two
//                   parameter groups and their Adam optimizers,
//                   best/last checkpointing per epoch
//
//   parallel.rs   - data-parallel and distributed training over
//                   several devices
//
//   translator.rs - greedy autoregressive decoding from raw text
//
// Backends:
//   training and translation run on wgpu, `prepare` and every
//   unit test run on ndarray (CPU).
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Sutskever et al. (2014) Sequence to Sequence Learning
//            Cho et al. (2014) GRU

use burn::backend::{
    wgpu::{Wgpu, WgpuDevice},
    Autodiff,
};

/// GRU encoder-decoder architecture
pub mod model;

/// Training loop shared by every execution mode
pub mod trainer;

/// Multi-device training: data parallel and distributed
pub mod parallel;

/// Greedy decoding of a trained model
pub mod translator;

pub type InferBackend = Wgpu;
pub type TrainBackend = Autodiff<InferBackend>;

/// One device per training worker. A single worker uses the default
/// adapter; several workers get one discrete GPU each.
pub fn train_devices(workers: usize) -> Vec<WgpuDevice> {
    match workers {
        0 | 1 => vec![WgpuDevice::default()],
        n => (0..n).map(WgpuDevice::DiscreteGpu).collect(),
    }
}
