// ============================================================
// Layer 1 - CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `prepare`, `train` and
// `translate`, and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, enums via ValueEnum)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};

use crate::application::{
    prepare_use_case::PrepareConfig,
    train_use_case::{EmbeddingMode, ExecutionMode, TrainConfig},
};
use crate::infra::checkpoint::CheckpointKind;
use crate::ml::model::DEFAULT_EMBEDDING_DIM;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Clean the corpus, build vocabularies and embedding matrices
    Prepare(PrepareArgs),

    /// Train the translator on a prepared artifact directory
    Train(TrainArgs),

    /// Translate Chinese sentences read from stdin ('q' quits)
    Translate(TranslateArgs),
}

#[derive(Args, Debug)]
pub struct PrepareArgs {
    /// Tab separated corpus, one "english<TAB>chinese" pair per line
    #[arg(long)]
    pub corpus: String,

    /// Where vocabularies, encoded corpus and matrices are written
    #[arg(long, default_value = "artifacts")]
    pub artifact_dir: String,

    /// Chinese word vectors, "token v1 .. vd" per line
    #[arg(long)]
    pub zh_vectors: String,

    /// English word vectors, same layout
    #[arg(long)]
    pub en_vectors: String,

    /// Tokens seen fewer times than this are left out of the vocabulary
    #[arg(long, default_value_t = 10)]
    pub min_freq: usize,

    /// Encoded sequence length, <sos> and <eos> included
    #[arg(long, default_value_t = 50)]
    pub max_len: usize,
}

impl From<PrepareArgs> for PrepareConfig {
    fn from(a: PrepareArgs) -> Self {
        PrepareConfig {
            corpus:       a.corpus,
            artifact_dir: a.artifact_dir,
            zh_vectors:   a.zh_vectors,
            en_vectors:   a.en_vectors,
            min_freq:     a.min_freq,
            max_len:      a.max_len,
        }
    }
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Artifact directory written by `prepare`
    #[arg(long, default_value = "artifacts")]
    pub artifact_dir: String,

    /// Parent of the per-run directories (train0, train1, ...)
    #[arg(long, default_value = "runs")]
    pub runs_dir: String,

    /// Rows per optimizer step (per worker in distributed mode)
    #[arg(long, default_value_t = 100)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 150)]
    pub epochs: usize,

    /// Adam learning rate
    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// GRU hidden size, shared by encoder and decoder
    #[arg(long, default_value_t = 256)]
    pub hidden_size: usize,

    /// Stacked GRU layers on each side
    #[arg(long, default_value_t = 3)]
    pub num_layers: usize,

    /// Dropout between stacked GRU layers
    #[arg(long, default_value_t = 0.3)]
    pub dropout: f64,

    /// Embedding width when --embeddings learned
    #[arg(long, default_value_t = DEFAULT_EMBEDDING_DIM)]
    pub embedding_dim: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, value_enum, default_value_t = ExecutionMode::Single)]
    pub mode: ExecutionMode,

    /// Number of devices (one worker each)
    #[arg(long, default_value_t = 1)]
    pub workers: usize,

    #[arg(long, value_enum, default_value_t = EmbeddingMode::Pretrained)]
    pub embeddings: EmbeddingMode,
}

impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            artifact_dir:  a.artifact_dir,
            runs_dir:      a.runs_dir,
            batch_size:    a.batch_size,
            epochs:        a.epochs,
            lr:            a.lr,
            hidden_size:   a.hidden_size,
            num_layers:    a.num_layers,
            dropout:       a.dropout,
            embedding_dim: a.embedding_dim,
            seed:          a.seed,
            mode:          a.mode,
            workers:       a.workers,
            embeddings:    a.embeddings,
        }
    }
}

#[derive(Args, Debug)]
pub struct TranslateArgs {
    /// Artifact directory the run was trained on
    #[arg(long, default_value = "artifacts")]
    pub artifact_dir: String,

    /// Run directory holding the checkpoints, e.g. runs/train0
    #[arg(long)]
    pub run_dir: String,

    #[arg(long, value_enum, default_value_t = CheckpointKind::Best)]
    pub checkpoint: CheckpointKind,
}
