use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::dataset::DEFAULT_MIN_INTERACTIONS;
use crate::evaluate::DEFAULT_BATCH_SIZE;
use crate::inference::evaluation::DEFAULT_K;
use crate::models::ModelConfig;
use crate::training::TrainingConfig;

#[derive(Parser, Debug)]
#[command(
    name = "ktrec-engine",
    version,
    about = "Knowledge-tracing next-item recommender using Candle"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "KTREC_LOG_LEVEL")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve recommendations as JSON-RPC 2.0 over NDJSON stdio
    Serve(ServeArgs),
    /// Train a model bundle from an interaction log
    Train(TrainArgs),
    /// Report recall@k of a model bundle on an interaction log
    Evaluate(EvaluateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    /// Device: "cpu", "cuda", "metal"
    #[arg(long, default_value = "cpu", env = "KTREC_DEVICE")]
    pub device: String,

    /// CUDA device ordinal (when --device cuda)
    #[arg(long, default_value = "0")]
    pub device_id: usize,
}

#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Model bundle (local directory or HuggingFace repo ID)
    #[arg(long, env = "KTREC_MODEL")]
    pub model: String,

    /// Hub revision (branch, tag or commit) when --model is a repo ID
    #[arg(long, env = "KTREC_MODEL_REVISION")]
    pub revision: Option<String>,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub device: DeviceArgs,

    /// Recommendations returned when a request omits topN
    #[arg(long, default_value = "5", env = "KTREC_TOP_N")]
    pub top_n: usize,

    /// Server name in the initialize response
    #[arg(long, default_value = "ktrec-engine")]
    pub server_name: String,

    /// Server version
    #[arg(long, default_value = env!("CARGO_PKG_VERSION"))]
    pub server_version: String,
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Interaction log, one JSON record per line
    #[arg(long, env = "KTREC_INTERACTIONS")]
    pub interactions: PathBuf,

    /// Directory the model bundle is written to
    #[arg(long)]
    pub output: PathBuf,

    #[command(flatten)]
    pub device: DeviceArgs,

    #[arg(long, default_value = "50")]
    pub window_len: usize,

    #[arg(long, default_value = "64")]
    pub embed_dim: usize,

    #[arg(long, default_value = "128")]
    pub hidden_dim: usize,

    #[arg(long, default_value = "0.3")]
    pub dropout: f32,

    #[arg(long, default_value = "10")]
    pub epochs: usize,

    #[arg(long, default_value = "64")]
    pub batch_size: usize,

    #[arg(long, default_value = "0.001")]
    pub learning_rate: f64,

    /// Learners with fewer interactions are skipped
    #[arg(long, default_value_t = DEFAULT_MIN_INTERACTIONS)]
    pub min_interactions: usize,

    /// Seed for batch shuffling
    #[arg(long, default_value = "42", env = "KTREC_SEED")]
    pub seed: u64,
}

impl TrainArgs {
    /// Architecture dimensions; `n_items` is filled in from the log.
    pub fn model_dims(&self) -> ModelConfig {
        ModelConfig {
            n_items: 0,
            embed_dim: self.embed_dim,
            hidden_dim: self.hidden_dim,
            window_len: self.window_len,
            dropout: self.dropout,
        }
    }

    pub fn training_config(&self) -> TrainingConfig {
        TrainingConfig {
            epochs: self.epochs,
            batch_size: self.batch_size,
            learning_rate: self.learning_rate,
            seed: self.seed,
        }
    }
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub device: DeviceArgs,

    /// Interaction log, one JSON record per line
    #[arg(long, env = "KTREC_INTERACTIONS")]
    pub interactions: PathBuf,

    #[arg(long, default_value_t = DEFAULT_K)]
    pub k: usize,

    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    #[arg(long, default_value_t = DEFAULT_MIN_INTERACTIONS)]
    pub min_interactions: usize,
}
