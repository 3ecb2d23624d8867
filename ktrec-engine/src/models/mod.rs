pub mod baseline;
pub mod encoder;
pub mod gru;
pub mod scorer;
pub mod weights;

use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use serde::{Deserialize, Serialize};

use crate::error::{KtError, Result};
use crate::sequence::PaddedSequence;

use self::encoder::KtEncoder;
use self::scorer::NextItemScorer;

// ── Traits ────────────────────────────────────────────────────────────────

/// Anything that maps padded histories to one score per item code.
///
/// Implementations must be pure with respect to `&self`: the same batch
/// always produces the same rows.
pub trait NextItemModel: Send + Sync {
    /// Window length every input sequence must have.
    fn window_len(&self) -> usize;

    /// Width of each output row (real items + the padding slot).
    fn num_codes(&self) -> usize;

    /// Raw scores, one row of `num_codes()` values per input sequence.
    fn logits(&self, batch: &[&PaddedSequence]) -> Result<Vec<Vec<f32>>>;
}

// ── Mode ──────────────────────────────────────────────────────────────────

/// Whether stochastic regularization is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Training,
    Inference,
}

impl Mode {
    pub fn is_training(self) -> bool {
        matches!(self, Self::Training)
    }
}

// ── Model configuration ──────────────────────────────────────────────────

/// Architecture dimensions, stored as `config.json` next to the weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of real items (codes `1..=n_items`).
    pub n_items: usize,
    #[serde(default = "default_embed_dim")]
    pub embed_dim: usize,
    #[serde(default = "default_hidden_dim")]
    pub hidden_dim: usize,
    #[serde(default = "default_window_len")]
    pub window_len: usize,
    #[serde(default = "default_dropout")]
    pub dropout: f32,
}

fn default_embed_dim() -> usize {
    64
}

fn default_hidden_dim() -> usize {
    128
}

fn default_window_len() -> usize {
    50
}

fn default_dropout() -> f32 {
    0.3
}

impl ModelConfig {
    pub fn new(n_items: usize) -> Self {
        Self {
            n_items,
            embed_dim: default_embed_dim(),
            hidden_dim: default_hidden_dim(),
            window_len: default_window_len(),
            dropout: default_dropout(),
        }
    }

    /// Reject dimensions no model can be built with.
    pub fn validate(&self) -> Result<()> {
        if self.n_items == 0 {
            return Err(KtError::InvalidConfig("n_items must be positive".into()));
        }
        for (name, value) in [
            ("embed_dim", self.embed_dim),
            ("hidden_dim", self.hidden_dim),
            ("window_len", self.window_len),
        ] {
            if value == 0 {
                return Err(KtError::InvalidConfig(format!("{name} must be positive")));
            }
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(KtError::InvalidConfig(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }

    /// Item codes including the padding slot.
    pub fn num_codes(&self) -> usize {
        self.n_items + 1
    }

    /// Per-step GRU input: item embedding plus one correctness scalar.
    pub fn step_dim(&self) -> usize {
        self.embed_dim + 1
    }
}

// ── Knowledge-tracing model ──────────────────────────────────────────────

/// Encoder and scorer with dimensions checked against each other at build
/// time. Parameters are never mutated after loading, so a single instance
/// can be shared across concurrent requests.
pub struct KtModel {
    config: ModelConfig,
    encoder: KtEncoder,
    scorer: NextItemScorer,
    device: Device,
}

impl KtModel {
    /// Build from a variable source. Missing or mis-shaped parameters yield
    /// [`KtError::IncompatibleWeights`].
    pub fn load(vb: VarBuilder, config: &ModelConfig) -> Result<Self> {
        config.validate()?;
        let device = vb.device().clone();

        let encoder = KtEncoder::new(config, vb.clone())
            .map_err(|e| KtError::IncompatibleWeights(e.to_string()))?;
        let scorer = NextItemScorer::new(encoder.hidden_dim(), config.num_codes(), vb.pp("fc"))
            .map_err(|e| KtError::IncompatibleWeights(e.to_string()))?;

        Ok(Self {
            config: config.clone(),
            encoder,
            scorer,
            device,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Mastery states for a batch, shape `(batch, hidden_dim)`.
    pub fn mastery(&self, batch: &[&PaddedSequence], mode: Mode) -> Result<Tensor> {
        self.encoder.encode(batch, mode)
    }

    /// Logits for a batch, shape `(batch, n_items + 1)`.
    pub fn forward(&self, batch: &[&PaddedSequence], mode: Mode) -> Result<Tensor> {
        let mastery = self.encoder.encode(batch, mode)?;
        self.scorer.score(&mastery)
    }
}

impl NextItemModel for KtModel {
    fn window_len(&self) -> usize {
        self.config.window_len
    }

    fn num_codes(&self) -> usize {
        self.scorer.num_codes()
    }

    fn logits(&self, batch: &[&PaddedSequence]) -> Result<Vec<Vec<f32>>> {
        if batch.is_empty() {
            return Ok(vec![]);
        }
        let logits = self.forward(batch, Mode::Inference)?;
        Ok(logits.to_device(&Device::Cpu)?.to_vec2()?)
    }
}
