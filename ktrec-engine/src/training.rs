//! Mini-batch training of [`KtModel`] on next-item cross-entropy.

use candle_core::{DType, Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

use crate::dataset::{build_vocabulary, group_by_learner, retain_active_learners, Interaction};
use crate::error::{KtError, Result};
use crate::index::ItemIndex;
use crate::models::{KtModel, Mode, ModelConfig};
use crate::sequence::{build_training_samples, TrainingSample};

/// Optimizer schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 64,
            learning_rate: 1e-3,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(KtError::InvalidConfig("batch_size must be positive".into()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(KtError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochStats {
    pub epoch: usize,
    pub mean_loss: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingReport {
    pub samples: usize,
    pub epochs: Vec<EpochStats>,
}

impl TrainingReport {
    pub fn final_loss(&self) -> Option<f32> {
        self.epochs.last().map(|e| e.mean_loss)
    }
}

/// Result of training from a raw interaction log.
pub struct TrainedBundle {
    pub config: ModelConfig,
    pub index: ItemIndex,
    pub model: KtModel,
    pub varmap: VarMap,
    pub report: TrainingReport,
}

/// Run `config.epochs` passes over `samples`, updating the variables in
/// `varmap` that back `model`.
///
/// Dropout is active throughout. Batch order is shuffled with a generator
/// seeded from `config.seed`.
pub fn train(
    model: &KtModel,
    varmap: &VarMap,
    samples: &[TrainingSample],
    config: &TrainingConfig,
) -> Result<TrainingReport> {
    config.validate()?;
    let params = ParamsAdamW {
        lr: config.learning_rate,
        ..Default::default()
    };
    let mut optimizer = AdamW::new(varmap.all_vars(), params)?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut order: Vec<usize> = (0..samples.len()).collect();
    let mut epochs = Vec::with_capacity(config.epochs);

    for epoch in 1..=config.epochs {
        order.shuffle(&mut rng);
        let mut loss_sum = 0.0f32;
        let mut batches = 0usize;

        for chunk in order.chunks(config.batch_size) {
            let batch: Vec<_> = chunk.iter().map(|&i| &samples[i].history).collect();
            let labels: Vec<u32> = chunk.iter().map(|&i| samples[i].next_item).collect();
            let targets = Tensor::from_vec(labels, chunk.len(), model.device())?;

            let logits = model.forward(&batch, Mode::Training)?;
            let loss = candle_nn::loss::cross_entropy(&logits, &targets)?;
            optimizer.backward_step(&loss)?;

            loss_sum += loss.to_scalar::<f32>()?;
            batches += 1;
        }

        let mean_loss = if batches == 0 { 0.0 } else { loss_sum / batches as f32 };
        tracing::info!(epoch, epochs = config.epochs, mean_loss, "Epoch complete");
        epochs.push(EpochStats { epoch, mean_loss });
    }

    Ok(TrainingReport {
        samples: samples.len(),
        epochs,
    })
}

/// Drop short learners, build the vocabulary from the rest, sample windows
/// and a freshly initialized model, then train it.
///
/// `dims.n_items` is replaced by the size of the observed vocabulary.
pub fn train_from_interactions(
    records: &[Interaction],
    dims: &ModelConfig,
    min_interactions: usize,
    training: &TrainingConfig,
    device: &Device,
) -> Result<TrainedBundle> {
    let kept = retain_active_learners(records, min_interactions);
    let index = build_vocabulary(&kept);
    if index.is_empty() {
        return Err(KtError::InvalidConfig(format!(
            "no learner has at least {min_interactions} interactions"
        )));
    }
    let config = ModelConfig {
        n_items: index.len(),
        ..dims.clone()
    };
    config.validate()?;

    let learners = group_by_learner(&kept, &index, min_interactions)?;
    let samples = build_training_samples(&learners, config.window_len);
    if samples.is_empty() {
        return Err(KtError::InvalidConfig(format!(
            "no training samples: {} learners kept with min_interactions = {}",
            learners.len(),
            min_interactions
        )));
    }
    tracing::info!(
        items = index.len(),
        learners = learners.len(),
        samples = samples.len(),
        "Prepared training data"
    );

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
    let model = KtModel::load(vb, &config)?;
    let report = train(&model, &varmap, &samples, training)?;

    Ok(TrainedBundle {
        config,
        index,
        model,
        varmap,
        report,
    })
}
