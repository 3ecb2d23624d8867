//! Offline recall@k over held-out next-item samples.

use serde::Serialize;

use crate::error::{KtError, Result};
use crate::index::PADDING_CODE;
use crate::models::NextItemModel;
use crate::recommend::top_k_codes;
use crate::sequence::TrainingSample;

pub const DEFAULT_BATCH_SIZE: usize = 128;

/// Hit counts behind a recall@k figure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallReport {
    pub k: usize,
    pub hits: usize,
    pub total: usize,
    pub recall: f64,
}

/// Score `samples` in batches of `batch_size` and count how often the true
/// next item lands in the raw-logit top `k` (padding excluded).
pub fn evaluate<M: NextItemModel + ?Sized>(
    model: &M,
    samples: &[TrainingSample],
    k: usize,
    batch_size: usize,
) -> Result<RecallReport> {
    if batch_size == 0 {
        return Err(KtError::InvalidConfig("batch_size must be positive".into()));
    }
    let num_codes = model.num_codes();
    let mut hits = 0usize;

    for chunk in samples.chunks(batch_size) {
        let batch: Vec<_> = chunk.iter().map(|s| &s.history).collect();
        let rows = model.logits(&batch)?;
        KtError::check_len("logit rows", chunk.len(), rows.len())?;

        for (sample, row) in chunk.iter().zip(&rows) {
            KtError::check_len("logits", num_codes, row.len())?;
            let label = sample.next_item;
            if label == PADDING_CODE || label as usize >= num_codes {
                return Err(KtError::InvalidCode(label));
            }
            if top_k_codes(row, k).contains(&label) {
                hits += 1;
            }
        }
    }

    let total = samples.len();
    let recall = if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    };
    tracing::debug!(k, hits, total, recall, "Evaluated recall@k");

    Ok(RecallReport {
        k,
        hits,
        total,
        recall,
    })
}

/// Fraction of samples whose true next item is ranked in the top `k`.
/// An empty sample set scores `0.0`.
pub fn recall_at_k<M: NextItemModel + ?Sized>(model: &M, samples: &[TrainingSample], k: usize) -> Result<f64> {
    Ok(evaluate(model, samples, k, DEFAULT_BATCH_SIZE)?.recall)
}
