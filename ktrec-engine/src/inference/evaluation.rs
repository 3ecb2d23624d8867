use crate::dataset::{group_by_learner, DEFAULT_MIN_INTERACTIONS};
use crate::error::Result;
use crate::evaluate::{evaluate, DEFAULT_BATCH_SIZE};
use crate::models::baseline::MostFrequentBaseline;
use crate::models::weights::ModelBundle;
use crate::models::NextItemModel;
use crate::protocol::{EvaluateParams, EvaluateResult};
use crate::sequence::build_training_samples;

pub const DEFAULT_K: usize = 5;

/// Recall@k of the loaded model on an interaction log, next to the
/// most-frequent baseline fitted on the same log.
pub fn run_evaluation(bundle: &ModelBundle, params: &EvaluateParams) -> Result<EvaluateResult> {
    let k = params.k.unwrap_or(DEFAULT_K);
    let min_interactions = params.min_interactions.unwrap_or(DEFAULT_MIN_INTERACTIONS);
    let batch_size = params.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
    let window_len = bundle.model.window_len();

    let learners = group_by_learner(&params.interactions, &bundle.index, min_interactions)?;
    let samples = build_training_samples(&learners, window_len);

    let report = evaluate(&bundle.model, &samples, k, batch_size)?;
    let baseline = MostFrequentBaseline::fit(&learners, bundle.model.num_codes(), window_len);
    let baseline_report = evaluate(&baseline, &samples, k, batch_size)?;

    tracing::info!(
        k,
        samples = report.total,
        recall = report.recall,
        baseline_recall = baseline_report.recall,
        "Evaluation complete"
    );

    Ok(EvaluateResult {
        k,
        samples: report.total,
        hits: report.hits,
        recall_at_k: report.recall,
        baseline_recall_at_k: baseline_report.recall,
    })
}
