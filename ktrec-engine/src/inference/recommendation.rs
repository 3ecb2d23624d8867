use crate::error::Result;
use crate::models::weights::ModelBundle;
use crate::models::NextItemModel;
use crate::protocol::{RecommendParams, RecommendResult};
use crate::recommend::recommend;
use crate::sequence::build_inference_window;

/// Encode a learner's raw history, score it, and return the Top-N items.
///
/// Unknown item ids are rejected before the model runs. An empty history
/// is valid and scores an all-padding window.
pub fn run_recommendation(
    bundle: &ModelBundle,
    params: RecommendParams,
    default_top_n: usize,
) -> Result<RecommendResult> {
    let codes = bundle.index.encode_all(&params.history_items)?;
    let window = build_inference_window(&codes, &params.history_correct, bundle.model.window_len())?;
    let top_n = params.top_n.unwrap_or(default_top_n);

    let row = bundle
        .model
        .logits(&[&window])?
        .into_iter()
        .next()
        .unwrap_or_default();
    let recommendations = recommend(&row, top_n, &bundle.index)?;

    tracing::debug!(
        learner_id = params.learner_id.as_deref().unwrap_or("-"),
        history = codes.len(),
        top_n,
        returned = recommendations.len(),
        "Recommendation computed"
    );

    Ok(RecommendResult {
        learner_id: params.learner_id,
        recommendations,
    })
}
