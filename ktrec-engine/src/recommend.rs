//! Top-N recommendation from per-code scores.
//!
//! The padding slot (code 0) is removed before any probability is computed,
//! so it can neither absorb probability mass nor appear in a result.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{KtError, Result};
use crate::index::ItemIndex;

/// One ranked item with its share of the Top-N probability mass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub item_id: String,
    pub relevance: f32,
}

// ── Public API ───────────────────────────────────────────────────────────

/// Softmax over real items, select the `top_n` most probable, renormalize
/// them to sum to 1, and map codes back to raw ids.
///
/// `logits` must have one entry per code, padding slot included. Logits
/// that are exactly zero for every real item carry no signal; they yield
/// `top_n` entries with relevance 0.
pub fn recommend(logits: &[f32], top_n: usize, index: &ItemIndex) -> Result<Vec<Recommendation>> {
    KtError::check_len("logits", index.num_codes(), logits.len())?;

    let codes = top_k_codes(logits, top_n);
    if logits[1..].iter().all(|&l| l == 0.0) {
        return to_recommendations(&codes, |_| 0.0, index);
    }

    let probs = softmax_f64(logits);
    let total: f64 = codes.iter().map(|&c| probs[c as usize]).sum();
    to_recommendations(
        &codes,
        |code| {
            let p = probs[code as usize];
            if total > 0.0 {
                (p / total) as f32
            } else {
                p as f32
            }
        },
        index,
    )
}

/// Select and renormalize already non-negative scores (e.g. probabilities).
///
/// When the selected mass is exactly zero the raw values are returned
/// unchanged instead of dividing by zero.
pub fn rank_scores(scores: &[f32], top_n: usize, index: &ItemIndex) -> Result<Vec<Recommendation>> {
    KtError::check_len("scores", index.num_codes(), scores.len())?;

    let codes = top_k_codes(scores, top_n);
    let total: f64 = codes.iter().map(|&c| sanitize(scores[c as usize])).sum();
    to_recommendations(
        &codes,
        |code| {
            let value = sanitize(scores[code as usize]);
            if total > 0.0 {
                (value / total) as f32
            } else {
                value as f32
            }
        },
        index,
    )
}

/// The `k` highest-scoring real codes (never 0), best first.
///
/// Ties go to the lower code; NaN ranks below every number.
pub fn top_k_codes(scores: &[f32], k: usize) -> Vec<u32> {
    let mut ranked: Vec<(u32, f32)> = scores
        .iter()
        .enumerate()
        .skip(1)
        .map(|(code, &s)| (code as u32, sanitize_rank(s)))
        .collect();

    let k = k.min(ranked.len());
    if k == 0 {
        return vec![];
    }
    if k < ranked.len() {
        ranked.select_nth_unstable_by(k - 1, rank_order);
        ranked.truncate(k);
    }
    ranked.sort_unstable_by(rank_order);
    ranked.into_iter().map(|(code, _)| code).collect()
}

/// Probabilities over codes `1..`, with index 0 pinned to zero.
///
/// If no real item has a finite or `+inf` logit the result is all zeros.
pub fn masked_softmax(logits: &[f32]) -> Vec<f32> {
    softmax_f64(logits).into_iter().map(|p| p as f32).collect()
}

// ── Internal helpers ──────────────────────────────────────────────────────

/// Masked softmax kept in f64 so renormalized Top-N shares stay exact
/// over large catalogs.
fn softmax_f64(logits: &[f32]) -> Vec<f64> {
    let mut probs = vec![0.0f64; logits.len()];
    if logits.len() <= 1 {
        return probs;
    }

    // Clamp +inf so the max-shift below stays finite; NaN counts as -inf.
    let clamped: Vec<f64> = logits[1..]
        .iter()
        .map(|&l| if l.is_nan() { f64::NEG_INFINITY } else { l.min(f32::MAX) as f64 })
        .collect();
    let max = clamped.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return probs;
    }

    let exps: Vec<f64> = clamped.iter().map(|&l| (l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    for (slot, e) in probs[1..].iter_mut().zip(exps) {
        *slot = e / sum;
    }
    probs
}

fn to_recommendations(
    codes: &[u32],
    relevance: impl Fn(u32) -> f32,
    index: &ItemIndex,
) -> Result<Vec<Recommendation>> {
    codes
        .iter()
        .map(|&code| {
            Ok(Recommendation {
                item_id: index.decode(code)?.to_string(),
                relevance: relevance(code),
            })
        })
        .collect()
}

fn rank_order(a: &(u32, f32), b: &(u32, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
}

fn sanitize_rank(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}

fn sanitize(score: f32) -> f64 {
    if score.is_finite() && score > 0.0 {
        score as f64
    } else {
        0.0
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> ItemIndex {
        ItemIndex::build(["A", "B", "C"])
    }

    fn relevance_sum(recs: &[Recommendation]) -> f32 {
        recs.iter().map(|r| r.relevance).sum()
    }

    // ── masked_softmax ───────────────────────────────────────────────────

    #[test]
    fn softmax_ignores_padding_logit() {
        let with_huge_pad = masked_softmax(&[100.0, 1.0, 2.0]);
        let with_tiny_pad = masked_softmax(&[-100.0, 1.0, 2.0]);
        assert_eq!(with_huge_pad[0], 0.0);
        assert_eq!(with_huge_pad, with_tiny_pad);
        assert!((with_huge_pad[1] + with_huge_pad[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn softmax_handles_extreme_values() {
        let probs = masked_softmax(&[0.0, 1000.0, 1000.0, -1000.0]);
        assert!((probs[1] - 0.5).abs() < 1e-6);
        assert!((probs[2] - 0.5).abs() < 1e-6);
        assert!(probs[3] < 1e-6);
        assert!(probs.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn softmax_of_all_negative_infinity_is_zero() {
        let probs = masked_softmax(&[0.0, f32::NEG_INFINITY, f32::NAN]);
        assert_eq!(probs, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn softmax_of_positive_infinity_is_finite() {
        let probs = masked_softmax(&[0.0, f32::INFINITY, 1.0]);
        assert!((probs[1] - 1.0).abs() < 1e-6);
        assert_eq!(probs[2], 0.0);
    }

    // ── top_k_codes ──────────────────────────────────────────────────────

    #[test]
    fn top_k_never_returns_padding() {
        assert_eq!(top_k_codes(&[99.0, 1.0, 2.0], 3), vec![2, 1]);
    }

    #[test]
    fn top_k_breaks_ties_by_ascending_code() {
        assert_eq!(top_k_codes(&[0.0, 0.5, 0.9, 0.5, 0.9], 4), vec![2, 4, 1, 3]);
        assert_eq!(top_k_codes(&[0.0, 0.5, 0.9, 0.5, 0.9], 1), vec![2]);
    }

    #[test]
    fn top_k_ranks_nan_last() {
        assert_eq!(top_k_codes(&[0.0, f32::NAN, -3.0, 1.0], 3), vec![3, 2, 1]);
    }

    #[test]
    fn top_k_of_zero_is_empty() {
        assert!(top_k_codes(&[0.0, 1.0], 0).is_empty());
        assert!(top_k_codes(&[0.0], 5).is_empty());
    }

    // ── recommend ────────────────────────────────────────────────────────

    #[test]
    fn end_to_end_two_of_three() {
        let recs = recommend(&[f32::NEG_INFINITY, 2.0, 1.0, 0.5], 2, &abc()).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].item_id, "A");
        assert_eq!(recs[1].item_id, "B");
        assert!((recs[0].relevance - 0.731_058_6).abs() < 1e-5);
        assert!((recs[1].relevance - 0.268_941_4).abs() < 1e-5);
    }

    #[test]
    fn relevances_sum_to_one_and_descend() {
        let logits = [3.0, -0.2, 1.7, 0.4, 2.2, -1.0];
        let index = ItemIndex::build(["p", "q", "r", "s", "t"]);
        for n in 1..=5 {
            let recs = recommend(&logits, n, &index).unwrap();
            assert_eq!(recs.len(), n);
            assert!((relevance_sum(&recs) - 1.0).abs() < 1e-6);
            assert!(recs.windows(2).all(|w| w[0].relevance >= w[1].relevance));
        }
    }

    #[test]
    fn size_is_bounded_by_item_count() {
        let recs = recommend(&[0.0, 1.0, 2.0, 3.0], 10, &abc()).unwrap();
        assert_eq!(recs.len(), 3);
        assert!(recommend(&[0.0, 1.0, 2.0, 3.0], 0, &abc()).unwrap().is_empty());
    }

    #[test]
    fn padding_never_recommended_even_when_dominant() {
        let recs = recommend(&[50.0, 0.1, 0.0, -0.2], 3, &abc()).unwrap();
        assert!(recs.iter().all(|r| ["A", "B", "C"].contains(&r.item_id.as_str())));
        assert!((relevance_sum(&recs) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn all_zero_scores_return_zero_relevance() {
        let recs = rank_scores(&[0.0, 0.0, 0.0, 0.0], 3, &abc()).unwrap();
        assert_eq!(recs.len(), 3);
        assert!(recs.iter().all(|r| r.relevance == 0.0));
        let ids: Vec<&str> = recs.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }

    #[test]
    fn fully_masked_logits_degrade_to_zeros() {
        let logits = [0.0, f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY];
        let recs = recommend(&logits, 2, &abc()).unwrap();
        assert_eq!(recs.len(), 2);
        assert!(recs.iter().all(|r| r.relevance == 0.0));
    }

    #[test]
    fn all_zero_logits_return_zero_relevance() {
        let recs = recommend(&[0.0, 0.0, 0.0, 0.0], 3, &abc()).unwrap();
        assert_eq!(recs.len(), 3);
        assert!(recs.iter().all(|r| r.relevance == 0.0));
        let ids: Vec<&str> = recs.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);

        // The padding logit alone does not make the vector informative.
        let recs = recommend(&[7.5, 0.0, 0.0, 0.0], 2, &abc()).unwrap();
        assert!(recs.iter().all(|r| r.relevance == 0.0));
    }

    #[test]
    fn equal_nonzero_logits_split_evenly() {
        let recs = recommend(&[0.0, 1.5, 1.5, 1.5], 3, &abc()).unwrap();
        for r in &recs {
            assert!((r.relevance - 1.0 / 3.0).abs() < 1e-6);
        }
    }

    #[test]
    fn large_catalog_relevances_sum_to_one() {
        let n_items = 5000;
        let ids: Vec<String> = (0..n_items).map(|i| format!("item{i:05}")).collect();
        let index = ItemIndex::build(ids);

        // Deterministic pseudo-random logits in [0, 4).
        let mut state = 0x2545_f491_u64;
        let mut logits = vec![0.0f32];
        for _ in 0..n_items {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
            logits.push(((state >> 40) as f32 / (1u64 << 24) as f32) * 4.0);
        }

        for top_n in [50, 100, 200, 500, 1000, 5000] {
            let recs = recommend(&logits, top_n, &index).unwrap();
            assert_eq!(recs.len(), top_n);
            let total: f64 = recs.iter().map(|r| r.relevance as f64).sum();
            assert!((total - 1.0).abs() < 1e-6, "top_n = {top_n}: sum = {total}");
        }
    }

    #[test]
    fn logits_width_must_match_index() {
        let err = recommend(&[0.0, 1.0], 1, &abc()).unwrap_err();
        assert!(matches!(err, KtError::ShapeMismatch { what: "logits", expected: 4, actual: 2 }));
    }

    #[test]
    fn repeated_calls_are_identical() {
        let logits = [0.1, 0.7, 0.7, 0.2];
        let first = recommend(&logits, 2, &abc()).unwrap();
        for _ in 0..10 {
            assert_eq!(recommend(&logits, 2, &abc()).unwrap(), first);
        }
    }

    #[test]
    fn serializes_camel_case() {
        let rec = Recommendation {
            item_id: "q1".into(),
            relevance: 0.5,
        };
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json, serde_json::json!({ "itemId": "q1", "relevance": 0.5 }));
    }
}
