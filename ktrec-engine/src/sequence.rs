//! Fixed-length windows over a learner's interaction history.
//!
//! Training samples and inference queries go through the same
//! truncate-then-left-pad routine ([`window`]), so a history seen at serving
//! time is laid out exactly as it was during training.

use std::collections::BTreeMap;

use crate::error::{KtError, Result};
use crate::index::PADDING_CODE;

// ── Learner history ───────────────────────────────────────────────────────

/// A learner's encoded interactions in chronological order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LearnerHistory {
    items: Vec<u32>,
    correct: Vec<bool>,
}

impl LearnerHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, code: u32, correct: bool) {
        self.items.push(code);
        self.correct.push(correct);
    }

    pub fn items(&self) -> &[u32] {
        &self.items
    }

    pub fn correct(&self) -> &[bool] {
        &self.correct
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ── Padded sequence ───────────────────────────────────────────────────────

/// Aligned `(item, correctness)` window of a fixed length.
///
/// A padded position always holds `(0, 0)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaddedSequence {
    items: Vec<u32>,
    correct: Vec<u8>,
}

impl PaddedSequence {
    /// Wrap pre-laid-out vectors. Fails when the two lengths differ.
    pub fn from_parts(items: Vec<u32>, correct: Vec<u8>) -> Result<Self> {
        KtError::check_len("history_correct", items.len(), correct.len())?;
        Ok(Self { items, correct })
    }

    pub fn items(&self) -> &[u32] {
        &self.items
    }

    pub fn correct(&self) -> &[u8] {
        &self.correct
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of leading padding positions.
    pub fn padding_len(&self) -> usize {
        self.items.iter().take_while(|&&c| c == PADDING_CODE).count()
    }
}

/// One next-item prediction example.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingSample {
    pub history: PaddedSequence,
    pub next_item: u32,
}

// ── Builders ──────────────────────────────────────────────────────────────

/// Lay out a full history for a single inference call.
pub fn build_inference_window(
    history_items: &[u32],
    history_correct: &[bool],
    window_len: usize,
) -> Result<PaddedSequence> {
    KtError::check_len("history_correct", history_items.len(), history_correct.len())?;
    if window_len == 0 {
        return Err(KtError::InvalidConfig("window_len must be positive".into()));
    }
    if history_items.contains(&PADDING_CODE) {
        return Err(KtError::InvalidCode(PADDING_CODE));
    }
    Ok(window(history_items, history_correct, window_len))
}

/// Emit one sample per prefix of every learner's history.
///
/// A learner with `n >= 2` interactions yields `n - 1` samples; shorter
/// histories yield none. Learners are visited in key order.
pub fn build_training_samples(
    learners: &BTreeMap<String, LearnerHistory>,
    window_len: usize,
) -> Vec<TrainingSample> {
    let total: usize = learners.values().map(|h| h.len().saturating_sub(1)).sum();
    let mut samples = Vec::with_capacity(total);

    for history in learners.values() {
        for i in 1..history.len() {
            samples.push(TrainingSample {
                history: window(&history.items[..i], &history.correct[..i], window_len),
                next_item: history.items[i],
            });
        }
    }

    tracing::debug!(
        learners = learners.len(),
        samples = samples.len(),
        window_len,
        "Built training samples"
    );
    samples
}

/// Keep the most recent `window_len` entries, then left-pad with `(0, 0)`.
fn window(items: &[u32], correct: &[bool], window_len: usize) -> PaddedSequence {
    let start = items.len().saturating_sub(window_len);
    let kept = items.len() - start;
    let pad = window_len - kept;

    let mut out_items = Vec::with_capacity(window_len);
    out_items.resize(pad, PADDING_CODE);
    out_items.extend_from_slice(&items[start..]);

    let mut out_correct = Vec::with_capacity(window_len);
    out_correct.resize(pad, 0u8);
    out_correct.extend(correct[start..].iter().map(|&c| u8::from(c)));

    PaddedSequence {
        items: out_items,
        correct: out_correct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(steps: &[(u32, bool)]) -> LearnerHistory {
        let mut h = LearnerHistory::new();
        for &(code, correct) in steps {
            h.push(code, correct);
        }
        h
    }

    // ── build_inference_window ───────────────────────────────────────────

    #[test]
    fn short_history_is_left_padded() {
        let seq = build_inference_window(&[1, 2], &[true, false], 4).unwrap();
        assert_eq!(seq.items(), &[0, 0, 1, 2]);
        assert_eq!(seq.correct(), &[0, 0, 1, 0]);
        assert_eq!(seq.padding_len(), 2);
    }

    #[test]
    fn long_history_keeps_most_recent() {
        let items: Vec<u32> = (1..=7).collect();
        let correct: Vec<bool> = items.iter().map(|c| c % 2 == 0).collect();
        let seq = build_inference_window(&items, &correct, 3).unwrap();
        assert_eq!(seq.items(), &[5, 6, 7]);
        assert_eq!(seq.correct(), &[0, 1, 0]);
        assert_eq!(seq.padding_len(), 0);
    }

    #[test]
    fn exact_length_history_is_unchanged() {
        let seq = build_inference_window(&[3, 1, 2], &[true, true, false], 3).unwrap();
        assert_eq!(seq.items(), &[3, 1, 2]);
        assert_eq!(seq.correct(), &[1, 1, 0]);
    }

    #[test]
    fn empty_history_is_all_padding() {
        let seq = build_inference_window(&[], &[], 5).unwrap();
        assert_eq!(seq.items(), &[0; 5]);
        assert_eq!(seq.correct(), &[0; 5]);
        assert_eq!(seq.len(), 5);
    }

    #[test]
    fn mismatched_lengths_fail() {
        let err = build_inference_window(&[1, 2], &[true], 4).unwrap_err();
        assert!(matches!(err, KtError::ShapeMismatch { expected: 2, actual: 1, .. }));
    }

    #[test]
    fn padding_code_in_history_is_rejected() {
        let err = build_inference_window(&[1, 0], &[true, true], 4).unwrap_err();
        assert!(matches!(err, KtError::InvalidCode(0)));
    }

    #[test]
    fn zero_window_is_rejected() {
        assert!(build_inference_window(&[1], &[true], 0).is_err());
    }

    #[test]
    fn from_parts_checks_alignment() {
        assert!(PaddedSequence::from_parts(vec![0, 1], vec![0, 1]).is_ok());
        assert!(PaddedSequence::from_parts(vec![0, 1], vec![0]).is_err());
    }

    // ── build_training_samples ───────────────────────────────────────────

    #[test]
    fn one_sample_per_prefix() {
        let mut learners = BTreeMap::new();
        learners.insert("s1".to_string(), history(&[(1, true), (2, false), (3, true)]));
        let samples = build_training_samples(&learners, 4);

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].history.items(), &[0, 0, 0, 1]);
        assert_eq!(samples[0].history.correct(), &[0, 0, 0, 1]);
        assert_eq!(samples[0].next_item, 2);
        assert_eq!(samples[1].history.items(), &[0, 0, 1, 2]);
        assert_eq!(samples[1].history.correct(), &[0, 0, 1, 0]);
        assert_eq!(samples[1].next_item, 3);
    }

    #[test]
    fn single_interaction_learners_are_skipped() {
        let mut learners = BTreeMap::new();
        learners.insert("lonely".to_string(), history(&[(4, true)]));
        learners.insert("empty".to_string(), LearnerHistory::new());
        assert!(build_training_samples(&learners, 3).is_empty());
    }

    #[test]
    fn training_windows_truncate_like_inference() {
        let steps: Vec<(u32, bool)> = (1..=6).map(|c| (c, c % 3 == 0)).collect();
        let mut learners = BTreeMap::new();
        learners.insert("s".to_string(), history(&steps));
        let samples = build_training_samples(&learners, 2);

        assert_eq!(samples.len(), 5);
        let last = samples.last().unwrap();
        let h = &learners["s"];
        let expected = build_inference_window(&h.items()[..5], &h.correct()[..5], 2).unwrap();
        assert_eq!(last.history, expected);
        assert_eq!(last.history.items(), &[4, 5]);
        assert_eq!(last.next_item, 6);
    }

    #[test]
    fn learners_are_visited_in_key_order() {
        let mut learners = BTreeMap::new();
        learners.insert("b".to_string(), history(&[(7, true), (8, true)]));
        learners.insert("a".to_string(), history(&[(1, true), (2, true)]));
        let samples = build_training_samples(&learners, 2);
        assert_eq!(samples[0].next_item, 2);
        assert_eq!(samples[1].next_item, 8);
    }
}
