use std::collections::BTreeMap;

use super::NextItemModel;
use crate::error::Result;
use crate::recommend::top_k_codes;
use crate::sequence::{LearnerHistory, PaddedSequence};

/// Popularity baseline: every learner gets the globally most attempted items,
/// whatever their history.
pub struct MostFrequentBaseline {
    counts: Vec<f32>,
    window_len: usize,
}

impl MostFrequentBaseline {
    /// Count occurrences of each code across all learners.
    pub fn fit(learners: &BTreeMap<String, LearnerHistory>, num_codes: usize, window_len: usize) -> Self {
        let mut counts = vec![0.0f32; num_codes];
        for history in learners.values() {
            for &code in history.items() {
                if let Some(slot) = counts.get_mut(code as usize) {
                    *slot += 1.0;
                }
            }
        }
        Self { counts, window_len }
    }

    /// The `k` most frequent codes, ties broken by ascending code.
    pub fn top_items(&self, k: usize) -> Vec<u32> {
        top_k_codes(&self.counts, k)
    }
}

impl NextItemModel for MostFrequentBaseline {
    fn window_len(&self) -> usize {
        self.window_len
    }

    fn num_codes(&self) -> usize {
        self.counts.len()
    }

    fn logits(&self, batch: &[&PaddedSequence]) -> Result<Vec<Vec<f32>>> {
        Ok(batch.iter().map(|_| self.counts.clone()).collect())
    }
}
