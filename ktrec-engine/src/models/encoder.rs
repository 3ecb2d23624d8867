//! Knowledge-tracing encoder: item embedding + correctness flag per step,
//! run through a GRU; the state after the final position is the learner's
//! mastery vector.

use candle_core::{Device, Tensor, D};
use candle_nn::{Dropout, Embedding, Module, VarBuilder};

use super::gru::Gru;
use super::{Mode, ModelConfig};
use crate::error::{KtError, Result};
use crate::index::PADDING_CODE;
use crate::sequence::PaddedSequence;

pub struct KtEncoder {
    item_emb: Embedding,
    gru: Gru,
    dropout: Dropout,
    window_len: usize,
    num_codes: usize,
    device: Device,
}

impl KtEncoder {
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let item_emb = candle_nn::embedding(config.num_codes(), config.embed_dim, vb.pp("item_emb"))?;
        let gru = Gru::new(config.step_dim(), config.hidden_dim, vb.pp("gru"))?;
        Ok(Self {
            item_emb,
            gru,
            dropout: Dropout::new(config.dropout),
            window_len: config.window_len,
            num_codes: config.num_codes(),
            device: vb.device().clone(),
        })
    }

    pub fn hidden_dim(&self) -> usize {
        self.gru.hidden_dim()
    }

    /// Encode a batch of windows into mastery states `(batch, hidden_dim)`.
    ///
    /// Dropout is applied only in [`Mode::Training`].
    pub fn encode(&self, batch: &[&PaddedSequence], mode: Mode) -> Result<Tensor> {
        let (ids, correct, mask) = self.flatten(batch)?;
        let shape = (batch.len(), self.window_len);

        let ids = Tensor::from_vec(ids, shape, &self.device)?;
        let correct = Tensor::from_vec(correct, shape, &self.device)?.unsqueeze(D::Minus1)?;
        let mask = Tensor::from_vec(mask, shape, &self.device)?.unsqueeze(D::Minus1)?;

        // Padding positions contribute an exact zero vector whatever row 0 holds.
        let emb = self.item_emb.forward(&ids)?.broadcast_mul(&mask)?;
        let steps = Tensor::cat(&[&emb, &correct], D::Minus1)?;

        let mastery = self.gru.final_state(&steps)?;
        Ok(self.dropout.forward(&mastery, mode.is_training())?)
    }

    /// Validate every window and lay the batch out row-major.
    fn flatten(&self, batch: &[&PaddedSequence]) -> Result<(Vec<u32>, Vec<f32>, Vec<f32>)> {
        let cells = batch.len() * self.window_len;
        let mut ids = Vec::with_capacity(cells);
        let mut correct = Vec::with_capacity(cells);
        let mut mask = Vec::with_capacity(cells);

        for seq in batch {
            KtError::check_len("history_items", self.window_len, seq.items().len())?;
            KtError::check_len("history_correct", self.window_len, seq.correct().len())?;

            for (&code, &flag) in seq.items().iter().zip(seq.correct()) {
                if code as usize >= self.num_codes {
                    return Err(KtError::InvalidCode(code));
                }
                ids.push(code);
                correct.push(f32::from(flag));
                mask.push(if code == PADDING_CODE { 0.0 } else { 1.0 });
            }
        }
        Ok((ids, correct, mask))
    }
}
