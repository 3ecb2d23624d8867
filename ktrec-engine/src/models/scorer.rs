use candle_core::{Tensor, D};
use candle_nn::{Linear, Module, VarBuilder};

use crate::error::{KtError, Result};

/// Linear projection from a mastery state to one logit per item code.
///
/// Column 0 is the padding slot. It is scored like any other column;
/// excluding it from rankings is the caller's job.
pub struct NextItemScorer {
    fc: Linear,
    hidden_dim: usize,
    num_codes: usize,
}

impl NextItemScorer {
    pub fn new(hidden_dim: usize, num_codes: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        let fc = candle_nn::linear(hidden_dim, num_codes, vb)?;
        Ok(Self {
            fc,
            hidden_dim,
            num_codes,
        })
    }

    pub fn num_codes(&self) -> usize {
        self.num_codes
    }

    /// `(batch, hidden_dim)` -> `(batch, num_codes)`.
    pub fn score(&self, mastery: &Tensor) -> Result<Tensor> {
        let width = mastery.dim(D::Minus1)?;
        KtError::check_len("mastery", self.hidden_dim, width)?;
        Ok(self.fc.forward(mastery)?)
    }
}
