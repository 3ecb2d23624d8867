//! Single-layer GRU using the PyTorch gate layout `[reset | update | new]`:
//!
//!   r  = σ(W_ir x + b_ir + W_hr h + b_hr)
//!   z  = σ(W_iz x + b_iz + W_hz h + b_hz)
//!   n  = tanh(W_in x + b_in + r ⊙ (W_hn h + b_hn))
//!   h' = (1 − z) ⊙ n + z ⊙ h

use candle_core::{DType, IndexOp, Result, Tensor, D};
use candle_nn::{Init, Linear, Module, VarBuilder};

pub struct Gru {
    input_proj: Linear,
    hidden_proj: Linear,
    hidden_dim: usize,
}

impl Gru {
    /// Parameters are read as `weight_ih_l0`, `weight_hh_l0`, `bias_ih_l0`,
    /// `bias_hh_l0` under `vb`. Fresh variables use U(−1/√h, 1/√h).
    pub fn new(in_dim: usize, hidden_dim: usize, vb: VarBuilder) -> Result<Self> {
        let bound = 1.0 / (hidden_dim as f64).sqrt();
        let init = Init::Uniform {
            lo: -bound,
            up: bound,
        };
        let gates = 3 * hidden_dim;

        let w_ih = vb.get_with_hints((gates, in_dim), "weight_ih_l0", init)?;
        let w_hh = vb.get_with_hints((gates, hidden_dim), "weight_hh_l0", init)?;
        let b_ih = vb.get_with_hints(gates, "bias_ih_l0", init)?;
        let b_hh = vb.get_with_hints(gates, "bias_hh_l0", init)?;

        Ok(Self {
            input_proj: Linear::new(w_ih, Some(b_ih)),
            hidden_proj: Linear::new(w_hh, Some(b_hh)),
            hidden_dim,
        })
    }

    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    /// One recurrence step. `x_proj` is the already-projected input
    /// `(batch, 3h)`; `h` is `(batch, h)`.
    fn step(&self, x_proj: &Tensor, h: &Tensor) -> Result<Tensor> {
        let h_proj = self.hidden_proj.forward(h)?;
        let xs = x_proj.chunk(3, D::Minus1)?;
        let hs = h_proj.chunk(3, D::Minus1)?;

        let r = candle_nn::ops::sigmoid(&xs[0].add(&hs[0])?)?;
        let z = candle_nn::ops::sigmoid(&xs[1].add(&hs[1])?)?;
        let n = xs[2].add(&r.mul(&hs[2])?)?.tanh()?;

        // h' = n + z ⊙ (h − n)
        n.add(&z.mul(&h.sub(&n)?)?)
    }

    /// Run over `(batch, seq_len, in_dim)` left to right from a zero state
    /// and return only the state after the last position, `(batch, h)`.
    pub fn final_state(&self, xs: &Tensor) -> Result<Tensor> {
        let (batch, seq_len, _) = xs.dims3()?;
        // Input projections do not depend on the state; do them in one matmul.
        let x_proj = self.input_proj.forward(xs)?;

        let mut h = Tensor::zeros((batch, self.hidden_dim), DType::F32, xs.device())?;
        for t in 0..seq_len {
            let x_t = x_proj.i((.., t, ..))?.contiguous()?;
            h = self.step(&x_t, &h)?;
        }
        Ok(h)
    }
}
