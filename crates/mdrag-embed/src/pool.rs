use candle_core::{DType, Tensor};

use mdrag_core::error::{Error, Result};

use crate::bge::candle_err;

/// Mean of the unmasked token states, L2-normalized. `hidden` is `[B, T, H]`,
/// `attention_mask` is `[B, T]`; the result is `[B, H]`.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let dims = hidden.dims();
    if dims.len() != 3 {
        return Err(Error::Embedding(format!("hidden state must be [B,T,H], got {dims:?}")));
    }
    let hidden_dim = dims[2];

    let mask = attention_mask.to_device(hidden.device()).and_then(|m| m.to_dtype(hidden.dtype())).map_err(candle_err)?;
    let mask_3d = mask.unsqueeze(2).map_err(candle_err)?;
    let mask_broadcast = match mask_3d.broadcast_as(hidden.shape()) {
        Ok(m) => m,
        Err(_) => mask_3d.repeat((1, 1, hidden_dim)).map_err(candle_err)?,
    };
    let sum = (hidden * &mask_broadcast).and_then(|m| m.sum(1)).map_err(candle_err)?;
    let lengths = mask
        .sum(1)
        .and_then(|l| l.unsqueeze(1))
        .and_then(|l| l.to_dtype(sum.dtype()))
        .map_err(candle_err)?;
    let mean = sum.broadcast_div(&lengths).map_err(candle_err)?;

    let eps_val = match hidden.dtype() {
        DType::F16 => 1e-6f32,
        _ => 1e-12f32,
    };
    let eps = Tensor::new(&[eps_val], hidden.device())
        .and_then(|e| e.to_dtype(hidden.dtype()))
        .and_then(|e| e.unsqueeze(0))
        .map_err(candle_err)?;
    let norm = mean
        .sqr()
        .and_then(|s| s.sum_keepdim(1))
        .and_then(|s| s.sqrt())
        .and_then(|n| n.broadcast_add(&eps))
        .map_err(candle_err)?;
    mean.broadcast_div(&norm).map_err(candle_err)
}
