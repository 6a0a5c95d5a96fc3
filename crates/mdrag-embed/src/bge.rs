use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;

use mdrag_core::config::{expand_path, EmbeddingConfig};
use mdrag_core::error::{Error, Result};
use mdrag_core::traits::Embedder;

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_on_device;

pub(crate) fn candle_err(err: candle_core::Error) -> Error {
    Error::Embedding(err.to_string())
}

/// BGE-M3 (XLM-RoBERTa) sentence embeddings, masked mean pooling plus L2
/// normalization.
pub struct BgeEmbedder {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    max_len: usize,
    dim: usize,
}

impl BgeEmbedder {
    /// Load tokenizer, config and weights from the model directory.
    pub fn load(config: &EmbeddingConfig) -> Result<Self> {
        let device = select_device();
        let model_dir = resolve_model_dir(config.model_dir.as_deref())?;
        tracing::info!(dir = %model_dir.display(), "loading BGE-M3");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| Error::Embedding(format!("failed to load tokenizer from {}: {e}", tokenizer_path.display())))?;

        let config_path = model_dir.join("config.json");
        let raw = std::fs::read_to_string(&config_path).map_err(|e| Error::io(&config_path, e))?;
        let model_config: XLMRobertaConfig = serde_json::from_str(&raw)?;
        let dim = serde_json::from_str::<serde_json::Value>(&raw)?
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .map_or(config.dimension, |d| d as usize);
        if dim != config.dimension {
            return Err(Error::DimensionMismatch { expected: config.dimension, actual: dim });
        }

        let weights_path = model_dir.join("pytorch_model.bin");
        let weights: HashMap<String, Tensor> = candle_core::pickle::read_all(&weights_path).map_err(candle_err)?.into_iter().collect();
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = XLMRobertaModel::new(&model_config, vb).map_err(candle_err)?;
        tracing::info!(dim, "BGE-M3 loaded");

        Ok(Self { model, tokenizer, device, max_len: config.max_len, dim })
    }

    fn forward(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_on_device(&self.tokenizer, text, self.max_len, &self.device)?;
        let token_type_ids = Tensor::zeros((1, self.max_len), DType::I64, &self.device).map_err(candle_err)?;
        let hidden = self
            .model
            .forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)
            .map_err(candle_err)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let v: Vec<f32> = pooled
            .to_device(&Device::Cpu)
            .and_then(|t| t.squeeze(0))
            .and_then(|t| t.to_vec1())
            .map_err(candle_err)?;
        if v.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: v.len() });
        }
        let elapsed_ms = start.elapsed().as_millis();
        if elapsed_ms > 100 {
            tracing::debug!(elapsed_ms, "slow embedding");
        }
        Ok(v)
    }
}

impl Embedder for BgeEmbedder {
    fn name(&self) -> &str {
        "bge-m3"
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.forward(text)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.forward(t)).collect()
    }
}

/// Configured directory first, then `APP_MODEL_DIR` / `MODEL_DIR`, then the
/// conventional `models/bge-m3` locations.
fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    let candidates = configured
        .map(expand_path)
        .into_iter()
        .chain(["APP_MODEL_DIR", "MODEL_DIR"].into_iter().filter_map(|var| std::env::var(var).ok().map(PathBuf::from)))
        .chain([Path::new("../models/bge-m3").to_path_buf(), Path::new("models/bge-m3").to_path_buf()]);
    for dir in candidates {
        if dir.exists() {
            return Ok(dir);
        }
    }
    Err(Error::NotFound("BGE-M3 model directory".into()))
}
