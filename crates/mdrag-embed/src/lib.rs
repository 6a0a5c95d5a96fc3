//! mdrag-embed
//!
//! Embedding providers behind `mdrag_core::traits::Embedder`: a deterministic
//! feature-hashing embedder that needs no model files, BGE-M3 through candle
//! (feature `candle`), and a batching wrapper that enforces provider limits.
pub mod batching;
pub mod hash;

#[cfg(feature = "candle")]
pub mod bge;
#[cfg(feature = "candle")]
pub mod device;
#[cfg(feature = "candle")]
pub mod pool;
#[cfg(feature = "candle")]
pub mod tokenize;

pub use batching::{BatchLimits, BatchingEmbedder, EMPTY_TEXT_PLACEHOLDER};
pub use hash::HashEmbedder;
#[cfg(feature = "candle")]
pub use pool::masked_mean_l2;

use mdrag_core::config::{EmbeddingConfig, EmbeddingProvider};
use mdrag_core::error::Result;
use mdrag_core::traits::Embedder;

/// Build the configured provider wrapped in [`BatchingEmbedder`].
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    let limits = BatchLimits::from(config);
    match config.provider {
        EmbeddingProvider::Hash => {
            tracing::info!(dimension = config.dimension, "using hash embedder");
            Ok(Box::new(BatchingEmbedder::new(HashEmbedder::new(config.dimension), limits)))
        }
        EmbeddingProvider::Bge => bge_embedder(config, limits),
    }
}

#[cfg(feature = "candle")]
fn bge_embedder(config: &EmbeddingConfig, limits: BatchLimits) -> Result<Box<dyn Embedder>> {
    let model = bge::BgeEmbedder::load(config)?;
    Ok(Box::new(BatchingEmbedder::new(model, limits)))
}

#[cfg(not(feature = "candle"))]
fn bge_embedder(_config: &EmbeddingConfig, _limits: BatchLimits) -> Result<Box<dyn Embedder>> {
    Err(mdrag_core::Error::InvalidConfig("embedding.provider = \"bge\" requires the `candle` feature".into()))
}
