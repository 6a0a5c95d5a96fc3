use mdrag_core::config::EmbeddingConfig;
use mdrag_core::error::Result;
use mdrag_core::traits::Embedder;
use mdrag_core::types::estimate_tokens;

/// Sent in place of empty input text.
pub const EMPTY_TEXT_PLACEHOLDER: &str = "No information";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_items: usize,
    /// Summed estimated tokens per request.
    pub max_batch_tokens: usize,
    /// Inputs estimated above this are skipped.
    pub max_item_tokens: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self { max_items: 5, max_batch_tokens: 1000, max_item_tokens: 5000 }
    }
}

impl From<&EmbeddingConfig> for BatchLimits {
    fn from(config: &EmbeddingConfig) -> Self {
        Self {
            max_items: config.max_batch_items.max(1),
            max_batch_tokens: config.max_batch_tokens,
            max_item_tokens: config.max_item_tokens,
        }
    }
}

/// Wraps a provider with request-size limits and failure isolation.
///
/// Inputs are grouped into requests bounded by item count and summed
/// estimated tokens. A failed request is retried one item at a time; items
/// that still fail, and items over the per-item ceiling, come back as `None`
/// from [`Embedder::embed_batch_aligned`] and are left out of `embed_batch`.
pub struct BatchingEmbedder<E> {
    inner: E,
    limits: BatchLimits,
}

impl<E: Embedder> BatchingEmbedder<E> {
    pub fn new(inner: E, limits: BatchLimits) -> Self {
        Self { inner, limits }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn limits(&self) -> BatchLimits {
        self.limits
    }

    fn flush(&self, batch: &[(usize, String)], out: &mut [Option<Vec<f32>>]) {
        let texts: Vec<String> = batch.iter().map(|(_, t)| t.clone()).collect();
        match self.inner.embed_batch(&texts) {
            Ok(vectors) if vectors.len() == batch.len() => {
                for ((slot, _), vector) in batch.iter().zip(vectors) {
                    out[*slot] = Some(vector);
                }
                return;
            }
            Ok(vectors) => tracing::warn!(
                sent = batch.len(),
                received = vectors.len(),
                "embedding batch came back short, retrying items individually"
            ),
            Err(err) => tracing::warn!(size = batch.len(), error = %err, "embedding batch failed, retrying items individually"),
        }
        for (slot, text) in batch {
            match self.inner.embed_text(text) {
                Ok(vector) => out[*slot] = Some(vector),
                Err(err) => tracing::warn!(item = *slot, error = %err, "skipping chunk that failed to embed"),
            }
        }
    }
}

fn non_empty(text: &str) -> &str {
    if text.is_empty() {
        EMPTY_TEXT_PLACEHOLDER
    } else {
        text
    }
}

impl<E: Embedder> Embedder for BatchingEmbedder<E> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.inner.embed_text(non_empty(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(self.embed_batch_aligned(texts)?.into_iter().flatten().collect())
    }

    fn embed_batch_aligned(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        let mut out: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut batch: Vec<(usize, String)> = Vec::new();
        let mut batch_tokens = 0usize;
        let mut skipped = 0usize;

        for (slot, text) in texts.iter().enumerate() {
            let text = non_empty(text);
            let tokens = estimate_tokens(text);
            if tokens > self.limits.max_item_tokens {
                tracing::warn!(item = slot, tokens, limit = self.limits.max_item_tokens, "skipping oversized chunk");
                skipped += 1;
                continue;
            }
            if !batch.is_empty()
                && (batch_tokens + tokens > self.limits.max_batch_tokens || batch.len() >= self.limits.max_items)
            {
                self.flush(&batch, &mut out);
                batch.clear();
                batch_tokens = 0;
            }
            batch.push((slot, text.to_string()));
            batch_tokens += tokens;
        }
        if !batch.is_empty() {
            self.flush(&batch, &mut out);
        }

        let missing = out.iter().filter(|v| v.is_none()).count();
        if missing > 0 {
            tracing::warn!(missing, skipped, total = texts.len(), provider = self.inner.name(), "some chunks were not embedded");
        }
        Ok(out)
    }
}
