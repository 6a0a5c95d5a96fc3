use crate::error::Result;
use crate::types::{ChunkId, IndexEntry, RankedCandidate};

/// Text → vector collaborator.
pub trait Embedder: Send + Sync {
    /// Stable provider/model name, used in logs.
    fn name(&self) -> &str;
    fn dimension(&self) -> usize;
    fn embed_text(&self, text: &str) -> Result<Vec<f32>>;
    /// Embed many texts. May return fewer vectors than inputs when a provider
    /// drops items; callers must only rely on the returned prefix.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// One slot per input; `None` marks an input the provider dropped.
    ///
    /// The default treats a short `embed_batch` answer as a lost suffix.
    /// Providers that can drop items in the middle override this.
    fn embed_batch_aligned(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        let mut out: Vec<Option<Vec<f32>>> = self.embed_batch(texts)?.into_iter().take(texts.len()).map(Some).collect();
        out.resize(texts.len(), None);
        Ok(out)
    }
}

/// Vector storage and similarity search collaborator.
pub trait VectorStore: Send + Sync {
    /// Insert entries, replacing any existing entry with the same id.
    fn add(&self, entries: &[IndexEntry]) -> Result<()>;
    /// Nearest entries to `query`, ascending distance, optionally restricted to
    /// one `source`.
    fn search(&self, query: &[f32], top_k: usize, source: Option<&str>) -> Result<Vec<RankedCandidate>>;
    /// Remove entries by id. Unknown ids are ignored.
    fn delete(&self, ids: &[ChunkId]) -> Result<()>;
    fn count(&self) -> Result<usize>;
    fn clear(&self) -> Result<()>;
    /// Flush state to durable storage. Stores that persist on write do nothing.
    fn persist(&self) -> Result<()> {
        Ok(())
    }
}

impl<T: Embedder + ?Sized> Embedder for Box<T> {
    fn name(&self) -> &str { (**self).name() }
    fn dimension(&self) -> usize { (**self).dimension() }
    fn embed_text(&self, text: &str) -> Result<Vec<f32>> { (**self).embed_text(text) }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> { (**self).embed_batch(texts) }
    fn embed_batch_aligned(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> { (**self).embed_batch_aligned(texts) }
}
