use mdrag_core::error::{Error, Result};
use mdrag_core::traits::{Embedder, VectorStore};
use mdrag_core::types::{RankedCandidate, RetrievalType};

/// Query embedding plus vector-store search.
pub struct DenseRetriever<'a> {
    embedder: &'a dyn Embedder,
    store: &'a dyn VectorStore,
}

impl<'a> DenseRetriever<'a> {
    pub fn new(embedder: &'a dyn Embedder, store: &'a dyn VectorStore) -> Self {
        Self { embedder, store }
    }

    /// Up to `top_k` candidates by ascending distance, restricted to `source`
    /// when given.
    pub fn retrieve(&self, query: &str, top_k: usize, source: Option<&str>) -> Result<Vec<RankedCandidate>> {
        let vector = self.embedder.embed_text(query)?;
        if vector.len() != self.embedder.dimension() {
            return Err(Error::DimensionMismatch { expected: self.embedder.dimension(), actual: vector.len() });
        }
        let mut hits: Vec<RankedCandidate> = self
            .store
            .search(&vector, top_k, source)?
            .into_iter()
            .filter(|c| c.score.distance().is_some())
            .map(|mut c| {
                c.retrieval_type = RetrievalType::Dense;
                c
            })
            .collect();
        hits.sort_by(|a, b| {
            let (da, db) = (a.score.distance().unwrap_or(f32::MAX), b.score.distance().unwrap_or(f32::MAX));
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}
