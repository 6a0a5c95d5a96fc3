use std::path::Path;

use mdrag_core::config::{RetrievalConfig, RetrievalMode, MAX_RESULTS};
use mdrag_core::documents::source_name;
use mdrag_core::error::Result;
use mdrag_core::traits::{Embedder, VectorStore};
use mdrag_core::types::{QueryHit, RetrievalType};
use mdrag_text::Bm25Index;

use crate::dense::DenseRetriever;
use crate::fusion::reciprocal_rank_fusion;

/// Query options. Unset fields fall back to the retrieval configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRequest {
    pub text: String,
    /// Clamped to [`MAX_RESULTS`].
    pub top_k: Option<usize>,
    /// Minimum dense similarity (`1 - distance`).
    pub score_threshold: Option<f32>,
    /// Restrict results to one document; a path is reduced to its basename.
    pub document: Option<String>,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = Some(threshold);
        self
    }

    pub fn document(mut self, document: impl Into<String>) -> Self {
        self.document = Some(document.into());
        self
    }
}

/// Retrieval plus result capping and similarity filtering for one query.
pub struct QueryPipeline<'a> {
    config: &'a RetrievalConfig,
    dense: DenseRetriever<'a>,
    sparse: &'a Bm25Index,
}

impl<'a> QueryPipeline<'a> {
    pub fn new(config: &'a RetrievalConfig, embedder: &'a dyn Embedder, store: &'a dyn VectorStore, sparse: &'a Bm25Index) -> Self {
        Self { config, dense: DenseRetriever::new(embedder, store), sparse }
    }

    pub fn run(&self, request: &QueryRequest) -> Result<Vec<QueryHit>> {
        let top_k = request.top_k.unwrap_or(self.config.top_k).min(MAX_RESULTS);
        if top_k == 0 || request.text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let threshold = request.score_threshold.unwrap_or(self.config.score_threshold);
        let source = request.document.as_deref().map(|d| source_name(Path::new(d)));
        let source = source.as_deref();

        let hits = match self.config.mode {
            RetrievalMode::Dense => self
                .dense
                .retrieve(&request.text, top_k, source)?
                .into_iter()
                .filter_map(|c| {
                    let similarity = c.score.similarity()?;
                    (similarity >= threshold).then(|| QueryHit {
                        id: c.id,
                        text: c.text,
                        metadata: c.metadata,
                        score: similarity,
                        fused_score: None,
                        retrieval_type: RetrievalType::Dense,
                    })
                })
                .collect(),
            RetrievalMode::Hybrid => {
                let pool = top_k.saturating_mul(self.config.candidate_multiplier);
                let dense = self.dense.retrieve(&request.text, pool, source)?;
                let sparse = self.sparse.search(&request.text, pool, source);
                let fused = reciprocal_rank_fusion(&dense, &sparse, self.config.alpha, self.config.rrf_k, pool)?;
                tracing::debug!(dense = dense.len(), sparse = sparse.len(), fused = fused.len(), "hybrid candidates");
                fused
                    .into_iter()
                    .filter_map(|f| {
                        // sparse-only candidates carry no similarity and are dropped
                        let similarity = f.similarity()?;
                        (similarity >= threshold).then(|| QueryHit {
                            id: f.candidate.id,
                            text: f.candidate.text,
                            metadata: f.candidate.metadata,
                            score: similarity,
                            fused_score: Some(f.fused_score),
                            retrieval_type: RetrievalType::Hybrid,
                        })
                    })
                    .take(top_k)
                    .collect()
            }
        };
        Ok(hits)
    }
}
