//! Domain types shared by the chunker, the sparse and dense indexes and the
//! retrieval engine.

use serde::{Deserialize, Serialize};

pub type ChunkId = String;

/// Number of leading characters used as the fusion key of a candidate that has
/// no id.
pub const FUSION_KEY_FALLBACK_CHARS: usize = 50;

/// Character length of `text` (not its byte length).
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Rough token estimate: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    char_len(text).div_ceil(4)
}

/// Conventional chunk id: `"{source}_{position}"`.
pub fn chunk_id(source: &str, position: usize) -> ChunkId {
    format!("{source}_{position}")
}

/// One markdown header in a chunk's ancestor chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub level: u8,
    pub text: String,
}

impl Header {
    pub fn new(level: u8, text: impl Into<String>) -> Self {
        Self { level, text: text.into() }
    }
}

/// Metadata stored next to every indexed chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    pub position: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_position: Option<usize>,
}

/// A bounded unit of document text, the unit that is indexed and retrieved.
///
/// - `headers`: ancestor headers, most specific last
/// - `position`: 0-based, gapless and ascending within one document
/// - `sub_position`: set when the chunk came out of splitting a larger section
/// - `source`: document identifier (file basename at ingest)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub headers: Vec<Header>,
    pub position: usize,
    pub sub_position: Option<usize>,
    pub source: String,
}

impl Chunk {
    pub fn id(&self) -> ChunkId {
        chunk_id(&self.source, self.position)
    }

    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.text)
    }

    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            source: self.source.clone(),
            headers: self.headers.clone(),
            position: self.position,
            sub_position: self.sub_position,
        }
    }
}

/// A chunk together with its embedding, as written to a vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: ChunkId,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl IndexEntry {
    pub fn from_chunk(chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self { id: chunk.id(), vector, text: chunk.text.clone(), metadata: chunk.metadata() }
    }
}

/// Indicates which retrieval path produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalType {
    Dense,
    Sparse,
    Hybrid,
}

/// Engine-specific score. Dense distances are lower-is-better, BM25 scores
/// higher-is-better.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Score {
    Distance(f32),
    Bm25(f32),
}

impl Score {
    pub fn distance(self) -> Option<f32> {
        match self {
            Self::Distance(d) => Some(d),
            Self::Bm25(_) => None,
        }
    }

    pub fn bm25(self) -> Option<f32> {
        match self {
            Self::Bm25(s) => Some(s),
            Self::Distance(_) => None,
        }
    }

    /// `1 - distance` for dense scores.
    pub fn similarity(self) -> Option<f32> {
        self.distance().map(|d| 1.0 - d)
    }
}

/// A ranked candidate from one retrieval path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub id: ChunkId,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: Score,
    pub retrieval_type: RetrievalType,
}

impl RankedCandidate {
    pub fn dense(id: ChunkId, text: String, metadata: ChunkMetadata, distance: f32) -> Self {
        Self { id, text, metadata, score: Score::Distance(distance), retrieval_type: RetrievalType::Dense }
    }

    pub fn sparse(id: ChunkId, text: String, metadata: ChunkMetadata, bm25: f32) -> Self {
        Self { id, text, metadata, score: Score::Bm25(bm25), retrieval_type: RetrievalType::Sparse }
    }

    /// Key used to merge candidates across lists: the id, or the first
    /// [`FUSION_KEY_FALLBACK_CHARS`] characters of the text when the id is empty.
    pub fn fusion_key(&self) -> String {
        if self.id.is_empty() {
            self.text.chars().take(FUSION_KEY_FALLBACK_CHARS).collect()
        } else {
            self.id.clone()
        }
    }
}

/// A candidate after reciprocal rank fusion. `fused_score` is only meaningful
/// for ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    pub candidate: RankedCandidate,
    pub fused_score: f64,
    pub distance: Option<f32>,
    pub bm25: Option<f32>,
}

impl FusedResult {
    pub fn similarity(&self) -> Option<f32> {
        self.distance.map(|d| 1.0 - d)
    }
}

/// One result returned to callers of `query`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    pub id: ChunkId,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Dense similarity, `1 - distance`.
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fused_score: Option<f64>,
    pub retrieval_type: RetrievalType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub ingested_count: usize,
    pub failed_count: usize,
    pub chunk_count: usize,
    pub failed_files: Vec<String>,
    pub document_ids: Vec<String>,
    /// Chunks lost because the embedder returned fewer vectors than requested.
    pub dropped_chunks: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    pub deleted_count: usize,
    pub deleted_ids: Vec<String>,
    pub not_found_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub query_count: u64,
    pub avg_query_time_ms: f64,
    pub last_query_time_ms: f64,
    pub meets_latency_target: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub total_chunks: usize,
    pub embedding_dimension: usize,
    pub performance: PerformanceStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        // counted in chars, not bytes
        assert_eq!(estimate_tokens("éééé"), 1);
    }

    #[test]
    fn fusion_key_falls_back_to_text_prefix() {
        let meta = ChunkMetadata { source: "a.md".into(), headers: vec![], position: 0, sub_position: None };
        let long = "x".repeat(80);
        let anon = RankedCandidate::dense(String::new(), long, meta.clone(), 0.1);
        assert_eq!(anon.fusion_key().chars().count(), FUSION_KEY_FALLBACK_CHARS);

        let named = RankedCandidate::sparse("a.md_0".into(), "text".into(), meta, 1.0);
        assert_eq!(named.fusion_key(), "a.md_0");
    }

    #[test]
    fn similarity_only_for_distances() {
        assert_eq!(Score::Distance(0.25).similarity(), Some(0.75));
        assert_eq!(Score::Bm25(3.0).similarity(), None);
    }
}
