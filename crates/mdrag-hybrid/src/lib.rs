//! mdrag-hybrid
//!
//! The retrieval engine: ingestion, dense and hybrid (dense + BM25 fused by
//! reciprocal rank) querying, per-source deletion and snapshots.
pub mod delete;
pub mod dense;
pub mod engine;
pub mod fusion;
pub mod ingest;
pub mod metrics;
pub mod query;
pub mod registry;

pub use engine::RetrievalEngine;
pub use fusion::reciprocal_rank_fusion;
pub use query::QueryRequest;
pub use registry::SourceRegistry;
