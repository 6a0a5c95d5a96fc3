//! mdrag-text
//!
//! In-memory BM25 keyword index over chunk text. The index is serde
//! serializable so the engine can snapshot it next to the vector store.
pub mod bm25;
pub mod tokenize;

pub use bm25::{Bm25Index, Bm25Params};
pub use tokenize::tokenize;
