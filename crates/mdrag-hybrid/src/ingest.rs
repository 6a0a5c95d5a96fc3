//! Document ingestion in two stages.
//!
//! The prepare stage (read, chunk, embed) runs per document on a bounded
//! rayon pool and never touches shared state. The commit stage writes one
//! prepared document at a time, in input order, while the caller holds the
//! engine's write lock.
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use mdrag_core::chunker::Chunker;
use mdrag_core::documents::{read_document, source_name};
use mdrag_core::error::{Error, Result};
use mdrag_core::traits::{Embedder, VectorStore};
use mdrag_core::types::{Chunk, ChunkId, IndexEntry};
use mdrag_text::Bm25Index;

use crate::registry::SourceRegistry;

/// A chunked and embedded document, ready to be written.
#[derive(Debug)]
pub struct PreparedDocument {
    pub source: String,
    pub chunks: Vec<Chunk>,
    /// One slot per chunk; `None` where the embedder dropped the chunk.
    pub vectors: Vec<Option<Vec<f32>>>,
}

impl PreparedDocument {
    pub fn dropped(&self) -> usize {
        self.vectors.iter().filter(|v| v.is_none()).count()
    }
}

/// What a successful commit wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOutcome {
    pub chunks: usize,
    pub dropped: usize,
    /// Chunk ids of an earlier ingest of the same source that were removed.
    pub replaced: usize,
}

/// Chunk and embed raw text under `source`.
pub fn prepare_text(chunker: &Chunker, embedder: &dyn Embedder, text: &str, source: &str) -> Result<PreparedDocument> {
    let chunks = chunker.chunk(text, source);
    if chunks.is_empty() {
        return Err(Error::EmptyDocument(source.to_string()));
    }
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let mut vectors = embedder.embed_batch_aligned(&texts)?;
    vectors.resize(chunks.len(), None);
    Ok(PreparedDocument { source: source.to_string(), chunks, vectors })
}

pub fn prepare_file(chunker: &Chunker, embedder: &dyn Embedder, path: &Path) -> Result<PreparedDocument> {
    if !path.is_file() {
        return Err(Error::NotFound(path.display().to_string()));
    }
    let text = read_document(path)?;
    prepare_text(chunker, embedder, &text, &source_name(path))
}

/// Prepare every path on a pool of `workers` threads. Results come back in
/// input order.
pub fn prepare_files(
    chunker: &Chunker,
    embedder: &dyn Embedder,
    paths: &[PathBuf],
    workers: usize,
    progress: &ProgressBar,
) -> Vec<Result<PreparedDocument>> {
    let run = || -> Vec<Result<PreparedDocument>> {
        paths
            .par_iter()
            .map(|path| {
                let prepared = prepare_file(chunker, embedder, path);
                progress.inc(1);
                prepared
            })
            .collect()
    };
    match rayon::ThreadPoolBuilder::new().num_threads(workers.max(1)).build() {
        Ok(pool) => pool.install(run),
        Err(err) => {
            tracing::warn!(error = %err, "could not build ingest pool, using the global pool");
            run()
        }
    }
}

/// Write a prepared document to the vector store and sparse index and
/// record its chunk ids. Chunks left over from an earlier ingest of the same
/// source are removed afterwards. If a store write fails the registry still
/// lists every id that may have reached the store.
pub fn commit(
    doc: PreparedDocument,
    store: &dyn VectorStore,
    sparse: &mut Bm25Index,
    registry: &mut SourceRegistry,
    dimension: usize,
) -> Result<CommitOutcome> {
    let dropped = doc.dropped();
    let kept: Vec<(Chunk, Vec<f32>)> =
        doc.chunks.into_iter().zip(doc.vectors).filter_map(|(chunk, vector)| Some((chunk, vector?))).collect();
    if kept.is_empty() {
        return Err(Error::Embedding(format!("no chunk of {} could be embedded", doc.source)));
    }
    if dropped > 0 {
        tracing::warn!(source = %doc.source, dropped, "indexing without chunks the embedder dropped");
    }
    if let Some((_, bad)) = kept.iter().find(|(_, v)| v.len() != dimension) {
        return Err(Error::DimensionMismatch { expected: dimension, actual: bad.len() });
    }

    let entries: Vec<IndexEntry> = kept.iter().map(|(chunk, vector)| IndexEntry::from_chunk(chunk, vector.clone())).collect();
    let ids: Vec<ChunkId> = entries.iter().map(|e| e.id.clone()).collect();
    let current: HashSet<&str> = ids.iter().map(String::as_str).collect();
    let stale: Vec<ChunkId> = registry
        .get(&doc.source)
        .unwrap_or_default()
        .iter()
        .filter(|id| !current.contains(id.as_str()))
        .cloned()
        .collect();

    // Until the stale chunks are gone the store may hold both versions, so
    // the registry must cover both for a later delete to reach every row.
    registry.insert(doc.source.clone(), ids.iter().chain(&stale).cloned().collect());
    store.add(&entries)?;
    if !stale.is_empty() {
        store.delete(&stale)?;
        sparse.remove(&stale);
    }
    sparse.add_batch(entries.into_iter().map(|e| (e.id, e.text, e.metadata)));
    registry.insert(doc.source.clone(), ids);

    tracing::debug!(source = %doc.source, chunks = kept.len(), dropped, replaced = stale.len(), "document committed");
    Ok(CommitOutcome { chunks: kept.len(), dropped, replaced: stale.len() })
}

/// A bar for `len` documents, hidden unless `visible`.
pub fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents ({percent}%) {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}
