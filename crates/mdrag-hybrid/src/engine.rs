use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use mdrag_core::chunker::Chunker;
use mdrag_core::config::Settings;
use mdrag_core::documents::{collect_markdown_files, source_name};
use mdrag_core::error::{Error, Result};
use mdrag_core::traits::{Embedder, VectorStore};
use mdrag_core::types::{DeleteReport, EngineStats, IngestReport, QueryHit};
use mdrag_embed::build_embedder;
use mdrag_text::{Bm25Index, Bm25Params};
use mdrag_vector::build_vector_store;

use crate::delete::delete_sources;
use crate::ingest::{commit, prepare_files, prepare_text, progress_bar, CommitOutcome};
use crate::metrics::QueryMetrics;
use crate::query::{QueryPipeline, QueryRequest};
use crate::registry::SourceRegistry;

/// File name of the sparse index and source registry snapshot under the
/// data directory.
pub const INDEX_SNAPSHOT: &str = "index.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexState {
    sparse: Bm25Index,
    registry: SourceRegistry,
}

/// Entry point for ingesting, querying and deleting markdown documents.
///
/// Writes (ingest, delete, clear) take the state lock exclusively; queries
/// share it. The vector store is only written under that same lock.
pub struct RetrievalEngine {
    settings: Settings,
    chunker: Chunker,
    embedder: Box<dyn Embedder>,
    store: Box<dyn VectorStore>,
    state: RwLock<IndexState>,
    metrics: Mutex<QueryMetrics>,
    snapshot_path: Option<PathBuf>,
    show_progress: bool,
}

impl RetrievalEngine {
    /// Engine over explicit collaborators, with nothing persisted by
    /// [`persist`](Self::persist) apart from the store's own state.
    pub fn new(settings: Settings, embedder: Box<dyn Embedder>, store: Box<dyn VectorStore>) -> Result<Self> {
        settings.validate()?;
        let chunker = Chunker::new(settings.chunking.clone())?;
        let params = Bm25Params { k1: settings.retrieval.k1, b: settings.retrieval.b };
        Ok(Self {
            settings,
            chunker,
            embedder,
            store,
            state: RwLock::new(IndexState { sparse: Bm25Index::new(params), registry: SourceRegistry::default() }),
            metrics: Mutex::new(QueryMetrics::default()),
            snapshot_path: None,
            show_progress: false,
        })
    }

    /// Build the configured embedder and store under `settings.data_dir` and
    /// load the index snapshot left by a previous run.
    pub fn open(settings: Settings) -> Result<Self> {
        let data_dir = settings.data_path();
        fs::create_dir_all(&data_dir).map_err(|e| Error::io(&data_dir, e))?;
        let embedder = build_embedder(&settings.embedding)?;
        let store = build_vector_store(&settings.vector_store, embedder.dimension(), &data_dir)?;
        let mut engine = Self::new(settings, embedder, store)?;

        let snapshot_path = data_dir.join(INDEX_SNAPSHOT);
        if snapshot_path.exists() {
            let state = load_state(&snapshot_path)?;
            let configured = Bm25Params { k1: engine.settings.retrieval.k1, b: engine.settings.retrieval.b };
            if state.sparse.params() != configured {
                tracing::warn!(stored = ?state.sparse.params(), ?configured, "index snapshot uses different BM25 parameters");
            }
            tracing::info!(sources = state.registry.len(), chunks = state.sparse.count(), "loaded index snapshot");
            engine.state = RwLock::new(state);
        }
        engine.snapshot_path = Some(snapshot_path);
        Ok(engine)
    }

    /// Show a progress bar on stderr during `ingest`.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Ingest files and directories (walked for markdown). One failing file
    /// never stops the batch; it is listed in `failed_files`.
    ///
    /// Documents are keyed by basename, so a file whose basename was already
    /// ingested earlier in the same batch is rejected rather than replacing it.
    pub fn ingest(&self, paths: &[PathBuf]) -> IngestReport {
        let start = Instant::now();
        let files = collect_markdown_files(paths);
        let progress = progress_bar(files.len(), self.show_progress);
        let prepared = prepare_files(&self.chunker, &*self.embedder, &files, self.settings.ingestion.workers, &progress);
        progress.finish_and_clear();

        let mut report = IngestReport::default();
        let mut state = self.state.write();
        let IndexState { sparse, registry } = &mut *state;
        let mut claimed: HashMap<String, &PathBuf> = HashMap::new();
        for (path, doc) in files.iter().zip(prepared) {
            let name = source_name(path);
            let outcome = match claimed.get(&name) {
                Some(first) => Err(Error::DuplicateSource { name: name.clone(), first: first.to_path_buf() }),
                None => doc.and_then(|doc| commit(doc, &*self.store, sparse, registry, self.embedder.dimension())),
            };
            if outcome.is_ok() {
                claimed.insert(name.clone(), path);
            }
            record(&mut report, &path.display().to_string(), &name, outcome);
        }
        drop(state);

        tracing::info!(
            ingested = report.ingested_count,
            failed = report.failed_count,
            chunks = report.chunk_count,
            dropped = report.dropped_chunks,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "ingest finished"
        );
        report
    }

    /// Ingest raw text as the document `source`, replacing an earlier
    /// document of that name.
    pub fn ingest_text(&self, text: &str, source: &str) -> IngestReport {
        let mut report = IngestReport::default();
        let prepared = prepare_text(&self.chunker, &*self.embedder, text, source);
        let mut state = self.state.write();
        let IndexState { sparse, registry } = &mut *state;
        let outcome = prepared.and_then(|doc| commit(doc, &*self.store, sparse, registry, self.embedder.dimension()));
        record(&mut report, source, source, outcome);
        report
    }

    pub fn query(&self, request: &QueryRequest) -> Result<Vec<QueryHit>> {
        let start = Instant::now();
        let hits = {
            let state = self.state.read();
            let pipeline = QueryPipeline::new(&self.settings.retrieval, &*self.embedder, &*self.store, &state.sparse);
            pipeline.run(request)
        };
        let elapsed = start.elapsed();
        self.metrics.lock().record(elapsed);
        let hits = hits?;
        tracing::debug!(hits = hits.len(), elapsed_ms = elapsed.as_millis() as u64, mode = ?self.settings.retrieval.mode, "query");
        Ok(hits)
    }

    /// Delete every chunk of the named documents (paths or basenames).
    pub fn delete(&self, identifiers: &[String]) -> Result<DeleteReport> {
        let mut state = self.state.write();
        let IndexState { sparse, registry } = &mut *state;
        delete_sources(identifiers, &*self.store, sparse, registry)
    }

    pub fn stats(&self) -> Result<EngineStats> {
        Ok(EngineStats {
            total_chunks: self.store.count()?,
            embedding_dimension: self.embedder.dimension(),
            performance: self.metrics.lock().snapshot(self.settings.retrieval.latency_target_ms),
        })
    }

    /// Drop every indexed chunk and reset the query metrics.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.state.write();
        self.store.clear()?;
        state.sparse.clear();
        state.registry.clear();
        self.metrics.lock().reset();
        tracing::info!("index cleared");
        Ok(())
    }

    /// Flush the vector store and write the index snapshot.
    pub fn persist(&self) -> Result<()> {
        let state = self.state.read();
        self.store.persist()?;
        if let Some(path) = &self.snapshot_path {
            write_state(path, &state)?;
            tracing::debug!(path = %path.display(), "index snapshot written");
        }
        Ok(())
    }

    /// Names of the indexed documents, sorted.
    pub fn sources(&self) -> Vec<String> {
        self.state.read().registry.sources().map(str::to_string).collect()
    }
}

fn record(report: &mut IngestReport, label: &str, source: &str, outcome: Result<CommitOutcome>) {
    match outcome {
        Ok(outcome) => {
            report.ingested_count += 1;
            report.chunk_count += outcome.chunks;
            report.dropped_chunks += outcome.dropped;
            report.document_ids.push(source.to_string());
        }
        Err(err) => {
            tracing::warn!(document = label, error = %err, "document not ingested");
            report.failed_count += 1;
            report.failed_files.push(format!("{label}: {err}"));
        }
    }
}

fn load_state(path: &Path) -> Result<IndexState> {
    let raw = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_state(path: &Path, state: &IndexState) -> Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let json = serde_json::to_vec(state)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    tmp.write_all(&json).map_err(|e| Error::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}
