use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use mdrag_core::config::DistanceMetric;
use mdrag_core::error::{Error, Result};
use mdrag_core::traits::VectorStore;
use mdrag_core::types::{ChunkId, IndexEntry, RankedCandidate};

use crate::distance::distance;

#[derive(Default)]
struct Entries {
    rows: Vec<IndexEntry>,
    positions: HashMap<ChunkId, usize>,
}

impl Entries {
    fn from_rows(rows: Vec<IndexEntry>) -> Self {
        let mut entries = Self::default();
        for row in rows {
            entries.upsert(row);
        }
        entries
    }

    fn upsert(&mut self, entry: IndexEntry) {
        match self.positions.get(&entry.id) {
            Some(&pos) => self.rows[pos] = entry,
            None => {
                self.positions.insert(entry.id.clone(), self.rows.len());
                self.rows.push(entry);
            }
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    metric: DistanceMetric,
    dimension: usize,
    entries: Vec<IndexEntry>,
}

/// Exhaustive nearest-neighbour search over entries held in memory.
///
/// When opened with a snapshot path, `persist` writes the entries there as
/// JSON (via a temp file and rename) and `open` reloads them.
pub struct MemoryVectorStore {
    metric: DistanceMetric,
    dimension: usize,
    snapshot_path: Option<PathBuf>,
    entries: RwLock<Entries>,
}

impl MemoryVectorStore {
    pub fn new(metric: DistanceMetric, dimension: usize) -> Self {
        Self { metric, dimension, snapshot_path: None, entries: RwLock::new(Entries::default()) }
    }

    /// Load the snapshot at `path` if it exists, otherwise start empty.
    pub fn open(path: impl Into<PathBuf>, metric: DistanceMetric, dimension: usize) -> Result<Self> {
        let path = path.into();
        let mut store = Self::new(metric, dimension);
        if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
            let snapshot: Snapshot = serde_json::from_str(&raw)?;
            if snapshot.dimension != dimension {
                return Err(Error::DimensionMismatch { expected: dimension, actual: snapshot.dimension });
            }
            if snapshot.metric != metric {
                tracing::warn!(stored = ?snapshot.metric, configured = ?metric, "snapshot metric differs from configuration");
            }
            tracing::info!(path = %path.display(), entries = snapshot.entries.len(), "loaded vector snapshot");
            store.entries = RwLock::new(Entries::from_rows(snapshot.entries));
        }
        store.snapshot_path = Some(path);
        Ok(store)
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    fn write_snapshot(&self, path: &Path) -> Result<()> {
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        let json = {
            let entries = self.entries.read();
            serde_json::to_vec(&SnapshotRef { metric: self.metric, dimension: self.dimension, entries: &entries.rows })?
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
        tmp.write_all(&json).map_err(|e| Error::io(tmp.path(), e))?;
        tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
        Ok(())
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    metric: DistanceMetric,
    dimension: usize,
    entries: &'a [IndexEntry],
}

impl VectorStore for MemoryVectorStore {
    fn add(&self, entries: &[IndexEntry]) -> Result<()> {
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != self.dimension) {
            return Err(Error::DimensionMismatch { expected: self.dimension, actual: bad.vector.len() });
        }
        let mut guard = self.entries.write();
        for entry in entries {
            guard.upsert(entry.clone());
        }
        Ok(())
    }

    fn search(&self, query: &[f32], top_k: usize, source: Option<&str>) -> Result<Vec<RankedCandidate>> {
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch { expected: self.dimension, actual: query.len() });
        }
        let guard = self.entries.read();
        let mut scored: Vec<(usize, f32)> = guard
            .rows
            .iter()
            .enumerate()
            .filter(|(_, e)| source.map_or(true, |s| e.metadata.source == s))
            .map(|(i, e)| (i, distance(self.metric, query, &e.vector)))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        let hits = scored
            .into_iter()
            .map(|(i, d)| {
                let e = &guard.rows[i];
                RankedCandidate::dense(e.id.clone(), e.text.clone(), e.metadata.clone(), d)
            })
            .collect();
        Ok(hits)
    }

    fn delete(&self, ids: &[ChunkId]) -> Result<()> {
        let doomed: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut guard = self.entries.write();
        let before = guard.rows.len();
        guard.rows.retain(|e| !doomed.contains(e.id.as_str()));
        if guard.rows.len() != before {
            let rows = std::mem::take(&mut guard.rows);
            *guard = Entries::from_rows(rows);
        }
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.entries.read().rows.len())
    }

    fn clear(&self) -> Result<()> {
        *self.entries.write() = Entries::default();
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        match &self.snapshot_path {
            Some(path) => self.write_snapshot(path),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdrag_core::types::ChunkMetadata;

    fn entry(source: &str, position: usize, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            id: format!("{source}_{position}"),
            vector,
            text: format!("{source} chunk {position}"),
            metadata: ChunkMetadata { source: source.into(), headers: vec![], position, sub_position: None },
        }
    }

    #[test]
    fn search_orders_by_ascending_distance() {
        let store = MemoryVectorStore::new(DistanceMetric::Cosine, 2);
        store
            .add(&[entry("a.md", 0, vec![0.0, 1.0]), entry("a.md", 1, vec![1.0, 0.0]), entry("b.md", 0, vec![0.7, 0.7])])
            .unwrap();
        let hits = store.search(&[1.0, 0.0], 3, None).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a.md_1", "b.md_0", "a.md_0"]);
        assert!(hits[0].score.distance().is_some_and(|d| d.abs() < 1e-6));
    }

    #[test]
    fn source_filter_and_upsert() {
        let store = MemoryVectorStore::new(DistanceMetric::L2, 2);
        store.add(&[entry("a.md", 0, vec![0.0, 1.0]), entry("b.md", 0, vec![1.0, 0.0])]).unwrap();
        store.add(&[entry("a.md", 0, vec![1.0, 0.0])]).unwrap();
        assert_eq!(store.count().unwrap(), 2);
        let hits = store.search(&[1.0, 0.0], 5, Some("a.md")).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].score.distance().is_some_and(|d| d.abs() < 1e-6));
    }

    #[test]
    fn rejects_wrong_dimension() {
        let store = MemoryVectorStore::new(DistanceMetric::Cosine, 3);
        assert!(matches!(store.add(&[entry("a.md", 0, vec![1.0])]), Err(Error::DimensionMismatch { expected: 3, actual: 1 })));
        assert!(store.search(&[1.0, 0.0], 1, None).is_err());
    }

    #[test]
    fn delete_ignores_unknown_ids() {
        let store = MemoryVectorStore::new(DistanceMetric::Cosine, 2);
        store.add(&[entry("a.md", 0, vec![0.0, 1.0]), entry("a.md", 1, vec![1.0, 0.0])]).unwrap();
        store.delete(&["a.md_0".to_string(), "nope".to_string()]).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        store.add(&[entry("a.md", 1, vec![0.5, 0.5])]).unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn deleting_a_large_source_keeps_the_rest() {
        let store = MemoryVectorStore::new(DistanceMetric::Cosine, 2);
        let big: Vec<IndexEntry> = (0..5000).map(|p| entry("big.md", p, vec![1.0, p as f32])).collect();
        store.add(&big).unwrap();
        store.add(&[entry("keep.md", 0, vec![0.0, 1.0])]).unwrap();

        let ids: Vec<ChunkId> = big.iter().map(|e| e.id.clone()).collect();
        store.delete(&ids).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        let hits = store.search(&[0.0, 1.0], 5, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "keep.md_0");

        store.add(&[entry("keep.md", 0, vec![1.0, 0.0])]).unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }
}
