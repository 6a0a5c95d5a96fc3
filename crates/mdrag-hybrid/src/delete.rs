use std::path::Path;

use mdrag_core::documents::source_name;
use mdrag_core::error::Result;
use mdrag_core::traits::VectorStore;
use mdrag_core::types::DeleteReport;
use mdrag_text::Bm25Index;

use crate::registry::SourceRegistry;

/// Remove every chunk of each named document. Identifiers may be paths; only
/// the basename is matched. Unknown sources land in `not_found_ids`, so
/// repeating a delete is harmless.
pub fn delete_sources(
    identifiers: &[String],
    store: &dyn VectorStore,
    sparse: &mut Bm25Index,
    registry: &mut SourceRegistry,
) -> Result<DeleteReport> {
    let mut report = DeleteReport::default();
    for identifier in identifiers {
        let source = source_name(Path::new(identifier));
        let Some(ids) = registry.get(&source).map(|ids| ids.to_vec()) else {
            tracing::debug!(%source, "nothing indexed for source");
            report.not_found_ids.push(identifier.clone());
            continue;
        };
        store.delete(&ids)?;
        sparse.remove(&ids);
        registry.remove(&source);
        tracing::info!(%source, chunks = ids.len(), "source deleted");
        report.deleted_ids.push(identifier.clone());
    }
    report.deleted_count = report.deleted_ids.len();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdrag_core::config::DistanceMetric;
    use mdrag_core::types::{ChunkMetadata, IndexEntry};
    use mdrag_vector::MemoryVectorStore;

    fn seed(source: &str, n: usize, store: &MemoryVectorStore, sparse: &mut Bm25Index, registry: &mut SourceRegistry) {
        let entries: Vec<IndexEntry> = (0..n)
            .map(|p| IndexEntry {
                id: format!("{source}_{p}"),
                vector: vec![1.0, p as f32],
                text: format!("{source} part {p}"),
                metadata: ChunkMetadata { source: source.into(), headers: vec![], position: p, sub_position: None },
            })
            .collect();
        store.add(&entries).unwrap();
        registry.insert(source, entries.iter().map(|e| e.id.clone()).collect());
        sparse.add_batch(entries.into_iter().map(|e| (e.id, e.text, e.metadata)));
    }

    #[test]
    fn deletes_by_basename_and_reports_unknowns() {
        let store = MemoryVectorStore::new(DistanceMetric::Cosine, 2);
        let mut sparse = Bm25Index::default();
        let mut registry = SourceRegistry::default();
        seed("a.md", 3, &store, &mut sparse, &mut registry);
        seed("b.md", 2, &store, &mut sparse, &mut registry);

        let report =
            delete_sources(&["notes/a.md".into(), "zzz.md".into()], &store, &mut sparse, &mut registry).unwrap();
        assert_eq!(report.deleted_count, 1);
        assert_eq!(report.deleted_ids, vec!["notes/a.md"]);
        assert_eq!(report.not_found_ids, vec!["zzz.md"]);
        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(sparse.count(), 2);
        assert!(!registry.contains("a.md"));

        let again = delete_sources(&["a.md".into()], &store, &mut sparse, &mut registry).unwrap();
        assert_eq!(again.deleted_count, 0);
        assert_eq!(again.not_found_ids, vec!["a.md"]);
        assert_eq!(store.count().unwrap(), 2);
    }
}
