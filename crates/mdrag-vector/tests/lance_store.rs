#![cfg(feature = "lance")]

use mdrag_core::config::DistanceMetric;
use mdrag_core::traits::VectorStore;
use mdrag_core::types::{ChunkMetadata, IndexEntry};
use mdrag_vector::lance::LanceVectorStore;

fn entry(source: &str, position: usize, vector: Vec<f32>) -> IndexEntry {
    IndexEntry {
        id: format!("{source}_{position}"),
        vector,
        text: format!("{source} #{position}"),
        metadata: ChunkMetadata { source: source.into(), headers: vec![], position, sub_position: None },
    }
}

#[test]
fn lance_add_search_delete_roundtrip() {
    let tmp = tempfile::tempdir().unwrap();
    let store = LanceVectorStore::open(tmp.path(), "documents", 2, DistanceMetric::Cosine).unwrap();
    store.add(&[entry("a.md", 0, vec![1.0, 0.0]), entry("b.md", 0, vec![0.0, 1.0])]).unwrap();
    store.add(&[entry("a.md", 0, vec![0.9, 0.1])]).unwrap();
    assert_eq!(store.count().unwrap(), 2);

    let hits = store.search(&[1.0, 0.0], 2, None).unwrap();
    assert_eq!(hits[0].id, "a.md_0");
    let only_b = store.search(&[1.0, 0.0], 2, Some("b.md")).unwrap();
    assert!(only_b.iter().all(|h| h.metadata.source == "b.md"));

    store.delete(&["a.md_0".to_string(), "missing".to_string()]).unwrap();
    assert_eq!(store.count().unwrap(), 1);
    store.clear().unwrap();
    assert_eq!(store.count().unwrap(), 0);
}
