use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use mdrag_core::types::ChunkId;

/// Which chunk ids were written for each source, so a source can be removed
/// without guessing ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRegistry {
    sources: BTreeMap<String, Vec<ChunkId>>,
}

impl SourceRegistry {
    /// Record the chunk ids of `source`, returning the ids it replaces.
    pub fn insert(&mut self, source: impl Into<String>, ids: Vec<ChunkId>) -> Option<Vec<ChunkId>> {
        self.sources.insert(source.into(), ids)
    }

    pub fn get(&self, source: &str) -> Option<&[ChunkId]> {
        self.sources.get(source).map(Vec::as_slice)
    }

    pub fn remove(&mut self, source: &str) -> Option<Vec<ChunkId>> {
        self.sources.remove(source)
    }

    pub fn contains(&self, source: &str) -> bool {
        self.sources.contains_key(source)
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn clear(&mut self) {
        self.sources.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_and_remove_is_idempotent() {
        let mut r = SourceRegistry::default();
        assert_eq!(r.insert("a.md", vec!["a.md_0".into()]), None);
        assert_eq!(r.insert("a.md", vec!["a.md_0".into(), "a.md_1".into()]), Some(vec!["a.md_0".to_string()]));
        assert_eq!(r.get("a.md").map(<[ChunkId]>::len), Some(2));
        assert!(r.remove("a.md").is_some());
        assert!(r.remove("a.md").is_none());
        assert!(r.is_empty());
    }
}
