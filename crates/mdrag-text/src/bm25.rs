use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

use mdrag_core::types::{ChunkId, ChunkMetadata, RankedCandidate};

use crate::tokenize::tokenize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f32,
    /// Length normalization, 0 disables it.
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexedDoc {
    id: ChunkId,
    text: String,
    metadata: ChunkMetadata,
    term_freqs: HashMap<String, u32>,
    len: usize,
}

impl IndexedDoc {
    fn new(id: ChunkId, text: String, metadata: ChunkMetadata) -> Self {
        let tokens = tokenize(&text);
        let len = tokens.len();
        let mut term_freqs = HashMap::new();
        for token in tokens {
            *term_freqs.entry(token).or_insert(0) += 1;
        }
        Self { id, text, metadata, term_freqs, len }
    }
}

/// Serialized form; corpus statistics are rebuilt on load.
#[derive(Deserialize)]
struct Bm25Snapshot {
    params: Bm25Params,
    docs: Vec<IndexedDoc>,
}

/// Okapi BM25 over chunk texts.
///
/// Documents keep insertion order, which breaks score ties. Adding an id that
/// is already indexed replaces it in place. Statistics (document frequency,
/// average length) always reflect the current document set.
#[derive(Debug, Clone, Serialize)]
pub struct Bm25Index {
    params: Bm25Params,
    docs: Vec<IndexedDoc>,
    #[serde(skip)]
    positions: HashMap<ChunkId, usize>,
    #[serde(skip)]
    doc_freqs: HashMap<String, usize>,
    #[serde(skip)]
    total_len: usize,
}

impl<'de> Deserialize<'de> for Bm25Index {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let snapshot = Bm25Snapshot::deserialize(deserializer)?;
        let mut index = Self::new(snapshot.params);
        for doc in snapshot.docs {
            index.insert(doc);
        }
        Ok(index)
    }
}

impl Default for Bm25Index {
    fn default() -> Self {
        Self::new(Bm25Params::default())
    }
}

impl Bm25Index {
    pub fn new(params: Bm25Params) -> Self {
        Self { params, docs: Vec::new(), positions: HashMap::new(), doc_freqs: HashMap::new(), total_len: 0 }
    }

    pub fn params(&self) -> Bm25Params {
        self.params
    }

    pub fn count(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    /// Index one document, replacing any document with the same id.
    pub fn add(&mut self, id: impl Into<ChunkId>, text: impl Into<String>, metadata: ChunkMetadata) {
        self.insert(IndexedDoc::new(id.into(), text.into(), metadata));
    }

    pub fn add_batch<I>(&mut self, docs: I)
    where
        I: IntoIterator<Item = (ChunkId, String, ChunkMetadata)>,
    {
        for (id, text, metadata) in docs {
            self.add(id, text, metadata);
        }
    }

    /// Remove documents by id, returning how many were present.
    pub fn remove(&mut self, ids: &[ChunkId]) -> usize {
        let mut removed = 0;
        for id in ids {
            let Some(&pos) = self.positions.get(id.as_str()) else { continue };
            let terms: Vec<String> = self.docs[pos].term_freqs.keys().cloned().collect();
            let len = self.docs[pos].len;
            self.forget_terms(terms.iter().map(String::as_str), len);
            self.positions.remove(id.as_str());
            removed += 1;
        }
        if removed > 0 {
            let positions = &self.positions;
            self.docs.retain(|d| positions.contains_key(&d.id));
            self.reindex_positions();
            tracing::debug!(removed, remaining = self.docs.len(), "bm25 documents removed");
        }
        removed
    }

    pub fn clear(&mut self) {
        self.docs.clear();
        self.positions.clear();
        self.doc_freqs.clear();
        self.total_len = 0;
    }

    /// Top `top_k` documents for `query`, highest score first. Documents that
    /// share no term with the query are not returned. `source` restricts the
    /// candidates to one document source.
    pub fn search(&self, query: &str, top_k: usize, source: Option<&str>) -> Vec<RankedCandidate> {
        let terms = tokenize(query);
        if terms.is_empty() || self.docs.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let idfs: Vec<f32> = terms.iter().map(|t| self.idf(t)).collect();
        let avg_len = self.average_len();
        let mut scored: Vec<(usize, f32)> = self
            .docs
            .iter()
            .enumerate()
            .filter(|(_, doc)| source.map_or(true, |s| doc.metadata.source == s))
            .filter_map(|(i, doc)| {
                let score = self.score_doc(doc, &terms, &idfs, avg_len);
                (score > 0.0).then_some((i, score))
            })
            .collect();

        // stable: equal scores keep insertion order
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        scored
            .into_iter()
            .map(|(i, score)| {
                let doc = &self.docs[i];
                RankedCandidate::sparse(doc.id.clone(), doc.text.clone(), doc.metadata.clone(), score)
            })
            .collect()
    }

    /// `ln(1 + (N - df + 0.5) / (df + 0.5))`, zero for unseen terms.
    fn idf(&self, term: &str) -> f32 {
        let df = self.doc_freqs.get(term).copied().unwrap_or(0);
        if df == 0 {
            return 0.0;
        }
        let n = self.docs.len() as f32;
        let df = df as f32;
        (1.0 + ((n - df + 0.5) / (df + 0.5)).max(0.0)).ln()
    }

    fn average_len(&self) -> f32 {
        if self.docs.is_empty() {
            0.0
        } else {
            self.total_len as f32 / self.docs.len() as f32
        }
    }

    fn score_doc(&self, doc: &IndexedDoc, terms: &[String], idfs: &[f32], avg_len: f32) -> f32 {
        let Bm25Params { k1, b } = self.params;
        let len_ratio = if avg_len > 0.0 { doc.len as f32 / avg_len } else { 0.0 };
        let norm = k1 * (1.0 - b + b * len_ratio);
        terms
            .iter()
            .zip(idfs)
            .map(|(term, idf)| match doc.term_freqs.get(term) {
                Some(&tf) => {
                    let tf = tf as f32;
                    idf * tf * (k1 + 1.0) / (tf + norm)
                }
                None => 0.0,
            })
            .sum()
    }

    fn insert(&mut self, doc: IndexedDoc) {
        if let Some(&pos) = self.positions.get(&doc.id) {
            let old = std::mem::replace(&mut self.docs[pos], doc);
            self.forget_terms(old.term_freqs.keys().map(String::as_str), old.len);
            let new = &self.docs[pos];
            let (terms, len) = (new.term_freqs.keys().cloned().collect::<Vec<_>>(), new.len);
            self.learn_terms(terms, len);
        } else {
            self.learn_terms(doc.term_freqs.keys().cloned().collect(), doc.len);
            self.positions.insert(doc.id.clone(), self.docs.len());
            self.docs.push(doc);
        }
    }

    fn learn_terms(&mut self, terms: Vec<String>, len: usize) {
        for term in terms {
            *self.doc_freqs.entry(term).or_insert(0) += 1;
        }
        self.total_len += len;
    }

    fn forget_terms<'a>(&mut self, terms: impl Iterator<Item = &'a str>, len: usize) {
        for term in terms {
            if let Some(df) = self.doc_freqs.get_mut(term) {
                *df -= 1;
                if *df == 0 {
                    self.doc_freqs.remove(term);
                }
            }
        }
        self.total_len -= len;
    }

    fn reindex_positions(&mut self) {
        self.positions = self.docs.iter().enumerate().map(|(i, d)| (d.id.clone(), i)).collect();
    }
}
