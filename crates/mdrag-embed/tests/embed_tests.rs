use std::sync::Mutex;

use mdrag_core::config::{EmbeddingConfig, EmbeddingProvider};
use mdrag_core::error::{Error, Result};
use mdrag_core::traits::Embedder;
use mdrag_embed::{build_embedder, BatchLimits, BatchingEmbedder, HashEmbedder, EMPTY_TEXT_PLACEHOLDER};

/// Records every request; fails any request containing "boom", and a batch
/// request containing "flaky" (which succeeds when sent alone).
#[derive(Default)]
struct ScriptedEmbedder {
    batches: Mutex<Vec<Vec<String>>>,
    singles: Mutex<Vec<String>>,
}

impl ScriptedEmbedder {
    fn vector(text: &str) -> Vec<f32> {
        vec![text.len() as f32, 1.0]
    }
}

impl Embedder for ScriptedEmbedder {
    fn name(&self) -> &str {
        "scripted"
    }

    fn dimension(&self) -> usize {
        2
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.singles.lock().unwrap().push(text.to_string());
        if text.contains("boom") {
            return Err(Error::Embedding("provider rejected input".into()));
        }
        Ok(Self::vector(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.batches.lock().unwrap().push(texts.to_vec());
        if texts.iter().any(|t| t.contains("boom") || t.contains("flaky")) {
            return Err(Error::Embedding("batch rejected".into()));
        }
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

fn limits(max_items: usize, max_batch_tokens: usize, max_item_tokens: usize) -> BatchLimits {
    BatchLimits { max_items, max_batch_tokens, max_item_tokens }
}

#[test]
fn batches_respect_item_count() {
    let e = BatchingEmbedder::new(ScriptedEmbedder::default(), limits(5, 1000, 5000));
    let texts: Vec<String> = (0..12).map(|i| format!("text {i}")).collect();
    let out = e.embed_batch(&texts).unwrap();
    assert_eq!(out.len(), 12);
    let sizes: Vec<usize> = e.inner().batches.lock().unwrap().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![5, 5, 2]);
}

#[test]
fn batches_respect_summed_tokens() {
    let e = BatchingEmbedder::new(ScriptedEmbedder::default(), limits(10, 250, 5000));
    // 400 chars = 100 estimated tokens each
    let texts: Vec<String> = (0..5).map(|_| "x".repeat(400)).collect();
    e.embed_batch(&texts).unwrap();
    let sizes: Vec<usize> = e.inner().batches.lock().unwrap().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
}

#[test]
fn failed_batch_falls_back_to_single_items() {
    let e = BatchingEmbedder::new(ScriptedEmbedder::default(), limits(5, 1000, 5000));
    let texts: Vec<String> = ["a", "flaky", "boom", "d"].iter().map(|s| s.to_string()).collect();
    let aligned = e.embed_batch_aligned(&texts).unwrap();
    assert_eq!(aligned.len(), 4);
    assert!(aligned[0].is_some());
    assert!(aligned[1].is_some());
    assert!(aligned[2].is_none());
    assert_eq!(aligned[3], Some(vec![1.0, 1.0]));
    assert_eq!(e.inner().singles.lock().unwrap().len(), 4);

    let flat = e.embed_batch(&texts).unwrap();
    assert_eq!(flat.len(), 3);
}

#[test]
fn oversized_items_are_skipped_without_a_request() {
    let e = BatchingEmbedder::new(ScriptedEmbedder::default(), limits(5, 1000, 10));
    let texts = vec!["short".to_string(), "y".repeat(100), "tiny".to_string()];
    let aligned = e.embed_batch_aligned(&texts).unwrap();
    assert!(aligned[0].is_some() && aligned[1].is_none() && aligned[2].is_some());
    let sent: Vec<String> = e.inner().batches.lock().unwrap().concat();
    assert_eq!(sent, vec!["short".to_string(), "tiny".to_string()]);
}

#[test]
fn empty_text_is_replaced_before_embedding() {
    let e = BatchingEmbedder::new(ScriptedEmbedder::default(), BatchLimits::default());
    e.embed_batch(&[String::new()]).unwrap();
    e.embed_text("").unwrap();
    assert_eq!(e.inner().batches.lock().unwrap()[0], vec![EMPTY_TEXT_PLACEHOLDER.to_string()]);
    assert_eq!(e.inner().singles.lock().unwrap()[0], EMPTY_TEXT_PLACEHOLDER);
}

#[test]
fn default_aligned_batch_pads_missing_suffix() {
    struct Short;
    impl Embedder for Short {
        fn name(&self) -> &str {
            "short"
        }
        fn dimension(&self) -> usize {
            1
        }
        fn embed_text(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0])
        }
        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().skip(1).map(|_| vec![1.0]).collect())
        }
    }
    let aligned = Short.embed_batch_aligned(&["a".to_string(), "b".to_string(), "c".to_string()]).unwrap();
    assert_eq!(aligned, vec![Some(vec![1.0]), Some(vec![1.0]), None]);
}

#[test]
fn hash_provider_builds_from_config() {
    let config = EmbeddingConfig { provider: EmbeddingProvider::Hash, dimension: 32, ..EmbeddingConfig::default() };
    let embedder = build_embedder(&config).expect("embedder");
    assert_eq!(embedder.dimension(), 32);
    assert_eq!(embedder.name(), "hash");
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let norm: f32 = embs[0].iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");
    assert_eq!(embs[0], embs[1]);
    assert_eq!(embs[0], HashEmbedder::new(32).embed_text("hello world").unwrap());
}

#[cfg(not(feature = "candle"))]
#[test]
fn bge_provider_requires_candle_feature() {
    let config = EmbeddingConfig { provider: EmbeddingProvider::Bge, ..EmbeddingConfig::default() };
    assert!(matches!(build_embedder(&config), Err(Error::InvalidConfig(_))));
}
