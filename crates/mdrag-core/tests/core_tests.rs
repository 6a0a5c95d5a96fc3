use std::fs;

use tempfile::TempDir;

use mdrag_core::config::{Config, DistanceMetric, EmbeddingProvider, RetrievalMode, Settings};
use mdrag_core::documents::{collect_markdown_files, read_document, source_name};
use mdrag_core::Error;

#[test]
fn collects_markdown_recursively_and_sorted() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::create_dir(dir.join("nested")).unwrap();
    fs::write(dir.join("b.md"), "# B").unwrap();
    fs::write(dir.join("a.markdown"), "# A").unwrap();
    fs::write(dir.join("nested/c.md"), "# C").unwrap();
    fs::write(dir.join("notes.txt"), "skip").unwrap();

    let missing = dir.join("missing.md");
    let files = collect_markdown_files(&[dir.to_path_buf(), missing.clone()]);

    let names: Vec<String> = files.iter().map(|p| source_name(p)).collect();
    assert_eq!(names, vec!["a.markdown", "b.md", "c.md", "missing.md"]);
    assert_eq!(files.last(), Some(&missing));
}

#[test]
fn read_document_decodes_invalid_utf8_lossily() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("bad.md");
    fs::write(&path, b"# Title\nvalid \xff\xfe bytes").unwrap();
    let text = read_document(&path).expect("lossy read");
    assert!(text.starts_with("# Title"));
    assert!(text.contains('\u{FFFD}'));
}

#[test]
fn read_document_reports_missing_path() {
    let tmp = TempDir::new().unwrap();
    let err = read_document(&tmp.path().join("nope.md")).unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
}

#[test]
fn config_file_overrides_defaults() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("mdrag.toml");
    fs::write(
        &path,
        r#"
data_dir = "/tmp/mdrag-test"

[chunking]
max_chunk_size = 512
overlap = 64

[vector_store]
distance = "l2"

[retrieval]
mode = "hybrid"
alpha = 0.7
"#,
    )
    .unwrap();

    let settings = Config::load_file(&path).unwrap().settings().unwrap();
    assert_eq!(settings.data_dir, "/tmp/mdrag-test");
    assert_eq!(settings.chunking.max_chunk_size, 512);
    assert_eq!(settings.chunking.overlap, 64);
    assert_eq!(settings.chunking.max_tokens_per_chunk, 5000);
    assert_eq!(settings.vector_store.distance, DistanceMetric::L2);
    assert_eq!(settings.retrieval.mode, RetrievalMode::Hybrid);
    assert!((settings.retrieval.alpha - 0.7).abs() < 1e-9);
    assert_eq!(settings.retrieval.rrf_k, 60);
}

#[test]
fn default_embedder_is_the_semantic_model() {
    let settings = Settings::default();
    assert_eq!(settings.embedding.provider, EmbeddingProvider::Bge);
    assert_eq!(settings.embedding.dimension, 1024);
    assert!((settings.retrieval.score_threshold - 0.5).abs() < 1e-9);

    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("offline.toml");
    fs::write(&path, "[embedding]\nprovider = \"hash\"\ndimension = 64\n").unwrap();
    let settings = Config::load_file(&path).unwrap().settings().unwrap();
    assert_eq!(settings.embedding.provider, EmbeddingProvider::Hash);
    assert_eq!(settings.embedding.dimension, 64);
}

#[test]
fn invalid_values_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("bad.toml");
    fs::write(&path, "[retrieval]\nalpha = 1.5\n").unwrap();
    let err = Config::load_file(&path).unwrap().settings().unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));

    let mut settings = Settings::default();
    settings.chunking.overlap = settings.chunking.max_chunk_size;
    assert!(settings.validate().is_err());
}

#[test]
fn missing_config_file_is_not_found() {
    let err = Config::load_file(std::path::Path::new("/definitely/not/here.toml")).err().unwrap();
    assert!(matches!(err, Error::NotFound(_)));
}
