//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nested keys, e.g. `APP_RETRIEVAL__MODE=hybrid`).
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Hard ceiling on results returned by a query.
pub const MAX_RESULTS: usize = 5;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        Ok(Self { figment })
    }

    /// Load from an explicit TOML file instead of the working directory
    /// defaults. Environment overrides still apply.
    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(format!("config file {}", path.display())));
        }
        let figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("APP_").split("__"));
        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        Ok(self.figment.extract_inner(key)?)
    }

    /// Extract and validate the full settings tree.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self.figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data_dir: String,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub vector_store: VectorStoreConfig,
    pub retrieval: RetrievalConfig,
    pub ingestion: IngestionConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: "./data/mdrag".to_string(),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            vector_store: VectorStoreConfig::default(),
            retrieval: RetrievalConfig::default(),
            ingestion: IngestionConfig::default(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.retrieval.validate()?;
        if self.embedding.dimension == 0 {
            return Err(Error::InvalidConfig("embedding.dimension must be > 0".into()));
        }
        if self.embedding.max_batch_items == 0 {
            return Err(Error::InvalidConfig("embedding.max_batch_items must be > 0".into()));
        }
        if self.ingestion.workers == 0 {
            return Err(Error::InvalidConfig("ingestion.workers must be > 0".into()));
        }
        Ok(())
    }

    pub fn data_path(&self) -> PathBuf {
        expand_path(&self.data_dir)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    pub max_chunk_size: usize,
    /// Characters shared by consecutive fixed-window pieces.
    pub overlap: usize,
    /// Hard token ceiling per chunk (1 token ≈ 4 characters).
    pub max_tokens_per_chunk: usize,
    /// Extra characters a code fence or table may exceed `max_chunk_size` by
    /// when it is kept whole.
    pub atomic_block_tolerance: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_chunk_size: 1024, overlap: 100, max_tokens_per_chunk: 5000, atomic_block_tolerance: 256 }
    }
}

impl ChunkingConfig {
    /// `min(max_chunk_size, max_tokens_per_chunk * 4)`.
    pub fn effective_max_size(&self) -> usize {
        self.max_chunk_size.min(self.max_tokens_per_chunk.saturating_mul(4))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 || self.max_tokens_per_chunk == 0 {
            return Err(Error::InvalidConfig("chunk size and token budget must be > 0".into()));
        }
        let effective = self.effective_max_size();
        if self.overlap >= effective {
            return Err(Error::InvalidConfig(format!(
                "overlap ({}) must be smaller than the effective chunk size ({})",
                self.overlap, effective
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Deterministic feature-hashing embedder, no model files needed. Only
    /// exact word overlap counts, so short queries rarely clear the default
    /// similarity threshold; meant for tests and offline smoke runs.
    Hash,
    /// BGE-M3 through candle (feature `candle`).
    Bge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub dimension: usize,
    pub model_dir: Option<String>,
    /// Tokens fed to the model per input.
    pub max_len: usize,
    pub max_batch_items: usize,
    pub max_batch_tokens: usize,
    /// Inputs estimated above this many tokens are skipped.
    pub max_item_tokens: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Bge,
            dimension: 1024,
            model_dir: None,
            max_len: 256,
            max_batch_items: 5,
            max_batch_tokens: 1000,
            max_item_tokens: 5000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    Memory,
    /// LanceDB table (feature `lance`).
    Lance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// `1 - cosine similarity`.
    Cosine,
    /// Euclidean distance.
    L2,
    /// `1 - dot product`; equals cosine distance for unit vectors.
    Dot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub backend: VectorBackend,
    pub distance: DistanceMetric,
    pub table: String,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self { backend: VectorBackend::Memory, distance: DistanceMetric::Cosine, table: "documents".to_string() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    Dense,
    Hybrid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub mode: RetrievalMode,
    pub top_k: usize,
    pub score_threshold: f32,
    /// Weight of the dense list in fusion; the sparse list gets `1 - alpha`.
    pub alpha: f64,
    pub rrf_k: u32,
    pub k1: f32,
    pub b: f32,
    /// Candidate pool per list in hybrid mode is `top_k * candidate_multiplier`.
    pub candidate_multiplier: usize,
    pub latency_target_ms: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: RetrievalMode::Dense,
            top_k: MAX_RESULTS,
            score_threshold: 0.5,
            alpha: 0.5,
            rrf_k: 60,
            k1: 1.5,
            b: 0.75,
            candidate_multiplier: 4,
            latency_target_ms: 500.0,
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(Error::InvalidConfig(format!("retrieval.alpha must be within [0, 1], got {}", self.alpha)));
        }
        if self.top_k == 0 || self.candidate_multiplier == 0 {
            return Err(Error::InvalidConfig("retrieval.top_k and candidate_multiplier must be > 0".into()));
        }
        if self.k1 < 0.0 || !(0.0..=1.0).contains(&self.b) {
            return Err(Error::InvalidConfig("retrieval.k1 must be >= 0 and retrieval.b within [0, 1]".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Size of the read/chunk/embed worker pool.
    pub workers: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
