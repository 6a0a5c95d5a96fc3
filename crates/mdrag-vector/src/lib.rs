//! mdrag-vector
//!
//! Vector stores behind `mdrag_core::traits::VectorStore`: a brute-force
//! in-memory store with JSON snapshots, and a LanceDB table (feature `lance`).
pub mod distance;
pub mod memory;

#[cfg(feature = "lance")]
pub mod lance;
#[cfg(feature = "lance")]
pub mod schema;

pub use memory::MemoryVectorStore;

use std::path::Path;

use mdrag_core::config::{VectorBackend, VectorStoreConfig};
use mdrag_core::error::Result;
use mdrag_core::traits::VectorStore;

/// File name of the in-memory store snapshot under the data directory.
pub const MEMORY_SNAPSHOT: &str = "vectors.json";

/// Open the configured backend rooted at `data_dir`.
pub fn build_vector_store(config: &VectorStoreConfig, dimension: usize, data_dir: &Path) -> Result<Box<dyn VectorStore>> {
    match config.backend {
        VectorBackend::Memory => {
            let store = MemoryVectorStore::open(data_dir.join(MEMORY_SNAPSHOT), config.distance, dimension)?;
            Ok(Box::new(store))
        }
        VectorBackend::Lance => lance_store(config, dimension, data_dir),
    }
}

#[cfg(feature = "lance")]
fn lance_store(config: &VectorStoreConfig, dimension: usize, data_dir: &Path) -> Result<Box<dyn VectorStore>> {
    let store = lance::LanceVectorStore::open(&data_dir.join("lance"), &config.table, dimension, config.distance)?;
    Ok(Box::new(store))
}

#[cfg(not(feature = "lance"))]
fn lance_store(_config: &VectorStoreConfig, _dimension: usize, _data_dir: &Path) -> Result<Box<dyn VectorStore>> {
    Err(mdrag_core::Error::InvalidConfig("vector_store.backend = \"lance\" requires the `lance` feature".into()))
}
