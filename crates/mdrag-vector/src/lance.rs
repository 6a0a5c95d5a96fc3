//! LanceDB-backed store. LanceDB is async; the store owns a tokio runtime and
//! blocks on it so it fits the synchronous `VectorStore` contract.
use std::path::Path;
use std::sync::Arc;

use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType, Table};
use tokio::runtime::Runtime;

use mdrag_core::config::DistanceMetric;
use mdrag_core::error::{Error, Result};
use mdrag_core::traits::VectorStore;
use mdrag_core::types::{ChunkId, ChunkMetadata, IndexEntry, RankedCandidate};

use crate::schema::build_chunk_schema;

fn store_err(err: impl std::fmt::Display) -> Error {
    Error::VectorStore(err.to_string())
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub struct LanceVectorStore {
    runtime: Runtime,
    db: Connection,
    table_name: String,
    dimension: usize,
    metric: DistanceMetric,
}

impl LanceVectorStore {
    pub fn open(db_path: &Path, table_name: &str, dimension: usize, metric: DistanceMetric) -> Result<Self> {
        let runtime = Runtime::new().map_err(|e| Error::io(db_path, e))?;
        let uri = db_path.to_string_lossy().to_string();
        let db = runtime.block_on(async { connect(&uri).execute().await }).map_err(store_err)?;
        let store = Self { runtime, db, table_name: table_name.to_string(), dimension, metric };
        store.runtime.block_on(store.ensure_table())?;
        tracing::info!(uri, table = table_name, "opened lance store");
        Ok(store)
    }

    async fn ensure_table(&self) -> Result<()> {
        let names = self.db.table_names().execute().await.map_err(store_err)?;
        if names.contains(&self.table_name) {
            return Ok(());
        }
        let schema = build_chunk_schema(self.dimension as i32);
        let iter = RecordBatchIterator::new(vec![].into_iter(), schema);
        self.db.create_table(&self.table_name, Box::new(iter)).execute().await.map_err(store_err)?;
        Ok(())
    }

    async fn table(&self) -> Result<Table> {
        self.db.open_table(&self.table_name).execute().await.map_err(store_err)
    }

    fn to_record_batch(&self, entries: &[IndexEntry]) -> Result<RecordBatch> {
        let mut ids = Vec::with_capacity(entries.len());
        let mut sources = Vec::with_capacity(entries.len());
        let mut texts = Vec::with_capacity(entries.len());
        let mut metadata = Vec::with_capacity(entries.len());
        let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.vector.len() != self.dimension {
                return Err(Error::DimensionMismatch { expected: self.dimension, actual: entry.vector.len() });
            }
            ids.push(entry.id.clone());
            sources.push(entry.metadata.source.clone());
            texts.push(entry.text.clone());
            metadata.push(serde_json::to_string(&entry.metadata)?);
            vectors.push(Some(entry.vector.iter().map(|&x| Some(x)).collect()));
        }
        RecordBatch::try_new(
            build_chunk_schema(self.dimension as i32),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(sources)),
                Arc::new(StringArray::from(texts)),
                Arc::new(StringArray::from(metadata)),
                Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(
                    vectors.into_iter(),
                    self.dimension as i32,
                )),
            ],
        )
        .map_err(store_err)
    }

    fn distance_type(&self) -> DistanceType {
        match self.metric {
            DistanceMetric::Cosine => DistanceType::Cosine,
            DistanceMetric::L2 => DistanceType::L2,
            DistanceMetric::Dot => DistanceType::Dot,
        }
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| Error::VectorStore(format!("column {name} missing")))
}

fn rows_to_candidates(batch: &RecordBatch) -> Result<Vec<RankedCandidate>> {
    let ids = string_column(batch, "id")?;
    let texts = string_column(batch, "text")?;
    let metadata = string_column(batch, "metadata")?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| Error::VectorStore("column _distance missing".into()))?;
    let mut out = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let meta: ChunkMetadata = serde_json::from_str(metadata.value(i))?;
        let distance = if distances.is_null(i) { f32::MAX } else { distances.value(i) };
        out.push(RankedCandidate::dense(ids.value(i).to_string(), texts.value(i).to_string(), meta, distance));
    }
    Ok(out)
}

impl VectorStore for LanceVectorStore {
    fn add(&self, entries: &[IndexEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let batch = self.to_record_batch(entries)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        self.runtime.block_on(async {
            let table = self.table().await?;
            // upsert on id
            let mut mi = table.merge_insert(&["id"]);
            mi.when_matched_update_all(None).when_not_matched_insert_all();
            mi.execute(reader).await.map_err(store_err)?;
            Ok(())
        })
    }

    fn search(&self, query: &[f32], top_k: usize, source: Option<&str>) -> Result<Vec<RankedCandidate>> {
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch { expected: self.dimension, actual: query.len() });
        }
        self.runtime.block_on(async {
            let table = self.table().await?;
            let mut q = table.vector_search(query.to_vec()).map_err(store_err)?.distance_type(self.distance_type()).limit(top_k);
            if let Some(source) = source {
                q = q.only_if(format!("source = {}", quote(source)));
            }
            let mut stream = q.execute().await.map_err(store_err)?;
            let mut hits = Vec::new();
            while let Some(batch) = stream.try_next().await.map_err(store_err)? {
                hits.extend(rows_to_candidates(&batch)?);
            }
            hits.sort_by(|a, b| {
                let (da, db) = (a.score.distance().unwrap_or(f32::MAX), b.score.distance().unwrap_or(f32::MAX));
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            });
            hits.truncate(top_k);
            Ok(hits)
        })
    }

    fn delete(&self, ids: &[ChunkId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let predicate = format!("id IN ({})", ids.iter().map(|id| quote(id)).collect::<Vec<_>>().join(", "));
        self.runtime.block_on(async {
            let table = self.table().await?;
            table.delete(&predicate).await.map_err(store_err)?;
            Ok(())
        })
    }

    fn count(&self) -> Result<usize> {
        self.runtime.block_on(async {
            let table = self.table().await?;
            table.count_rows(None).await.map_err(store_err)
        })
    }

    fn clear(&self) -> Result<()> {
        self.runtime.block_on(async {
            let table = self.table().await?;
            table.delete("true").await.map_err(store_err)?;
            Ok(())
        })
    }
}
