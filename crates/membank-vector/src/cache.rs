//! Content-addressed embedding cache.
//!
//! Keyed by `(content_hash, embedder_id)`; hashing the text rather than its
//! location means a chunk keeps its cached vector when a document is renamed
//! or re-segmented, and switching embedders invalidates nothing but simply
//! misses.

use anyhow::{anyhow, Result};
use arrow_array::cast::AsArray;
use arrow_array::{FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray};
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::ExecutableQuery;
use lancedb::Connection;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::schema::{build_cache_schema, EMBEDDING_DIM};
use crate::table;

pub const CACHE_TABLE: &str = "embedding_cache";

#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub content_hash: String,
    pub embedder_id: String,
    pub vector: Vec<f32>,
}

/// Fetch cached vectors for the given hashes. Absent keys are simply missing
/// from the returned map; a miss is not an error.
pub async fn get_many(
    conn: &Connection,
    embedder_id: &str,
    hashes: &[String],
) -> Result<HashMap<String, Vec<f32>>> {
    if hashes.is_empty() || !table::table_exists(conn, CACHE_TABLE).await? {
        return Ok(HashMap::new());
    }
    let wanted: HashSet<&str> = hashes.iter().map(String::as_str).collect();
    let t = conn.open_table(CACHE_TABLE).execute().await?;
    let mut out = HashMap::new();
    let mut stream = t.query().execute().await?;
    while let Some(batch) = stream.try_next().await? {
        let hash_col = string_col(&batch, "content_hash")?;
        let eid_col = string_col(&batch, "embedder_id")?;
        let vec_col = batch
            .column_by_name("vector")
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
            .ok_or_else(|| anyhow!("cache.vector column missing"))?;
        for i in 0..batch.num_rows() {
            let h = hash_col.value(i);
            if eid_col.value(i) != embedder_id || !wanted.contains(h) {
                continue;
            }
            let list = vec_col.value(i);
            let vals = list
                .as_primitive::<arrow_array::types::Float32Type>()
                .values()
                .iter()
                .copied()
                .collect::<Vec<f32>>();
            if vals.len() == EMBEDDING_DIM as usize {
                out.insert(h.to_string(), vals);
            }
        }
    }
    Ok(out)
}

/// Write-through after embedding misses.
pub async fn put_many(conn: &Connection, entries: &[CacheEntry]) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    table::ensure_table(conn, CACHE_TABLE, build_cache_schema()).await?;
    let t = conn.open_table(CACHE_TABLE).execute().await?;
    let mut hashes = Vec::new();
    let mut eids = Vec::new();
    let mut created = Vec::new();
    let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::new();
    let now = Utc::now().timestamp_millis();
    for e in entries {
        hashes.push(e.content_hash.clone());
        eids.push(e.embedder_id.clone());
        created.push(now);
        vectors.push(Some(e.vector.iter().map(|&x| Some(x)).collect()));
    }
    let batch = RecordBatch::try_new(
        build_cache_schema(),
        vec![
            Arc::new(StringArray::from(hashes)),
            Arc::new(StringArray::from(eids)),
            Arc::new(arrow_array::TimestampMillisecondArray::from(created)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(
                vectors.into_iter(),
                EMBEDDING_DIM,
            )),
        ],
    )?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), build_cache_schema()));
    t.add(reader).execute().await?;
    Ok(())
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow!("cache.{} column missing", name))
}
