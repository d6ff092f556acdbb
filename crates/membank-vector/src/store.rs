//! Versioned chunk snapshots with an atomic active pointer.
//!
//! `build` never touches the serving table: rows go into a fresh
//! `chunks_v<millis>` table and the `active_chunks_table` meta key is flipped
//! only after every row is written. `upsert` patches the active snapshot in
//! place via `merge_insert` on `id` for incremental single-document updates.

use anyhow::{anyhow, ensure, Result};
use arrow_array::cast::AsArray;
use arrow_array::{
    FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator, StringArray,
    TimestampMillisecondArray,
};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use std::sync::Arc;
use tracing::info;

use membank_core::error::Error;
use membank_core::types::{Chunk, SizeCategory};

use crate::schema::{build_chunks_schema, EMBEDDING_DIM};
use crate::table::{self, ACTIVE_CHUNKS_KEY};

const INSERT_BATCH_ROWS: usize = 1000;

/// A raw vector-search hit before ranking: the decoded chunk plus its cosine
/// distance to the query.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub chunk: Chunk,
    pub distance: f32,
}

/// One row of the active snapshot as persisted: metadata plus the stored
/// vector, so a rebuilt index can be checked against its inputs exactly.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

struct DecodedRow {
    chunk: Chunk,
    distance: f32,
    vector: Vec<f32>,
}

pub struct ChunkStore {
    conn: Connection,
}

impl ChunkStore {
    pub async fn open(uri: &str) -> Result<Self> {
        let conn = table::open_db(uri).await?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Name of the currently served snapshot table, if any build has
    /// completed. `None` means an empty corpus, not an error.
    pub async fn active_table(&self) -> Result<Option<String>> {
        table::get_meta(&self.conn, ACTIVE_CHUNKS_KEY).await
    }

    /// Full rebuild: write every chunk into a fresh versioned table, then
    /// flip the active pointer. Returns the new table name.
    pub async fn build(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<String> {
        ensure!(chunks.len() == embeddings.len(), "chunks and embeddings length must match");
        let name = format!("chunks_v{}", Utc::now().timestamp_millis());
        info!(table = %name, rows = chunks.len(), "building chunk snapshot");

        table::ensure_table(&self.conn, &name, build_chunks_schema()).await?;
        let t = self.conn.open_table(&name).execute().await?;

        if !chunks.is_empty() {
            let pb = ProgressBar::new(chunks.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} chunks {msg}")
                    .map_err(|e| anyhow!("progress template: {}", e))?
                    .progress_chars("#>-"),
            );
            for (chunk_rows, emb_rows) in
                chunks.chunks(INSERT_BATCH_ROWS).zip(embeddings.chunks(INSERT_BATCH_ROWS))
            {
                insert_rows(&t, chunk_rows, emb_rows).await?;
                pb.inc(chunk_rows.len() as u64);
            }
            pb.finish_and_clear();
        }

        table::set_meta(&self.conn, ACTIVE_CHUNKS_KEY, &name).await?;
        info!(table = %name, "snapshot activated");
        Ok(name)
    }

    /// Patch chunks into the active snapshot, replacing rows with matching
    /// ids and inserting the rest. Requires a prior `build`.
    pub async fn upsert(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        ensure!(chunks.len() == embeddings.len(), "chunks and embeddings length must match");
        if chunks.is_empty() {
            return Ok(());
        }
        let t = self.open_active().await?.ok_or_else(|| {
            Error::NotFound("no active chunk snapshot; run a full build first".to_string())
        })?;
        for (chunk_rows, emb_rows) in
            chunks.chunks(INSERT_BATCH_ROWS).zip(embeddings.chunks(INSERT_BATCH_ROWS))
        {
            let batch = rows_to_record_batch(chunk_rows, emb_rows)?;
            let reader = Box::new(RecordBatchIterator::new(
                vec![Ok(batch)].into_iter(),
                build_chunks_schema(),
            ));
            let mut mi = t.merge_insert(&["id"]);
            mi.when_matched_update_all(None).when_not_matched_insert_all();
            let _ = mi.execute(reader).await?;
        }
        Ok(())
    }

    /// Cosine nearest neighbours of `query_vec` from the active snapshot.
    /// A domain filter is applied at retrieval time, so chunks of the
    /// requested domain surface even when another domain dominates the
    /// vector neighbourhood. An empty corpus yields an empty list.
    pub async fn candidates(
        &self,
        query_vec: &[f32],
        n: usize,
        domain: Option<&str>,
    ) -> Result<Vec<Candidate>> {
        let Some(t) = self.open_active().await? else {
            return Ok(Vec::new());
        };
        let mut query = t
            .vector_search(query_vec.to_vec())?
            .distance_type(DistanceType::Cosine)
            .limit(n);
        if let Some(d) = domain {
            query = query.only_if(format!("domain = '{}'", d.replace('\'', "''")));
        }
        let mut stream = query.execute().await?;
        let mut out = Vec::new();
        while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await? {
            decode_batch(&batch, true, &mut out)?;
        }
        Ok(out.into_iter().map(|r| Candidate { chunk: r.chunk, distance: r.distance }).collect())
    }

    /// Every row of the active snapshot with its stored vector, for stats
    /// and round-trip verification.
    pub async fn entries(&self) -> Result<Vec<StoredChunk>> {
        let Some(t) = self.open_active().await? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        let mut stream = t.query().execute().await?;
        while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await? {
            decode_batch(&batch, false, &mut out)?;
        }
        Ok(out.into_iter().map(|r| StoredChunk { chunk: r.chunk, vector: r.vector }).collect())
    }

    /// Open the active snapshot table. A pointer naming a missing table means
    /// the index directory was damaged after the flip; only a rebuild helps.
    async fn open_active(&self) -> Result<Option<Table>> {
        let Some(name) = self.active_table().await? else {
            return Ok(None);
        };
        if !table::table_exists(&self.conn, &name).await? {
            return Err(Error::IndexCorrupt(format!(
                "active pointer names missing table '{}'",
                name
            ))
            .into());
        }
        let t = self.conn.open_table(&name).execute().await?;
        validate_schema(&name, t.schema().await?.as_ref())?;
        Ok(Some(t))
    }
}

/// The snapshot table must carry the expected vector column at the expected
/// dimensionality; anything else means the index was written by an
/// incompatible version or damaged on disk.
fn validate_schema(name: &str, schema: &arrow_schema::Schema) -> Result<()> {
    let expected = build_chunks_schema();
    for field in expected.fields() {
        let Ok(actual) = schema.field_with_name(field.name()) else {
            return Err(Error::IndexCorrupt(format!(
                "table '{}' is missing column '{}'",
                name,
                field.name()
            ))
            .into());
        };
        if field.name() == "vector" {
            match actual.data_type() {
                arrow_schema::DataType::FixedSizeList(_, dim) if *dim == EMBEDDING_DIM => {}
                other => {
                    return Err(Error::IndexCorrupt(format!(
                        "table '{}' vector column has type {:?}, expected {}-dim list",
                        name, other, EMBEDDING_DIM
                    ))
                    .into());
                }
            }
        }
    }
    Ok(())
}

async fn insert_rows(t: &Table, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
    let batch = rows_to_record_batch(chunks, embeddings)?;
    let reader =
        Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), build_chunks_schema()));
    t.add(reader).execute().await?;
    Ok(())
}

fn rows_to_record_batch(chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<RecordBatch> {
    let mut ids = Vec::new();
    let mut doc_paths = Vec::new();
    let mut headers = Vec::new();
    let mut contents = Vec::new();
    let mut domains = Vec::new();
    let mut sizes = Vec::new();
    let mut indices = Vec::new();
    let mut modified = Vec::new();
    let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::new();
    for (chunk, vector) in chunks.iter().zip(embeddings.iter()) {
        ensure!(
            vector.len() == EMBEDDING_DIM as usize,
            "embedding dim {} does not match schema dim {}",
            vector.len(),
            EMBEDDING_DIM
        );
        ids.push(chunk.id.clone());
        doc_paths.push(chunk.doc_path.clone());
        headers.push(chunk.section_header.clone());
        contents.push(chunk.content.clone());
        domains.push(chunk.domain.clone());
        sizes.push(chunk.size_category.as_str().to_string());
        indices.push(i32::try_from(chunk.chunk_index)?);
        modified.push(chunk.modified_at_ms);
        vectors.push(Some(vector.iter().map(|&x| Some(x)).collect()));
    }
    Ok(RecordBatch::try_new(
        build_chunks_schema(),
        vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(doc_paths)),
            Arc::new(StringArray::from(headers)),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(domains)),
            Arc::new(StringArray::from(sizes)),
            Arc::new(Int32Array::from(indices)),
            Arc::new(TimestampMillisecondArray::from(modified)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(
                vectors.into_iter(),
                EMBEDDING_DIM,
            )),
        ],
    )?)
}

fn decode_batch(batch: &RecordBatch, with_distance: bool, out: &mut Vec<DecodedRow>) -> Result<()> {
    let ids = string_col(batch, "id")?;
    let doc_paths = string_col(batch, "doc_path")?;
    let headers = string_col(batch, "section_header")?;
    let contents = string_col(batch, "content")?;
    let domains = string_col(batch, "domain")?;
    let sizes = string_col(batch, "size_category")?;
    let indices = batch
        .column_by_name("chunk_index")
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| Error::IndexCorrupt("chunk_index column missing".to_string()))?;
    let modified = batch
        .column_by_name("modified_at")
        .and_then(|c| c.as_any().downcast_ref::<TimestampMillisecondArray>())
        .ok_or_else(|| Error::IndexCorrupt("modified_at column missing".to_string()))?;
    let vectors = batch
        .column_by_name("vector")
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
        .ok_or_else(|| Error::IndexCorrupt("vector column missing".to_string()))?;
    let distances = if with_distance {
        Some(
            batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow!("_distance column missing from vector search"))?,
        )
    } else {
        None
    };

    for i in 0..batch.num_rows() {
        let size_category = SizeCategory::parse(sizes.value(i)).ok_or_else(|| {
            Error::IndexCorrupt(format!("unknown size_category '{}'", sizes.value(i)))
        })?;
        let chunk = Chunk {
            id: ids.value(i).to_string(),
            doc_path: doc_paths.value(i).to_string(),
            section_header: headers.value(i).to_string(),
            content: contents.value(i).to_string(),
            domain: domains.value(i).to_string(),
            size_category,
            chunk_index: usize::try_from(indices.value(i))?,
            modified_at_ms: modified.value(i),
        };
        let list = vectors.value(i);
        let vector = list
            .as_primitive::<arrow_array::types::Float32Type>()
            .values()
            .iter()
            .copied()
            .collect::<Vec<f32>>();
        let distance = distances.map_or(0.0, |d| d.value(i));
        out.push(DecodedRow { chunk, distance, vector });
    }
    Ok(())
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| Error::IndexCorrupt(format!("{} column missing", name)).into())
}
