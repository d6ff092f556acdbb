//! Read-through vectorization: cache hits are served from LanceDB, misses go
//! to the embedder in batches and are written back. Warm and cold paths hand
//! out bit-identical vectors for identical text.

use anyhow::{ensure, Result};
use lancedb::Connection;
use tracing::debug;

use membank_core::traits::Embedder;

use crate::cache::{self, CacheEntry};
use crate::schema::EMBEDDING_DIM;

fn hash_content(s: &str) -> String {
    blake3::hash(s.as_bytes()).to_hex().to_string()
}

pub struct Vectorizer {
    embedder: Box<dyn Embedder>,
    batch_size: usize,
}

impl Vectorizer {
    pub fn new(embedder: Box<dyn Embedder>, batch_size: usize) -> Self {
        Self { embedder, batch_size }
    }

    pub fn embedder_id(&self) -> &str {
        self.embedder.embedder_id()
    }

    /// Embed `texts` in input order, consulting the cache first and writing
    /// fresh vectors back through it.
    pub async fn embed_many(&self, conn: &Connection, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let hashes: Vec<String> = texts.iter().map(|t| hash_content(t)).collect();
        let cached = cache::get_many(conn, self.embedder.embedder_id(), &hashes).await?;

        let mut vectors: Vec<Vec<f32>> = vec![Vec::new(); texts.len()];
        let mut miss_indices = Vec::new();
        for (i, h) in hashes.iter().enumerate() {
            match cached.get(h) {
                Some(v) => vectors[i] = v.clone(),
                None => miss_indices.push(i),
            }
        }
        debug!(total = texts.len(), hits = texts.len() - miss_indices.len(), "cache lookup");

        if miss_indices.is_empty() {
            return Ok(vectors);
        }

        // Flush the cache after every batch, not once at the end: a crash
        // mid-run loses at most one unflushed batch of embeddings.
        for miss_batch in miss_indices.chunks(self.batch_size) {
            let batch_texts: Vec<String> =
                miss_batch.iter().map(|&i| texts[i].clone()).collect();
            let embs = self.embedder.embed_batch(&batch_texts)?;
            ensure!(embs.len() == batch_texts.len(), "embedder returned wrong count");
            let mut new_entries = Vec::with_capacity(miss_batch.len());
            for (j, &i) in miss_batch.iter().enumerate() {
                let v = &embs[j];
                ensure!(
                    v.len() == EMBEDDING_DIM as usize,
                    "dim mismatch: got {} expected {}",
                    v.len(),
                    EMBEDDING_DIM
                );
                vectors[i] = v.clone();
                new_entries.push(CacheEntry {
                    content_hash: hashes[i].clone(),
                    embedder_id: self.embedder.embedder_id().to_string(),
                    vector: v.clone(),
                });
            }
            cache::put_many(conn, &new_entries).await?;
        }
        Ok(vectors)
    }

    /// Single-text convenience used for queries.
    pub async fn embed_one(&self, conn: &Connection, text: &str) -> Result<Vec<f32>> {
        let texts = [text.to_string()];
        let mut vs = self.embed_many(conn, &texts).await?;
        Ok(vs.remove(0))
    }
}
