//! Multi-signal ranking over the vector store.
//!
//! Semantic similarity does the heavy lifting; a lexical presence signal
//! rescues exact-term matches the embedding underrates; domain and recency
//! boosts multiply the weighted base so they amplify relevant hits rather
//! than rescue irrelevant ones. Everything below the relevance threshold is
//! dropped rather than padded back in.

use anyhow::Result;
use chrono::Utc;
use tracing::debug;

use membank_core::config::Settings;
use membank_core::types::{ComponentScores, SearchOptions, SearchResult, WeightVector};
use membank_vector::store::{Candidate, ChunkStore};
use membank_vector::vectorize::Vectorizer;

pub struct Ranker<'a> {
    store: &'a ChunkStore,
    vectorizer: &'a Vectorizer,
    weights: WeightVector,
    settings: &'a Settings,
}

impl<'a> Ranker<'a> {
    pub fn new(
        store: &'a ChunkStore,
        vectorizer: &'a Vectorizer,
        weights: WeightVector,
        settings: &'a Settings,
    ) -> Self {
        Self { store, vectorizer, weights, settings }
    }

    pub async fn search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let limit = opts.limit.unwrap_or(self.settings.top_k);

        let query_vec = self.vectorizer.embed_one(self.store.connection(), query).await?;
        let pool = limit.saturating_mul(self.settings.candidate_multiplier).max(limit);
        // Domain scoping happens at retrieval time: the store prefilters the
        // vector search, so domain chunks surface even when another domain
        // dominates the neighbourhood.
        let candidates = self.store.candidates(&query_vec, pool, opts.domain.as_deref()).await?;
        debug!(candidates = candidates.len(), pool, "vector search complete");

        let now_ms = Utc::now().timestamp_millis();
        Ok(rank_candidates(&candidates, query, self.weights, self.settings, opts, now_ms))
    }
}

/// The pure ranking stage: score, threshold-filter, order and truncate a
/// candidate pool. Split from `search` so the scoring arithmetic can be
/// checked against exact candidate inputs without a store.
pub fn rank_candidates(
    candidates: &[Candidate],
    query: &str,
    weights: WeightVector,
    settings: &Settings,
    opts: &SearchOptions,
    now_ms: i64,
) -> Vec<SearchResult> {
    let limit = opts.limit.unwrap_or(settings.top_k);
    let threshold = opts.threshold.unwrap_or(settings.relevance_threshold);

    let mut results: Vec<SearchResult> = candidates
        .iter()
        .filter(|c| match &opts.domain {
            Some(d) => &c.chunk.domain == d,
            None => true,
        })
        .map(|c| score(c, query, weights, settings, opts, now_ms))
        .filter(|r| r.combined >= threshold)
        .collect();

    results.sort_by(|a, b| {
        b.combined
            .partial_cmp(&a.combined)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.doc_path.cmp(&b.chunk.doc_path))
            .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
    });
    results.truncate(limit);
    results
}

fn score(
    candidate: &Candidate,
    query: &str,
    weights: WeightVector,
    settings: &Settings,
    opts: &SearchOptions,
    now_ms: i64,
) -> SearchResult {
    // Cosine distance d in [0, 2] maps to similarity in [-1, 1]; fold
    // into [0, 1] so the weighted sum stays comparable to the threshold.
    let semantic = (((1.0 - candidate.distance) + 1.0) / 2.0).clamp(0.0, 1.0);
    let lexical = lexical_score(query, &candidate.chunk.content);

    let mut boost = 1.0f32;
    if opts.domain.as_deref() == Some(candidate.chunk.domain.as_str()) {
        boost *= settings.domain_boost;
    }
    if opts.recency {
        let window_ms = settings.recency_window_days * 24 * 60 * 60 * 1000;
        if now_ms - candidate.chunk.modified_at_ms <= window_ms {
            boost *= settings.recency_boost;
        }
    }

    let base = weights.semantic * semantic + weights.lexical * lexical;
    SearchResult {
        chunk: candidate.chunk.clone(),
        combined: base * boost,
        scores: ComponentScores { semantic, lexical, boost },
    }
}

/// Fraction of unique query terms present in the chunk text,
/// case-insensitive. A presence signal, not a frequency one: repeating a
/// term in the chunk does not inflate the score.
pub fn lexical_score(query: &str, content: &str) -> f32 {
    let content_lower = content.to_lowercase();
    let query_lower = query.to_lowercase();
    let mut terms: Vec<&str> = query_lower.split_whitespace().collect();
    terms.sort_unstable();
    terms.dedup();
    if terms.is_empty() {
        return 0.0;
    }
    let hits = terms.iter().filter(|t| content_lower.contains(**t)).count();
    hits as f32 / terms.len() as f32
}
