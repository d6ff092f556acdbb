//! Domain types shared by the segmenter, index store, ranker and learner.

use serde::{Deserialize, Serialize};

pub type ChunkId = String;

/// A source document as handed to the segmenter.
///
/// Documents are created and updated externally; the retrieval core only
/// reads them. `domain` is the first directory component under the corpus
/// root ("misc" for root-level files).
#[derive(Debug, Clone)]
pub struct Document {
    pub path: String,
    pub content: String,
    pub modified_at_ms: i64,
    pub domain: String,
}

/// Coarse tag derived from the final character count of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeCategory {
    Small,
    Medium,
    Large,
}

impl SizeCategory {
    /// Pure classification of a chunk length against the two thresholds.
    pub fn categorize(chars: usize, small_max: usize, large_min: usize) -> Self {
        if chars < small_max {
            SizeCategory::Small
        } else if chars < large_min {
            SizeCategory::Medium
        } else {
            SizeCategory::Large
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeCategory::Small => "small",
            SizeCategory::Medium => "medium",
            SizeCategory::Large => "large",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "small" => Some(SizeCategory::Small),
            "medium" => Some(SizeCategory::Medium),
            "large" => Some(SizeCategory::Large),
            _ => None,
        }
    }
}

/// The minimal retrievable unit: one section (or section fragment) of a
/// document.
///
/// - `id`: deterministic from `doc_path` + `chunk_index`
/// - `section_header`: nearest enclosing `## ` heading, empty for preamble
/// - `content`: section body with the heading line prepended; never contains
///   the document-level title
/// - `chunk_index`: position within the parent document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub doc_path: String,
    pub section_header: String,
    pub content: String,
    pub domain: String,
    pub size_category: SizeCategory,
    pub chunk_index: usize,
    pub modified_at_ms: i64,
}

/// Deterministic chunk id: 16 hex chars of blake3 over `doc_path:chunk_index`.
pub fn chunk_id(doc_path: &str, chunk_index: usize) -> ChunkId {
    let h = blake3::hash(format!("{}:{}", doc_path, chunk_index).as_bytes());
    h.to_hex().as_str()[..16].to_string()
}

/// Per-call knobs for `search`. Everything absent falls back to `Settings`.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub domain: Option<String>,
    pub limit: Option<usize>,
    pub threshold: Option<f32>,
    pub recency: bool,
}

/// Component scores behind a combined score, kept for explainability and
/// for the usage log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ComponentScores {
    pub semantic: f32,
    pub lexical: f32,
    pub boost: f32,
}

/// One ranked hit. `combined` is `(w_sem * semantic + w_lex * lexical) * boost`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk: Chunk,
    pub combined: f32,
    pub scores: ComponentScores,
}

/// Multipliers applied to the ranking signals. Mutated only by the adaptive
/// weighting step; read by the ranker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    pub semantic: f32,
    pub lexical: f32,
}

impl WeightVector {
    pub fn new(semantic: f32, lexical: f32) -> Self {
        Self { semantic, lexical }
    }

    /// Clamp both signals into the configured band.
    pub fn clamped(self, min: f32, max: f32) -> Self {
        Self { semantic: self.semantic.clamp(min, max), lexical: self.lexical.clamp(min, max) }
    }
}

/// Slim projection of a `SearchResult` stored in the usage log so the
/// adaptive step can replay the ranking decision later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedEntry {
    pub id: ChunkId,
    pub doc_path: String,
    pub semantic: f32,
    pub lexical: f32,
    pub combined: f32,
}

impl RankedEntry {
    pub fn from_result(r: &SearchResult) -> Self {
        Self {
            id: r.chunk.id.clone(),
            doc_path: r.chunk.doc_path.clone(),
            semantic: r.scores.semantic,
            lexical: r.scores.lexical,
            combined: r.combined,
        }
    }
}

/// One appended line of the usage log. Never mutated after the append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub query: String,
    pub timestamp_ms: i64,
    pub domain: Option<String>,
    pub results: Vec<RankedEntry>,
    pub selected: Option<ChunkId>,
}
