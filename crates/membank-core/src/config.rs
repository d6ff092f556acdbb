//! Typed configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env
//! vars, then extracts everything into one `Settings` struct that is
//! validated once at load time. Nothing reads configuration by string key
//! at runtime.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::types::WeightVector;

/// Knobs for the adaptive weighting step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnSettings {
    /// Fraction of the observed signal advantage applied per update.
    pub rate: f32,
    /// Hard cap on how far one update may move a weight.
    pub max_step: f32,
    pub min_weight: f32,
    pub max_weight: f32,
    /// How far back `recent()` looks when gathering usage records.
    pub window_days: i64,
}

impl Default for LearnSettings {
    fn default() -> Self {
        Self { rate: 0.1, max_step: 0.05, min_weight: 0.05, max_weight: 0.95, window_days: 30 }
    }
}

/// Every recognized option with its default. Validated once; components
/// receive the struct (or slices of it) at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root directory of the markdown corpus.
    pub corpus_dir: String,
    /// LanceDB uri holding the chunk snapshots, embedding cache and meta table.
    pub index_dir: String,
    /// Append-only JSONL usage log.
    pub usage_log: String,
    /// JSON file holding the current weight vector.
    pub weights_file: String,

    /// Upper bound on chunk text length, in characters.
    pub max_chunk_chars: usize,
    /// Chunks shorter than this are tagged small.
    pub small_chunk_chars: usize,
    /// Chunks at least this long are tagged large.
    pub large_chunk_chars: usize,

    /// Minimum combined score a result must reach. Empirically tuned for
    /// short queries; treat as corpus-dependent, not a constant.
    pub relevance_threshold: f32,
    pub semantic_weight: f32,
    pub lexical_weight: f32,
    /// Multiplier applied when a chunk's domain matches the requested filter.
    pub domain_boost: f32,
    /// Multiplier applied, on request, to recently modified documents.
    pub recency_boost: f32,
    pub recency_window_days: i64,

    /// Default number of results returned.
    pub top_k: usize,
    /// Candidate pool size = requested limit * this multiplier.
    pub candidate_multiplier: usize,
    pub embed_batch_size: usize,

    pub learn: LearnSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            corpus_dir: "./memory-bank".to_string(),
            index_dir: "./.membank/index".to_string(),
            usage_log: "./.membank/usage.jsonl".to_string(),
            weights_file: "./.membank/weights.json".to_string(),
            max_chunk_chars: 2000,
            small_chunk_chars: 500,
            large_chunk_chars: 1500,
            relevance_threshold: 0.35,
            semantic_weight: 0.7,
            lexical_weight: 0.3,
            domain_boost: 1.5,
            recency_boost: 1.2,
            recency_window_days: 14,
            top_k: 5,
            candidate_multiplier: 10,
            embed_batch_size: 16,
            learn: LearnSettings::default(),
        }
    }
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let settings: Self = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.small_chunk_chars >= self.large_chunk_chars {
            return Err(Error::InvalidConfig(
                "small_chunk_chars must be below large_chunk_chars".to_string(),
            ));
        }
        if self.large_chunk_chars > self.max_chunk_chars {
            return Err(Error::InvalidConfig(
                "large_chunk_chars must not exceed max_chunk_chars".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.relevance_threshold) {
            return Err(Error::InvalidConfig("relevance_threshold must be in [0, 1]".to_string()));
        }
        if self.semantic_weight <= 0.0 || self.lexical_weight <= 0.0 {
            return Err(Error::InvalidConfig("signal weights must be positive".to_string()));
        }
        if self.domain_boost < 1.0 || self.recency_boost < 1.0 {
            return Err(Error::InvalidConfig("boost multipliers must be >= 1.0".to_string()));
        }
        if self.top_k == 0 || self.candidate_multiplier == 0 || self.embed_batch_size == 0 {
            return Err(Error::InvalidConfig(
                "top_k, candidate_multiplier and embed_batch_size must be positive".to_string(),
            ));
        }
        let learn = &self.learn;
        if learn.min_weight >= learn.max_weight {
            return Err(Error::InvalidConfig("learn.min_weight must be below learn.max_weight".to_string()));
        }
        if learn.rate <= 0.0 || learn.max_step <= 0.0 {
            return Err(Error::InvalidConfig("learn.rate and learn.max_step must be positive".to_string()));
        }
        Ok(())
    }

    /// Weight vector used when no persisted weights exist yet (or after the
    /// weight store has been deleted).
    pub fn default_weights(&self) -> WeightVector {
        WeightVector::new(self.semantic_weight, self.lexical_weight)
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

/// Resolve a possibly relative path against a given base directory after
/// expansion. If `p` is absolute, it's returned as-is.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() {
        p
    } else {
        base.join(p)
    }
}
