//! The adaptive weighting step and its persisted weight store.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

use membank_core::config::LearnSettings;
use membank_core::types::{UsageRecord, WeightVector};

/// One adaptation step. Pure: reads records, returns the adjusted vector.
///
/// Only records with a known selection contribute; for each, the selected
/// result's per-signal score is compared against the mean of the other
/// returned results. A positive mean advantage for a signal means that
/// signal was pointing at what the user actually wanted, so its weight
/// grows (and vice versa). No selections at all is a strict no-op.
pub fn update_weights(
    current: WeightVector,
    records: &[UsageRecord],
    settings: &LearnSettings,
) -> WeightVector {
    let mut sem_advantage = 0.0f32;
    let mut lex_advantage = 0.0f32;
    let mut counted = 0usize;

    for record in records {
        let Some(selected_id) = &record.selected else {
            continue;
        };
        let Some(selected) = record.results.iter().find(|r| &r.id == selected_id) else {
            continue;
        };
        let others: Vec<_> = record.results.iter().filter(|r| &r.id != selected_id).collect();
        if others.is_empty() {
            continue;
        }
        let n = others.len() as f32;
        let mean_sem = others.iter().map(|r| r.semantic).sum::<f32>() / n;
        let mean_lex = others.iter().map(|r| r.lexical).sum::<f32>() / n;
        sem_advantage += selected.semantic - mean_sem;
        lex_advantage += selected.lexical - mean_lex;
        counted += 1;
    }

    if counted == 0 {
        return current;
    }
    let n = counted as f32;
    let sem_step = (settings.rate * sem_advantage / n).clamp(-settings.max_step, settings.max_step);
    let lex_step = (settings.rate * lex_advantage / n).clamp(-settings.max_step, settings.max_step);

    WeightVector::new(current.semantic + sem_step, current.lexical + lex_step)
        .clamped(settings.min_weight, settings.max_weight)
}

/// Persisted weight vector, one small JSON file.
///
/// Saves go through a temp file in the same directory followed by an atomic
/// rename, so a crash mid-save leaves the previous weights intact. A missing
/// or unreadable file falls back to the supplied defaults; deleting the file
/// resets adaptation.
pub struct WeightStore {
    path: PathBuf,
}

impl WeightStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn load_or(&self, defaults: WeightVector) -> WeightVector {
        let Ok(text) = fs::read_to_string(&self.path) else {
            return defaults;
        };
        match serde_json::from_str::<WeightVector>(&text) {
            Ok(w) => w,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable weight store, using defaults");
                defaults
            }
        }
    }

    pub fn save(&self, weights: WeightVector) -> Result<()> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("temp file in {}", parent.display()))?;
        serde_json::to_writer_pretty(&mut tmp, &weights)?;
        tmp.write_all(b"\n")?;
        tmp.persist(&self.path)
            .with_context(|| format!("persisting weights to {}", self.path.display()))?;
        Ok(())
    }
}
