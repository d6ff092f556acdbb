use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::warn;

use membank_core::types::UsageRecord;

/// Append-only JSONL usage log.
///
/// Each `record` call appends one independent line; the mutex serializes
/// appends from concurrent callers within the process so lines never
/// interleave. A corrupt line (truncated write, manual edit) is skipped on
/// read with a warning, never propagated as an error.
pub struct UsageTracker {
    path: PathBuf,
    append_lock: Mutex<()>,
}

impl UsageTracker {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf(), append_lock: Mutex::new(()) }
    }

    pub fn record(&self, record: &UsageRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let _guard = self
            .append_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("usage log lock poisoned"))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening usage log {}", self.path.display()))?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Records from the last `window_days`, oldest first. A missing log file
    /// means no usage yet, not an error.
    pub fn recent(&self, window_days: i64) -> Result<Vec<UsageRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let cutoff_ms = Utc::now().timestamp_millis() - window_days * 24 * 60 * 60 * 1000;
        let file = std::fs::File::open(&self.path)
            .with_context(|| format!("opening usage log {}", self.path.display()))?;
        let mut out = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<UsageRecord>(&line) {
                Ok(record) => {
                    if record.timestamp_ms >= cutoff_ms {
                        out.push(record);
                    }
                }
                Err(e) => {
                    warn!(line = lineno + 1, error = %e, "skipping corrupt usage record");
                }
            }
        }
        Ok(out)
    }
}
