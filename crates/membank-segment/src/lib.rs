//! Structural segmentation of markdown documents into retrievable chunks.
//!
//! Documents split on second-level `## ` headings. The `# ` document title
//! is navigation metadata and never enters chunk text; section headings do,
//! because they carry searchable context. Sections over the size bound are
//! re-split at paragraph boundaries; fragments that still exceed the bound
//! are dropped and counted, never truncated.

use std::fs;
use std::path::Path;

use anyhow::Result;
use tracing::{debug, warn};
use walkdir::WalkDir;

use membank_core::config::Settings;
use membank_core::types::{chunk_id, Chunk, Document, SizeCategory};

pub struct Segmenter {
    max_chunk_chars: usize,
    small_chunk_chars: usize,
    large_chunk_chars: usize,
}

/// Output of one `segment` call. `skipped_sections` counts sections that
/// contributed zero chunks because no paragraph split could get them under
/// the size bound; non-fatal, surfaced for observability.
#[derive(Debug, Default)]
pub struct Segmented {
    pub chunks: Vec<Chunk>,
    pub skipped_sections: usize,
}

struct Section {
    header: String,
    body: Vec<String>,
}

impl Segmenter {
    pub fn new(max_chunk_chars: usize, small_chunk_chars: usize, large_chunk_chars: usize) -> Self {
        Self { max_chunk_chars, small_chunk_chars, large_chunk_chars }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.max_chunk_chars, settings.small_chunk_chars, settings.large_chunk_chars)
    }

    /// Split one document version into chunks. Finite, single pass.
    pub fn segment(&self, doc: &Document) -> Segmented {
        let mut out = Segmented::default();
        for section in split_sections(&doc.content) {
            self.emit_section(doc, &section, &mut out);
        }
        if out.chunks.is_empty() {
            debug!(path = %doc.path, skipped = out.skipped_sections, "document produced no chunks");
        }
        out
    }

    fn emit_section(&self, doc: &Document, section: &Section, out: &mut Segmented) {
        let body = section.body.join("\n");
        let body = body.trim_matches('\n');
        if section.header.is_empty() && body.trim().is_empty() {
            return;
        }

        let full = compose(&section.header, body);
        if char_len(&full) <= self.max_chunk_chars {
            self.push_chunk(doc, &section.header, full, out);
            return;
        }

        // Re-split the oversized body at blank-line paragraph boundaries,
        // packing greedily under the bound (minus the prepended header).
        let budget = self
            .max_chunk_chars
            .saturating_sub(char_len(&section.header) + 1)
            .max(1);
        let mut fragments: Vec<String> = Vec::new();
        let mut dropped = 0usize;
        let mut current = String::new();
        for para in body.split("\n\n") {
            let para = para.trim_matches('\n');
            if para.trim().is_empty() {
                continue;
            }
            if char_len(para) > budget {
                dropped += 1;
                continue;
            }
            let joined = char_len(&current) + if current.is_empty() { 0 } else { 2 } + char_len(para);
            if !current.is_empty() && joined > budget {
                fragments.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(para);
        }
        if !current.is_empty() {
            fragments.push(current);
        }

        if fragments.is_empty() {
            out.skipped_sections += 1;
            warn!(
                path = %doc.path,
                header = %section.header,
                "section exceeds chunk size bound and has no usable paragraph split; skipping"
            );
            return;
        }
        if dropped > 0 {
            warn!(path = %doc.path, header = %section.header, dropped, "dropped oversized paragraphs");
        }
        for fragment in fragments {
            let content = compose(&section.header, &fragment);
            self.push_chunk(doc, &section.header, content, out);
        }
    }

    fn push_chunk(&self, doc: &Document, header: &str, content: String, out: &mut Segmented) {
        let chunk_index = out.chunks.len();
        let size_category =
            SizeCategory::categorize(char_len(&content), self.small_chunk_chars, self.large_chunk_chars);
        out.chunks.push(Chunk {
            id: chunk_id(&doc.path, chunk_index),
            doc_path: doc.path.clone(),
            section_header: header.to_string(),
            content,
            domain: doc.domain.clone(),
            size_category,
            chunk_index,
            modified_at_ms: doc.modified_at_ms,
        });
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn compose(header: &str, body: &str) -> String {
    if header.is_empty() {
        body.to_string()
    } else if body.is_empty() {
        header.to_string()
    } else {
        format!("{}\n{}", header, body)
    }
}

/// Split a document into its preamble (empty header) and `## ` sections.
/// The first `# ` line is the document title and is excluded entirely.
fn split_sections(content: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut current = Section { header: String::new(), body: Vec::new() };
    let mut title_seen = false;

    for line in content.lines() {
        if !title_seen && line.starts_with("# ") {
            title_seen = true;
            continue;
        }
        if !title_seen && !line.trim().is_empty() {
            // First substantive line is not a title; nothing to exclude.
            title_seen = true;
        }
        if line.starts_with("## ") {
            sections.push(current);
            current = Section { header: line.trim().to_string(), body: Vec::new() };
        } else {
            current.body.push(line.to_string());
        }
    }
    sections.push(current);
    sections
}

/// Walk a corpus root and load every markdown document, sorted by path.
/// Dot-directories (e.g. `.git`, `.membank`) are skipped. Unreadable or
/// blank files are absorbed with a warning; they never abort the scan.
pub fn scan_corpus(root: &Path) -> Result<Vec<Document>> {
    let mut documents = Vec::new();
    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("md") {
            continue;
        }
        let content = match read_document(path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable document");
                continue;
            }
        };
        if content.trim().is_empty() {
            warn!(path = %path.display(), "skipping empty document");
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(path);
        let doc_path = relative.to_string_lossy().to_string();
        documents.push(Document {
            path: doc_path,
            content,
            modified_at_ms: file_mtime_ms(path),
            domain: domain_of(relative),
        });
    }
    documents.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(documents)
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

fn read_document(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(_) => Ok(String::from_utf8_lossy(&fs::read(path)?).to_string()),
    }
}

fn file_mtime_ms(path: &Path) -> i64 {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Coarse namespace tag: the first directory component of the relative
/// path, or "misc" for root-level documents.
fn domain_of(relative: &Path) -> String {
    relative
        .parent()
        .and_then(|p| p.components().next())
        .and_then(|c| c.as_os_str().to_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "misc".to_string())
}
