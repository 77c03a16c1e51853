//! Policy document ingestion — chunk, embed, and index `.txt` policy files.
//!
//! Files carry a `KEY: VALUE` front-matter block and optional `SECTION:`
//! markers. Airline and authority default from the folder layout when the
//! front matter omits them; airline tags are lowercased so user-detected
//! airlines match index filters.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use triage::ChunkMetadata;

use crate::retrieval::{DocumentIndex, EmbedKind, Embedder, IndexedChunk, RetrievalError};

const DEFAULT_MAX_CHARS: usize = 900;
const DEFAULT_OVERLAP: usize = 150;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("policies directory not found: {0}")]
    MissingDir(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
}

/// Counts reported after an ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub files: usize,
    pub chunks: usize,
}

/// Chunking knobs; defaults match the policy corpus layout.
#[derive(Debug, Clone, Copy)]
pub struct ChunkOptions {
    pub max_chars: usize,
    pub overlap: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

/// Section-aware chunking.
///
/// Strips the front-matter header, keeps `SECTION:` blocks together when
/// they fit, and splits long sections into overlapping windows that prefer
/// to end on a sentence boundary.
pub fn chunk_text(text: &str, opts: ChunkOptions) -> Vec<String> {
    let collapsed = collapse_blank_runs(text.trim());

    // Skip header lines until the first blank line or SECTION marker.
    let lines: Vec<&str> = collapsed.lines().collect();
    let content_start = lines
        .iter()
        .position(|line| line.trim().is_empty() || line.trim_start().starts_with("SECTION:"))
        .unwrap_or(0);
    let body = lines[content_start..].join("\n");
    let body = body.trim();

    let sections: Vec<&str> = if body.contains("SECTION:") {
        split_on_sections(body)
    } else {
        vec![body]
    };

    let mut chunks = Vec::new();
    for section in sections {
        let section = section.trim();
        if section.is_empty() {
            continue;
        }
        if section.chars().count() <= opts.max_chars {
            chunks.push(section.to_string());
            continue;
        }

        // Long section: overlapping windows ending on sentence boundaries
        // when one falls late enough in the window.
        let chars: Vec<char> = section.chars().collect();
        let mut i = 0usize;
        while i < chars.len() {
            let end = (i + opts.max_chars).min(chars.len());
            let mut window: String = chars[i..end].iter().collect();

            if end < chars.len() {
                if let Some(last_period) = window.rfind(". ") {
                    if last_period > opts.max_chars * 7 / 10 {
                        window.truncate(last_period + 1);
                    }
                }
            }

            let window = window.trim().to_string();
            let advance = window.chars().count().saturating_sub(opts.overlap).max(1);
            if !window.is_empty() {
                chunks.push(window);
            }
            i += advance;
        }
    }

    chunks
}

fn collapse_blank_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim_end().to_string()
}

fn split_on_sections(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0usize;
    for (idx, _) in body.match_indices("\nSECTION:") {
        parts.push(&body[start..idx]);
        start = idx + 1;
    }
    parts.push(&body[start..]);
    parts
}

/// Parse `KEY: VALUE` lines from the top of a policy file.
pub fn parse_front_matter(text: &str) -> std::collections::HashMap<String, String> {
    let mut meta = std::collections::HashMap::new();
    for line in text.lines().take(40) {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        if !key.is_empty() {
            meta.insert(key, value.trim().to_string());
        }
    }
    meta
}

/// Airline/authority metadata inferred from the folder layout.
#[derive(Debug, Clone, Default)]
pub struct PathMetadata {
    pub airline: String,
    pub authority: String,
    pub domain: String,
    pub do_not_cite: bool,
}

/// Infer airline / authority from the file's top-level folder.
pub fn infer_path_metadata(file_path: &Path, policies_root: &Path) -> PathMetadata {
    let top = file_path
        .strip_prefix(policies_root)
        .ok()
        .and_then(|rel| rel.components().next())
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .unwrap_or_default();
    let top_lower = top.to_lowercase();

    if top_lower == "_meta" {
        PathMetadata {
            airline: "INTERNAL".to_string(),
            authority: "INTERNAL_META".to_string(),
            domain: "META_POLICY".to_string(),
            do_not_cite: true,
        }
    } else if top_lower.contains("dot") {
        PathMetadata {
            airline: "DOT".to_string(),
            authority: "REGULATOR".to_string(),
            domain: String::new(),
            do_not_cite: false,
        }
    } else {
        PathMetadata {
            airline: top.replace('_', " ").trim().to_string(),
            authority: "AIRLINE".to_string(),
            domain: String::new(),
            do_not_cite: false,
        }
    }
}

pub fn normalize_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "yes" | "1")
}

/// Ingest all `.txt` policy files under `policies_root` into the index.
pub async fn ingest_policies(
    policies_root: &Path,
    embedder: &dyn Embedder,
    index: &dyn DocumentIndex,
    opts: ChunkOptions,
) -> Result<IngestReport, IngestError> {
    if !policies_root.exists() {
        return Err(IngestError::MissingDir(policies_root.to_path_buf()));
    }

    let mut files = collect_txt_files(policies_root)?;
    files.sort();

    let mut report = IngestReport { files: 0, chunks: 0 };

    for file_path in files {
        let raw = match std::fs::read_to_string(&file_path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %file_path.display(), error = %e, "skipping unreadable file");
                continue;
            }
        };
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let front = parse_front_matter(raw);
        let path_md = infer_path_metadata(&file_path, policies_root);

        let do_not_cite = front
            .get("do_not_cite")
            .map(|v| normalize_bool(v))
            .unwrap_or(false)
            || path_md.do_not_cite;

        // Lowercase so "Delta Airlines" from slot extraction matches the
        // stored tag.
        let airline = front
            .get("airline")
            .cloned()
            .unwrap_or_else(|| path_md.airline.clone())
            .trim()
            .to_lowercase();

        let stem = file_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let chunks = chunk_text(raw, opts);
        if chunks.is_empty() {
            continue;
        }

        let embeddings = embedder
            .embed(&chunks, EmbedKind::Passage)
            .await
            .map_err(IngestError::Retrieval)?;

        let indexed: Vec<IndexedChunk> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (text, embedding))| IndexedChunk {
                id: format!("{stem}__{i}__{}", short_uuid()),
                text,
                metadata: ChunkMetadata {
                    source: front
                        .get("source")
                        .cloned()
                        .unwrap_or_else(|| file_path.display().to_string()),
                    url: front.get("url").cloned().unwrap_or_default(),
                    airline: airline.clone(),
                    authority: front
                        .get("authority")
                        .cloned()
                        .unwrap_or_else(|| path_md.authority.clone()),
                    domain: front
                        .get("domain")
                        .cloned()
                        .unwrap_or_else(|| path_md.domain.clone()),
                    chunk_index: i,
                    do_not_cite,
                },
                embedding,
            })
            .collect();

        report.chunks += indexed.len();
        report.files += 1;
        index.upsert(indexed).await?;
    }

    info!(files = report.files, chunks = report.chunks, "ingestion complete");
    Ok(report)
}

fn short_uuid() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn collect_txt_files(root: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|ext| ext == "txt") {
                files.push(path);
            }
        }
    }
    Ok(files)
}
