use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::{ChunkDraft, DocumentType, Meta, NewDocument, Owner};

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:\bn[º°]\.?|\bn[úu]mero:?)\s*(\d+(?:/\d{2,4})?)").expect("valid regex"));
static DATE_LABEL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bdata:\s*(.+)").expect("valid regex"));
static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{2}/\d{2}/\d{4}\b").expect("valid regex"));

const HEADER_LINES: usize = 20;
const SOURCE_EXTENSIONS: [&str; 3] = ["md", "markdown", "txt"];

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_lines: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_chars: 500, overlap_lines: 3 }
    }
}

/// Header fields read from the top of a source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMetadata {
    pub title: Option<String>,
    pub number: Option<String>,
    pub date: Option<String>,
    pub council: Option<String>,
}

/// A document and its chunks, ready to be embedded and ingested.
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    pub document: NewDocument,
    pub chunks: Vec<ChunkDraft>,
}

#[derive(Default)]
pub struct DataProcessor {
    chunking_config: ChunkingConfig,
    owner: Owner,
}

impl DataProcessor {
    pub fn new() -> Self { Self::default() }

    pub fn with_owner(mut self, owner: Owner) -> Self {
        self.owner = owner;
        self
    }

    pub fn with_chunking(mut self, chunking_config: ChunkingConfig) -> Self {
        self.chunking_config = chunking_config;
        self
    }

    pub fn process_directory(&self, data_dir: &Path) -> Result<Vec<ProcessedDocument>> {
        let files = self.list_source_files(data_dir);
        if files.is_empty() {
            info!(dir = %data_dir.display(), "no source documents found");
            return Ok(vec![]);
        }
        let mut docs = Vec::with_capacity(files.len());
        for (file_index, file_path) in files.iter().enumerate() {
            debug!(file = %file_path.display(), n = file_index + 1, total = files.len(), "processing");
            docs.push(self.process_file(file_path, data_dir)?);
        }
        let chunk_count: usize = docs.iter().map(|d| d.chunks.len()).sum();
        info!(files = files.len(), chunks = chunk_count, "processed source documents");
        Ok(docs)
    }

    pub fn process_file(&self, file_path: &Path, data_dir: &Path) -> Result<ProcessedDocument> {
        let content = read_file_content(file_path)?;
        let doc_type = doc_type_from_path(file_path, data_dir);
        let stem = file_path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
        Ok(self.process_text(&content, &file_path.to_string_lossy(), doc_type, &stem))
    }

    /// Build a document from raw text. `fallback_title` is used when the header has no heading.
    pub fn process_text(&self, content: &str, source_path: &str, doc_type: DocumentType, fallback_title: &str) -> ProcessedDocument {
        let header = extract_metadata(content);
        let title = header.title.clone().unwrap_or_else(|| fallback_title.to_string());
        let chunks = self.chunk_content(content, &header, &title, doc_type);
        let document = NewDocument {
            doc_type,
            title,
            number: header.number,
            date: header.date,
            council: header.council,
            source_path: source_path.to_string(),
            content_hash: content_hash(content),
            owner: self.owner.clone(),
        };
        ProcessedDocument { document, chunks }
    }

    /// Section-aware chunking: a markdown heading closes the running chunk, and a
    /// chunk that would exceed `max_chars` is closed carrying its last
    /// `overlap_lines` lines into the next one.
    pub fn chunk_content(&self, content: &str, header: &HeaderMetadata, title: &str, doc_type: DocumentType) -> Vec<ChunkDraft> {
        let mut chunks = Vec::new();
        let mut section = String::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_len = 0usize;
        let mut fresh = 0usize;

        for line in content.lines() {
            let line = line.trim_end();
            if let Some(heading) = heading_text(line) {
                push_chunk(&mut chunks, &current, &section, header, title, doc_type);
                current.clear();
                current_len = 0;
                fresh = 0;
                section = heading.to_string();
            } else if fresh > 0 && current_len + line.len() > self.chunking_config.max_chars {
                push_chunk(&mut chunks, &current, &section, header, title, doc_type);
                let keep = current.len().saturating_sub(self.chunking_config.overlap_lines);
                current.drain(..keep);
                current_len = current.iter().map(|l| l.len() + 1).sum();
                fresh = 0;
            }
            current.push(line);
            current_len += line.len() + 1;
            fresh += 1;
        }
        if fresh > 0 {
            push_chunk(&mut chunks, &current, &section, header, title, doc_type);
        }
        chunks
    }

    fn list_source_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .filter(|p| {
                p.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            })
            .collect();
        files.sort();
        files
    }
}

fn read_file_content(file_path: &Path) -> Result<String> {
    match fs::read_to_string(file_path) {
        Ok(content) => Ok(content),
        Err(_) => Ok(String::from_utf8_lossy(&fs::read(file_path)?).to_string()),
    }
}

fn push_chunk(chunks: &mut Vec<ChunkDraft>, lines: &[&str], section: &str, header: &HeaderMetadata, title: &str, doc_type: DocumentType) {
    let text = lines.join("\n");
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    let mut metadata = Meta::new();
    metadata.insert("doc_type".into(), doc_type.as_str().into());
    metadata.insert("title".into(), title.to_string());
    if !section.is_empty() {
        metadata.insert("section".into(), section.to_string());
    }
    if let Some(n) = &header.number {
        metadata.insert("number".into(), n.clone());
    }
    if let Some(c) = &header.council {
        metadata.insert("council".into(), c.clone());
    }
    chunks.push(ChunkDraft { text: text.to_string(), position: chunks.len(), metadata });
}

fn heading_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with('#') {
        return None;
    }
    let text = trimmed.trim_start_matches('#').trim();
    (!text.is_empty()).then_some(text)
}

/// Document type from the first directory under `root` that names one.
pub fn doc_type_from_path(file_path: &Path, root: &Path) -> DocumentType {
    let relative = file_path.strip_prefix(root).unwrap_or(file_path);
    relative
        .parent()
        .into_iter()
        .flat_map(|p| p.components())
        .filter_map(|c| c.as_os_str().to_str())
        .find_map(|dir| dir.parse::<DocumentType>().ok())
        .unwrap_or(DocumentType::Other)
}

/// Scan the first lines for title, number, date and council.
pub fn extract_metadata(content: &str) -> HeaderMetadata {
    let mut meta = HeaderMetadata::default();
    for line in content.lines().take(HEADER_LINES) {
        let line = line.trim();
        if meta.title.is_none() {
            if let Some(h) = heading_text(line) {
                meta.title = Some(h.to_string());
            }
        }
        if meta.council.is_none() {
            let upper = line.to_uppercase();
            if upper.contains("CONSUNI") {
                meta.council = Some("CONSUNI".into());
            } else if upper.contains("CEPE") {
                meta.council = Some("CEPE".into());
            }
        }
        if meta.number.is_none() {
            if let Some(c) = NUMBER_RE.captures(line) {
                meta.number = Some(c[1].to_string());
            }
        }
        if meta.date.is_none() {
            if let Some(c) = DATE_LABEL_RE.captures(line) {
                meta.date = Some(c[1].trim().to_string());
            } else if let Some(m) = DATE_RE.find(line) {
                meta.date = Some(m.as_str().to_string());
            }
        }
    }
    meta
}

pub fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}
