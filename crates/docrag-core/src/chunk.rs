//! Overlapping text chunker.
//!
//! Splits document content into [`DocumentChunk`]s of at most
//! `max_chunk_size` characters (except for single oversized paragraphs,
//! which are kept whole). Two modes:
//!
//! - **Paragraph mode** (default): accumulate blank-line separated
//!   paragraphs into a buffer; when the next paragraph would overflow,
//!   emit the buffer and seed the next one with its trailing `overlap`
//!   characters.
//! - **Window mode**: fixed windows of `max_chunk_size` characters that
//!   advance by `max_chunk_size - overlap`.
//!
//! All sizes and offsets count Unicode scalar values, not bytes.
//!
//! # Example
//!
//! ```rust
//! use docrag_core::chunk::{chunk_document, ChunkOptions};
//!
//! let chunks = chunk_document("# Intro\n\nFirst paragraph.", &ChunkOptions::default());
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_index, 0);
//! assert_eq!(chunks[0].metadata.as_ref().unwrap().section.as_deref(), Some("Intro"));
//! ```

use std::sync::OnceLock;

use regex::Regex;
use uuid::Uuid;

use crate::models::{ChunkMetadata, DocumentChunk};

/// Chunking parameters. All values are in characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOptions {
    pub max_chunk_size: usize,
    pub overlap: usize,
    pub preserve_paragraphs: bool,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_chunk_size: 1000,
            overlap: 200,
            preserve_paragraphs: true,
        }
    }
}

/// Longest line (in characters) still accepted as a chunk title.
const TITLE_MAX_CHARS: usize = 100;

/// Characters kept when a title has to be cut from the body.
const TITLE_PREVIEW_CHARS: usize = 50;

fn paragraph_break() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n").expect("valid paragraph regex"))
}

/// Split `content` into chunks with contiguous indices starting at 0.
///
/// Chunk ids are fresh UUIDs and `document_id` is left empty; the caller
/// assigns it once the parent document exists. Empty or whitespace-only
/// content produces no chunks.
pub fn chunk_document(content: &str, options: &ChunkOptions) -> Vec<DocumentChunk> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    if options.preserve_paragraphs {
        chunk_by_paragraphs(content, options)
    } else {
        chunk_by_window(content, options)
    }
}

fn chunk_by_paragraphs(content: &str, options: &ChunkOptions) -> Vec<DocumentChunk> {
    let max = options.max_chunk_size.max(1);
    let overlap = options.overlap;

    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut buffer_len = 0usize;
    let mut start = 0usize;

    for paragraph in paragraph_break()
        .split(content)
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        let para_len = paragraph.chars().count();

        if buffer_len + para_len <= max {
            if !buffer.is_empty() {
                buffer.push_str("\n\n");
                buffer_len += 2;
            }
            buffer.push_str(paragraph);
            buffer_len += para_len;
            continue;
        }

        if buffer.is_empty() {
            buffer.push_str(paragraph);
            buffer_len = para_len;
            continue;
        }

        chunks.push(make_chunk(&buffer, chunks.len(), start, start + buffer_len));

        if overlap > 0 && buffer_len > overlap {
            let tail = char_suffix(&buffer, overlap).to_string();
            start += buffer_len - overlap;
            buffer = format!("{}\n\n{}", tail, paragraph);
            buffer_len = overlap + 2 + para_len;
        } else {
            start += buffer_len;
            buffer = paragraph.to_string();
            buffer_len = para_len;
        }
    }

    if !buffer.is_empty() {
        chunks.push(make_chunk(&buffer, chunks.len(), start, start + buffer_len));
    }

    chunks
}

fn chunk_by_window(content: &str, options: &ChunkOptions) -> Vec<DocumentChunk> {
    let max = options.max_chunk_size.max(1);
    let step = max.saturating_sub(options.overlap).max(1);

    // Byte offset of every char boundary, including the end of the string.
    let boundaries: Vec<usize> = content
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(content.len()))
        .collect();
    let total = boundaries.len() - 1;

    (0..total)
        .step_by(step)
        .enumerate()
        .map(|(index, start)| {
            let end = (start + max).min(total);
            let slice = &content[boundaries[start]..boundaries[end]];
            make_chunk(slice, index, start, end)
        })
        .collect()
}

/// The last `n` characters of `s`.
fn char_suffix(s: &str, n: usize) -> &str {
    let skip = s.chars().count().saturating_sub(n);
    let at = s.char_indices().nth(skip).map(|(i, _)| i).unwrap_or(s.len());
    &s[at..]
}

fn make_chunk(text: &str, index: usize, start: usize, end: usize) -> DocumentChunk {
    let content = text.trim().to_string();
    let metadata = ChunkMetadata {
        title: Some(extract_title(&content)),
        section: Some(extract_section(&content).unwrap_or_default()),
    };

    DocumentChunk {
        id: Uuid::new_v4().to_string(),
        document_id: String::new(),
        content,
        chunk_index: index,
        start_index: start,
        end_index: end,
        embedding: None,
        metadata: Some(metadata),
    }
}

fn strip_heading(line: &str) -> &str {
    line.trim_start_matches('#').trim_start()
}

/// First heading or first short non-empty line; otherwise a 50-char preview.
pub fn extract_title(content: &str) -> String {
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('#') {
            return strip_heading(trimmed).to_string();
        }
        if !trimmed.is_empty() && trimmed.chars().count() < TITLE_MAX_CHARS {
            return trimmed.to_string();
        }
    }
    let preview: String = content.chars().take(TITLE_PREVIEW_CHARS).collect();
    format!("{}...", preview)
}

/// Text of the first markdown heading, if any.
pub fn extract_section(content: &str) -> Option<String> {
    content
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with('#'))
        .map(|line| strip_heading(line).to_string())
}
