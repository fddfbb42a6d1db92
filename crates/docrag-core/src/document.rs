//! Upload handling: file type detection, text extraction, and document
//! construction with derived title and description.

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Document, DocumentMetadata, FileType};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{0} extraction is not supported; convert the file to txt or md")]
    Unsupported(FileType),
}

const DESCRIPTION_MAX_CHARS: usize = 200;
const TITLE_SCAN_LINES: usize = 10;
const TITLE_PREVIEW_CHARS: usize = 50;

/// Classify a file by extension (case-insensitive). Unknown extensions are
/// treated as plain text.
pub fn detect_file_type(filename: &str) -> FileType {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => FileType::Pdf,
        "md" | "markdown" => FileType::Md,
        "docx" => FileType::Docx,
        _ => FileType::Txt,
    }
}

/// Decode an upload into text.
///
/// Plain text and markdown are decoded as UTF-8, replacing invalid
/// sequences. Binary formats are rejected.
pub fn extract_text(file_type: FileType, bytes: &[u8]) -> Result<String, ExtractError> {
    match file_type {
        FileType::Txt | FileType::Md => Ok(String::from_utf8_lossy(bytes).into_owned()),
        FileType::Pdf | FileType::Docx => Err(ExtractError::Unsupported(file_type)),
    }
}

/// Assemble a new [`Document`] with a fresh id and the current time.
pub fn build_document(filename: &str, content: String, size: u64) -> Document {
    let title = derive_title(filename, &content);
    let description = describe(&content);

    Document {
        id: Uuid::new_v4().to_string(),
        title,
        filename: filename.to_string(),
        file_type: detect_file_type(filename),
        size,
        uploaded_at: Utc::now(),
        metadata: Some(DocumentMetadata {
            description: Some(description),
            ..Default::default()
        }),
        content,
    }
}

/// Filename stem, unless it is empty or a placeholder; otherwise a title
/// found in the first lines of the content.
pub fn derive_title(filename: &str, content: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base,
    }
    .trim();

    if !stem.is_empty() && !stem.eq_ignore_ascii_case("untitled") {
        return stem.to_string();
    }

    for line in content.lines().take(TITLE_SCAN_LINES) {
        let trimmed = line.trim();
        if trimmed.starts_with('#') {
            let heading = trimmed.trim_start_matches('#').trim();
            if !heading.is_empty() {
                return heading.to_string();
            }
        }
        let len = trimmed.chars().count();
        if len > 5 && len < 100 && !trimmed.contains('\t') {
            return trimmed.to_string();
        }
    }

    let preview: String = content.trim().chars().take(TITLE_PREVIEW_CHARS).collect();
    format!("{}...", preview)
}

/// Whitespace-collapsed summary, cut to 200 characters.
pub fn describe(content: &str) -> String {
    let collapsed = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > DESCRIPTION_MAX_CHARS {
        let cut: String = collapsed.chars().take(DESCRIPTION_MAX_CHARS).collect();
        format!("{}...", cut)
    } else {
        collapsed
    }
}
