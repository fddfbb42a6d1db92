//! Data types shared by every docrag component.
//!
//! All types serialize with camelCase field names so they can be exchanged
//! with browser clients and persisted as JSON without a mapping layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Source format of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Txt,
    Md,
    Pdf,
    Docx,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Txt => "txt",
            FileType::Md => "md",
            FileType::Pdf => "pdf",
            FileType::Docx => "docx",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "txt" => Ok(FileType::Txt),
            "md" => Ok(FileType::Md),
            "pdf" => Ok(FileType::Pdf),
            "docx" => Ok(FileType::Docx),
            other => anyhow::bail!("unknown file type: {}", other),
        }
    }
}

/// Optional descriptive metadata attached to a [`Document`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An uploaded source text.
///
/// Created once at ingestion and never mutated; deleted as a unit together
/// with its chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// UUID generated at ingestion.
    pub id: String,
    pub title: String,
    /// Full extracted text.
    pub content: String,
    pub filename: String,
    pub file_type: FileType,
    /// Original upload size in bytes.
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DocumentMetadata>,
}

/// Per-chunk metadata derived from the chunk's own text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

/// A contiguous slice of a document's text, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChunk {
    pub id: String,
    pub document_id: String,
    /// Trimmed text of the slice.
    pub content: String,
    /// 0-based, contiguous within one document.
    pub chunk_index: usize,
    /// Character offset into the parent content (may overlap the previous chunk).
    pub start_index: usize,
    pub end_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ChunkMetadata>,
}

impl DocumentChunk {
    /// The chunk's embedding, if present and non-empty.
    pub fn vector(&self) -> Option<&[f32]> {
        self.embedding.as_deref().filter(|v| !v.is_empty())
    }
}

/// Relevance tier attached to every [`SearchResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    High,
    Medium,
    Low,
}

impl Relevance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relevance::High => "high",
            Relevance::Medium => "medium",
            Relevance::Low => "low",
        }
    }
}

impl fmt::Display for Relevance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ranked chunk together with its parent document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub chunk: DocumentChunk,
    pub document: Document,
    /// Non-negative; keyword scores may exceed 1.
    pub score: f64,
    pub relevance: Relevance,
}

/// Which retrieval path produced a [`RagContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    Vector,
    Keyword,
    EmptyCorpus,
    /// The store could not be read; no search ran.
    StoreUnavailable,
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SearchStrategy::Vector => "vector",
            SearchStrategy::Keyword => "keyword",
            SearchStrategy::EmptyCorpus => "empty_corpus",
            SearchStrategy::StoreUnavailable => "store_unavailable",
        })
    }
}

/// The outcome of one retrieval call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagContext {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub total_results: usize,
    /// Wall time of the search in milliseconds.
    pub search_time: u64,
    pub strategy: SearchStrategy,
}

impl RagContext {
    pub fn empty(query: &str, search_time: u64) -> Self {
        Self {
            query: query.to_string(),
            results: Vec::new(),
            total_results: 0,
            search_time,
            strategy: SearchStrategy::EmptyCorpus,
        }
    }
}
