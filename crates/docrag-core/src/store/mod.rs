//! Storage abstraction for docrag.
//!
//! The [`DocumentStore`] trait is everything ingestion and retrieval need
//! from persistence. Backends are selected once at startup: the in-memory
//! [`memory::InMemoryStore`] lives here, the JSON file and SQLite stores
//! live in the app crate.
//!
//! Every backend enforces the same write rules, checked by
//! [`validate_chunks`] and [`StoreTables`]:
//!
//! - every chunk's `document_id` equals the id of the document it is
//!   written with;
//! - a chunk id never belongs to two documents;
//! - a document's chunk indexes are exactly `0..n`, without gaps or repeats;
//! - writing a document replaces all of its previous chunks, and deleting
//!   it removes them, as one all-or-nothing operation.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::models::{Document, DocumentChunk};

/// Write rejected by a store's integrity checks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("chunk {chunk_id} references document {actual}, expected {expected}")]
    DocumentMismatch {
        chunk_id: String,
        expected: String,
        actual: String,
    },
    #[error("chunk id {0} appears more than once in the same write")]
    DuplicateChunk(String),
    #[error("chunk id {chunk_id} already belongs to document {owner}")]
    ChunkOwnedElsewhere { chunk_id: String, owner: String },
    #[error("chunk indexes of document {document_id} must run 0..n; index {missing} is absent")]
    NonContiguousIndex { document_id: String, missing: usize },
}

/// Abstract storage backend.
///
/// Enumeration returns documents in insertion order and chunks grouped by
/// document in `chunk_index` order.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert or replace a document together with its full chunk set.
    async fn add_document(&self, document: &Document, chunks: &[DocumentChunk]) -> Result<()>;

    /// Remove a document and all of its chunks. Unknown ids are a no-op.
    async fn delete_document(&self, id: &str) -> Result<()>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    async fn get_all_documents(&self) -> Result<Vec<Document>>;

    async fn get_all_chunks(&self) -> Result<Vec<DocumentChunk>>;

    async fn get_document_count(&self) -> Result<usize>;
}

/// Check that a chunk batch belongs to `document` and has unique ids.
pub fn validate_chunks(document: &Document, chunks: &[DocumentChunk]) -> Result<(), StoreError> {
    let mut seen = HashSet::new();
    for chunk in chunks {
        if chunk.document_id != document.id {
            return Err(StoreError::DocumentMismatch {
                chunk_id: chunk.id.clone(),
                expected: document.id.clone(),
                actual: chunk.document_id.clone(),
            });
        }
        if !seen.insert(chunk.id.as_str()) {
            return Err(StoreError::DuplicateChunk(chunk.id.clone()));
        }
    }

    let mut indexes: Vec<usize> = chunks.iter().map(|c| c.chunk_index).collect();
    indexes.sort_unstable();
    if let Some(missing) = indexes.iter().enumerate().position(|(i, idx)| i != *idx) {
        return Err(StoreError::NonContiguousIndex {
            document_id: document.id.clone(),
            missing,
        });
    }
    Ok(())
}

/// Ordered document and chunk tables keyed by id.
///
/// Shared by the in-memory and JSON file backends; serializes to the
/// persisted layout `{ "documents": {id: ..}, "chunks": {id: ..} }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreTables {
    #[serde(default)]
    pub documents: IndexMap<String, Document>,
    #[serde(default)]
    pub chunks: IndexMap<String, DocumentChunk>,
}

impl StoreTables {
    /// Validate and apply a document write. On error nothing changes.
    pub fn insert(&mut self, document: &Document, chunks: &[DocumentChunk]) -> Result<(), StoreError> {
        validate_chunks(document, chunks)?;
        for chunk in chunks {
            if let Some(existing) = self.chunks.get(&chunk.id) {
                if existing.document_id != document.id {
                    return Err(StoreError::ChunkOwnedElsewhere {
                        chunk_id: chunk.id.clone(),
                        owner: existing.document_id.clone(),
                    });
                }
            }
        }

        self.chunks.retain(|_, c| c.document_id != document.id);
        self.documents.insert(document.id.clone(), document.clone());

        let mut ordered: Vec<&DocumentChunk> = chunks.iter().collect();
        ordered.sort_by_key(|c| c.chunk_index);
        for chunk in ordered {
            self.chunks.insert(chunk.id.clone(), chunk.clone());
        }
        Ok(())
    }

    /// Remove a document and its chunks. Returns whether the document existed.
    pub fn remove(&mut self, id: &str) -> bool {
        let existed = self.documents.shift_remove(id).is_some();
        self.chunks.retain(|_, c| c.document_id != id);
        existed
    }

    pub fn documents(&self) -> Vec<Document> {
        self.documents.values().cloned().collect()
    }

    /// Chunks grouped by document (in document order), each group in
    /// `chunk_index` order.
    pub fn chunks(&self) -> Vec<DocumentChunk> {
        let mut out = Vec::with_capacity(self.chunks.len());
        for doc_id in self.documents.keys() {
            out.extend(
                self.chunks
                    .values()
                    .filter(|c| &c.document_id == doc_id)
                    .cloned(),
            );
        }
        out
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{TimeZone, Utc};

    use crate::models::{Document, DocumentChunk, FileType};

    pub fn document(id: &str, title: &str) -> Document {
        Document {
            id: id.to_string(),
            title: title.to_string(),
            content: format!("content of {}", title),
            filename: format!("{}.txt", title),
            file_type: FileType::Txt,
            size: 42,
            uploaded_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap(),
            metadata: None,
        }
    }

    pub fn chunk(id: &str, document_id: &str, index: usize, content: &str) -> DocumentChunk {
        DocumentChunk {
            id: id.to_string(),
            document_id: document_id.to_string(),
            content: content.to_string(),
            chunk_index: index,
            start_index: 0,
            end_index: content.chars().count(),
            embedding: None,
            metadata: None,
        }
    }
}
