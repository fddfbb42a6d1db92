//! Ingestion pipeline: extract, chunk, embed, store.
//!
//! Chunks are embedded one at a time in `chunk_index` order. An embedder
//! error leaves that chunk without a vector; retrieval tolerates missing
//! embeddings, so ingestion still succeeds.

use serde::Serialize;
use tracing::{info, warn};

use crate::chunk::{chunk_document, ChunkOptions};
use crate::document::{build_document, detect_file_type, extract_text, ExtractError};
use crate::embedding::Embedder;
use crate::models::{Document, DocumentChunk};
use crate::store::DocumentStore;

/// Summary of one ingested document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub document_id: String,
    pub title: String,
    pub chunk_count: usize,
    /// Chunks embedded by the local fallback instead of a provider.
    pub fallback_embeddings: usize,
    /// Chunks stored without any embedding.
    pub missing_embeddings: usize,
}

/// A document and its embedded chunks, ready to be written to a store.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    pub document: Document,
    pub chunks: Vec<DocumentChunk>,
    pub report: IngestReport,
}

/// Turn an upload into a [`PreparedDocument`] without touching a store.
pub async fn prepare_document(
    embedder: &dyn Embedder,
    filename: &str,
    bytes: &[u8],
    options: &ChunkOptions,
) -> Result<PreparedDocument, ExtractError> {
    let file_type = detect_file_type(filename);
    let content = extract_text(file_type, bytes)?;
    let document = build_document(filename, content, bytes.len() as u64);

    let mut chunks = chunk_document(&document.content, options);
    let mut fallback_embeddings = 0;
    let mut missing_embeddings = 0;

    for chunk in &mut chunks {
        chunk.document_id = document.id.clone();
        match embedder.embed(&chunk.content).await {
            Ok(embedding) => {
                if embedding.source.is_fallback() {
                    fallback_embeddings += 1;
                }
                chunk.embedding = Some(embedding.vector);
            }
            Err(e) => {
                warn!(
                    document = %document.id,
                    chunk = chunk.chunk_index,
                    error = %e,
                    "chunk embedding failed, storing without vector"
                );
                missing_embeddings += 1;
            }
        }
    }

    let report = IngestReport {
        document_id: document.id.clone(),
        title: document.title.clone(),
        chunk_count: chunks.len(),
        fallback_embeddings,
        missing_embeddings,
    };

    Ok(PreparedDocument {
        document,
        chunks,
        report,
    })
}

/// Prepare an upload and write it to `store`.
pub async fn ingest(
    store: &dyn DocumentStore,
    embedder: &dyn Embedder,
    filename: &str,
    bytes: &[u8],
    options: &ChunkOptions,
) -> anyhow::Result<IngestReport> {
    let prepared = prepare_document(embedder, filename, bytes, options).await?;
    store
        .add_document(&prepared.document, &prepared.chunks)
        .await?;

    info!(
        document = %prepared.report.document_id,
        title = %prepared.report.title,
        chunks = prepared.report.chunk_count,
        fallback = prepared.report.fallback_embeddings,
        "document ingested"
    );
    Ok(prepared.report)
}
