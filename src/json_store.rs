//! Single-file JSON [`DocumentStore`].
//!
//! The file holds `{ "documents": {id: ..}, "chunks": {id: ..} }`, the same
//! key-value layout a browser client keeps in local storage. Every mutation
//! rewrites the file through a temporary sibling and a rename; the
//! in-memory tables only change once the new file is in place.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use docrag_core::models::{Document, DocumentChunk};
use docrag_core::store::{DocumentStore, StoreTables};

pub struct JsonFileStore {
    path: PathBuf,
    tables: RwLock<StoreTables>,
}

impl JsonFileStore {
    /// Load the store at `path`, starting empty if the file does not exist.
    pub async fn open(path: &Path) -> Result<Self> {
        let tables = match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Failed to parse store file: {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreTables::default(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read store file: {}", path.display()))
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            tables: RwLock::new(tables),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current tables to disk, creating the file if needed.
    pub async fn flush(&self) -> Result<()> {
        let tables = self.tables.read().await;
        self.persist(&tables).await
    }

    async fn persist(&self, tables: &StoreTables) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(tables)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("Failed to write store file: {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace store file: {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn add_document(&self, document: &Document, chunks: &[DocumentChunk]) -> Result<()> {
        let mut tables = self.tables.write().await;
        let mut next = tables.clone();
        next.insert(document, chunks)?;
        self.persist(&next).await?;
        *tables = next;
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        let mut next = tables.clone();
        if !next.remove(id) && next.chunks.len() == tables.chunks.len() {
            return Ok(());
        }
        self.persist(&next).await?;
        *tables = next;
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.tables.read().await.documents.get(id).cloned())
    }

    async fn get_all_documents(&self) -> Result<Vec<Document>> {
        Ok(self.tables.read().await.documents())
    }

    async fn get_all_chunks(&self) -> Result<Vec<DocumentChunk>> {
        Ok(self.tables.read().await.chunks())
    }

    async fn get_document_count(&self) -> Result<usize> {
        Ok(self.tables.read().await.documents.len())
    }
}
