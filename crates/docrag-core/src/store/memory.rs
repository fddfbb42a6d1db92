//! In-memory [`DocumentStore`] for tests and ephemeral servers.
//!
//! Wraps [`StoreTables`] in a `std::sync::RwLock`. Nothing survives the
//! process.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{Document, DocumentChunk};

use super::{DocumentStore, StoreTables};

#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<StoreTables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreTables>> {
        self.tables
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreTables>> {
        self.tables
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn add_document(&self, document: &Document, chunks: &[DocumentChunk]) -> Result<()> {
        self.write()?.insert(document, chunks)?;
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        self.write()?.remove(id);
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.read()?.documents.get(id).cloned())
    }

    async fn get_all_documents(&self) -> Result<Vec<Document>> {
        Ok(self.read()?.documents())
    }

    async fn get_all_chunks(&self) -> Result<Vec<DocumentChunk>> {
        Ok(self.read()?.chunks())
    }

    async fn get_document_count(&self) -> Result<usize> {
        Ok(self.read()?.documents.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{chunk, document};

    #[tokio::test]
    async fn test_add_and_enumerate() {
        let store = InMemoryStore::new();
        store
            .add_document(&document("d1", "one"), &[chunk("c1", "d1", 0, "alpha")])
            .await
            .unwrap();
        store
            .add_document(
                &document("d2", "two"),
                &[chunk("c2", "d2", 0, "beta"), chunk("c3", "d2", 1, "gamma")],
            )
            .await
            .unwrap();

        assert_eq!(store.get_document_count().await.unwrap(), 2);
        let titles: Vec<String> = store
            .get_all_documents()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.title)
            .collect();
        assert_eq!(titles, vec!["one", "two"]);
        assert_eq!(store.get_all_chunks().await.unwrap().len(), 3);
        assert_eq!(
            store.get_document("d2").await.unwrap().map(|d| d.title),
            Some("two".to_string())
        );
    }

    #[tokio::test]
    async fn test_delete_cascades_to_chunks() {
        let store = InMemoryStore::new();
        store
            .add_document(&document("d1", "one"), &[chunk("c1", "d1", 0, "alpha")])
            .await
            .unwrap();
        store
            .add_document(&document("d2", "two"), &[chunk("c2", "d2", 0, "beta")])
            .await
            .unwrap();

        store.delete_document("d1").await.unwrap();

        let chunks = store.get_all_chunks().await.unwrap();
        assert!(chunks.iter().all(|c| c.document_id != "d1"));
        assert_eq!(chunks.len(), 1);
        assert!(store.get_document("d1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_unknown_is_noop() {
        let store = InMemoryStore::new();
        store
            .add_document(&document("d1", "one"), &[])
            .await
            .unwrap();
        store.delete_document("missing").await.unwrap();
        assert_eq!(store.get_document_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rejected_write_leaves_store_unchanged() {
        let store = InMemoryStore::new();
        let result = store
            .add_document(&document("d1", "one"), &[chunk("c1", "other", 0, "alpha")])
            .await;
        assert!(result.is_err());
        assert_eq!(store.get_document_count().await.unwrap(), 0);
        assert!(store.get_all_chunks().await.unwrap().is_empty());
    }
}
