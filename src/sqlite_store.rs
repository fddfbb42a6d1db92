//! SQLite-backed [`DocumentStore`].
//!
//! Documents and chunks live in two tables (see [`crate::migrate`]).
//! Embeddings are stored as little-endian f32 BLOBs and metadata as JSON
//! text. Writes and deletes run inside a transaction.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use docrag_core::models::{ChunkMetadata, Document, DocumentChunk, DocumentMetadata, FileType};
use docrag_core::store::{validate_chunks, DocumentStore, StoreError};
use docrag_core::vector::{blob_to_vec, vec_to_blob};

use crate::{db, migrate};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to (creating if needed) the database at `path` and ensure
    /// the schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn document_from_row(row: &SqliteRow) -> Result<Document> {
    let file_type: String = row.try_get("file_type")?;
    let uploaded_at: String = row.try_get("uploaded_at")?;
    let size: i64 = row.try_get("size")?;
    let metadata_json: Option<String> = row.try_get("metadata_json")?;

    Ok(Document {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        filename: row.try_get("filename")?,
        file_type: file_type.parse::<FileType>()?,
        size: u64::try_from(size)?,
        uploaded_at: DateTime::parse_from_rfc3339(&uploaded_at)?.with_timezone(&Utc),
        metadata: metadata_json
            .map(|json| serde_json::from_str::<DocumentMetadata>(&json))
            .transpose()?,
    })
}

fn chunk_from_row(row: &SqliteRow) -> Result<DocumentChunk> {
    let chunk_index: i64 = row.try_get("chunk_index")?;
    let start_index: i64 = row.try_get("start_index")?;
    let end_index: i64 = row.try_get("end_index")?;
    let embedding: Option<Vec<u8>> = row.try_get("embedding")?;
    let metadata_json: Option<String> = row.try_get("metadata_json")?;

    Ok(DocumentChunk {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        content: row.try_get("content")?,
        chunk_index: usize::try_from(chunk_index)?,
        start_index: usize::try_from(start_index)?,
        end_index: usize::try_from(end_index)?,
        embedding: embedding.map(|blob| blob_to_vec(&blob)),
        metadata: metadata_json
            .map(|json| serde_json::from_str::<ChunkMetadata>(&json))
            .transpose()?,
    })
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn add_document(&self, document: &Document, chunks: &[DocumentChunk]) -> Result<()> {
        validate_chunks(document, chunks)?;

        let mut tx = self.pool.begin().await?;

        for chunk in chunks {
            let owner: Option<String> =
                sqlx::query_scalar("SELECT document_id FROM chunks WHERE id = ?")
                    .bind(&chunk.id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if let Some(owner) = owner.filter(|o| o != &document.id) {
                return Err(StoreError::ChunkOwnedElsewhere {
                    chunk_id: chunk.id.clone(),
                    owner,
                }
                .into());
            }
        }

        let metadata_json = document
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, title, content, filename, file_type, size,
                                   uploaded_at, metadata_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                filename = excluded.filename,
                file_type = excluded.file_type,
                size = excluded.size,
                uploaded_at = excluded.uploaded_at,
                metadata_json = excluded.metadata_json
            "#,
        )
        .bind(&document.id)
        .bind(&document.title)
        .bind(&document.content)
        .bind(&document.filename)
        .bind(document.file_type.as_str())
        .bind(i64::try_from(document.size)?)
        .bind(document.uploaded_at.to_rfc3339())
        .bind(&metadata_json)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(&document.id)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            let metadata_json = chunk
                .metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            let blob = chunk.embedding.as_deref().map(vec_to_blob);

            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_index, content, start_index,
                                    end_index, embedding, metadata_json)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(i64::try_from(chunk.chunk_index)?)
            .bind(&chunk.content)
            .bind(i64::try_from(chunk.start_index)?)
            .bind(i64::try_from(chunk.end_index)?)
            .bind(&blob)
            .bind(&metadata_json)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, title, content, filename, file_type, size, uploaded_at, metadata_json \
             FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(document_from_row).transpose()
    }

    async fn get_all_documents(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT id, title, content, filename, file_type, size, uploaded_at, metadata_json \
             FROM documents ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(document_from_row).collect()
    }

    async fn get_all_chunks(&self) -> Result<Vec<DocumentChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.document_id, c.chunk_index, c.content, c.start_index,
                   c.end_index, c.embedding, c.metadata_json
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            ORDER BY d.rowid, c.chunk_index
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(chunk_from_row).collect()
    }

    async fn get_document_count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(count)?)
    }
}
