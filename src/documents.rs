//! Document management commands: `add`, `list`, `delete`.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tracing::warn;

use crate::config::Config;
use crate::service::RagService;

/// Ingest each file in turn. A file that cannot be read or extracted is
/// reported and skipped; the command fails at the end if any file did.
pub async fn run_add(config: &Config, files: &[PathBuf]) -> Result<()> {
    let service = RagService::from_config(config).await?;
    let mut failed = 0usize;

    for path in files {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let result = async {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            service.add_document(&filename, &bytes).await
        }
        .await;

        match result {
            Ok(report) => {
                println!("added {}", path.display());
                println!("  id: {}", report.document_id);
                println!("  title: {}", report.title);
                println!("  chunks: {}", report.chunk_count);
                if report.fallback_embeddings > 0 {
                    println!("  fallback embeddings: {}", report.fallback_embeddings);
                }
                if report.missing_embeddings > 0 {
                    println!("  missing embeddings: {}", report.missing_embeddings);
                }
            }
            Err(e) => {
                warn!(file = %path.display(), error = %format!("{:#}", e), "ingest failed");
                eprintln!("Error: {}: {:#}", path.display(), e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} file(s) failed", failed, files.len());
    }
    Ok(())
}

pub async fn run_list(config: &Config) -> Result<()> {
    let service = RagService::from_config(config).await?;
    let documents = service.list_documents().await?;

    if documents.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    for doc in &documents {
        println!("{}", doc.id);
        println!("    title: {}", doc.title);
        println!("    file: {} ({}, {} bytes)", doc.filename, doc.file_type, doc.size);
        println!(
            "    uploaded: {}",
            doc.uploaded_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!();
    println!("{} document(s)", documents.len());
    Ok(())
}

pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let service = RagService::from_config(config).await?;
    if !service.delete_document(id).await? {
        bail!("Document not found: {}", id);
    }
    println!("Deleted document {}", id);
    Ok(())
}
