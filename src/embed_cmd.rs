//! `embed` command: run text through the configured provider chain.
//!
//! Useful for checking credentials and endpoints: the output names the
//! provider that answered, or `fallback` when none did.

use anyhow::Result;

use crate::config::Config;
use crate::embedding::create_embedder;
use docrag_core::embedding::Embedder;

/// Number of leading components printed.
const PREVIEW_LEN: usize = 8;

pub async fn run_embed(config: &Config, text: &str) -> Result<()> {
    let embedder = create_embedder(&config.embedding)?;
    let names = embedder.provider_names();
    let embedding = embedder.embed(text).await?;

    let preview: Vec<String> = embedding
        .vector
        .iter()
        .take(PREVIEW_LEN)
        .map(|v| format!("{:.4}", v))
        .collect();

    println!("embed");
    if names.is_empty() {
        println!("  providers: (none configured)");
    } else {
        println!("  providers: {}", names.join(" -> "));
    }
    println!("  source: {}", embedding.source);
    println!("  dimension: {}", embedding.vector.len());
    println!("  preview: [{}, ...]", preview.join(", "));
    Ok(())
}
