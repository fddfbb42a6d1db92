//! `search` and `context` commands.
//!
//! Both run the retrieval engine against the configured store. `search`
//! prints ranked chunks (or the whole [`RagContext`] with `--json`);
//! `context` prints the prompt block a chat backend would prepend to the
//! user's question.
//!
//! [`RagContext`]: docrag_core::models::RagContext

use anyhow::Result;

use crate::config::Config;
use crate::service::RagService;

/// Longest excerpt printed per result, in characters.
const EXCERPT_CHARS: usize = 160;

pub async fn run_search(config: &Config, query: &str, top_k: Option<usize>, json: bool) -> Result<()> {
    let service = RagService::from_config(config).await?;
    let ctx = service.search(query, top_k).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&ctx)?);
        return Ok(());
    }

    if ctx.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!(
        "{} result(s) via {} search in {}ms",
        ctx.total_results, ctx.strategy, ctx.search_time
    );
    println!();

    for (i, result) in ctx.results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} ({})",
            i + 1,
            result.score,
            result.document.title,
            result.relevance
        );
        println!("    chunk: {}", result.chunk.chunk_index);
        println!("    excerpt: \"{}\"", excerpt(&result.chunk.content));
        println!("    document: {}", result.document.id);
        println!();
    }

    Ok(())
}

pub async fn run_context(config: &Config, query: &str, max_results: Option<usize>) -> Result<()> {
    let service = RagService::from_config(config).await?;
    let context = service.chat_context(query, max_results).await;

    if context.is_empty() {
        println!("No results.");
    } else {
        println!("{}", context);
    }
    Ok(())
}

fn excerpt(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= EXCERPT_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(EXCERPT_CHARS).collect();
    format!("{}...", cut)
}
