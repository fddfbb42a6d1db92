//! # docrag CLI
//!
//! The `docrag` binary manages the document store, runs retrieval from the
//! terminal, and starts the HTTP API used by chat frontends.
//!
//! ## Usage
//!
//! ```bash
//! docrag --config ./config/docrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docrag init` | Create the store (SQLite schema or empty JSON file) |
//! | `docrag add <FILE>...` | Extract, chunk, embed, and store files |
//! | `docrag list` | List stored documents |
//! | `docrag delete <ID>` | Delete a document and its chunks |
//! | `docrag search "<query>"` | Retrieve the most relevant chunks |
//! | `docrag context "<query>"` | Print the chat prompt context block |
//! | `docrag embed "<text>"` | Embed text with the configured chain |
//! | `docrag serve` | Start the HTTP server |
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docrag::{config, documents, embed_cmd, search, server, service};

/// docrag: document retrieval for RAG chat.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docrag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docrag",
    about = "docrag: document retrieval for RAG chat",
    version,
    long_about = "docrag chunks and embeds uploaded documents, stores them in SQLite or a \
    JSON file, and retrieves the most relevant chunks for a chat query by vector similarity \
    with a keyword fallback."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the configured store.
    ///
    /// Idempotent: running it against an existing store changes nothing.
    Init,

    /// Add one or more files (txt, md) to the store.
    Add {
        /// Files to ingest.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// List stored documents.
    List,

    /// Delete a document and all of its chunks.
    Delete {
        /// Document id.
        id: String,
    },

    /// Retrieve the chunks most relevant to a query.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results (defaults to `[retrieval].top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Print the full retrieval context as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the prompt context block a chat backend would receive.
    Context {
        query: String,

        /// Defaults to `[retrieval].context_results`.
        #[arg(long)]
        max_results: Option<usize>,
    },

    /// Embed a piece of text and report which source produced the vector.
    Embed { text: String },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            service::init_store(&cfg).await?;
            println!("Store initialized ({:?}).", cfg.store.backend);
        }
        Commands::Add { files } => {
            documents::run_add(&cfg, &files).await?;
        }
        Commands::List => {
            documents::run_list(&cfg).await?;
        }
        Commands::Delete { id } => {
            documents::run_delete(&cfg, &id).await?;
        }
        Commands::Search {
            query,
            top_k,
            json,
        } => {
            search::run_search(&cfg, &query, top_k, json).await?;
        }
        Commands::Context { query, max_results } => {
            search::run_context(&cfg, &query, max_results).await?;
        }
        Commands::Embed { text } => {
            embed_cmd::run_embed(&cfg, &text).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
