//! # Scoped RAG CLI (`srag`)
//!
//! ## Usage
//!
//! ```bash
//! srag --config ./config/srag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `srag search "<query>" --context <kind:id>...` | Retrieve across contexts |
//! | `srag embed "<text>"` | Embed a single text |
//! | `srag check` | Validate config and report credentials |
//!
//! Context kinds: `document` (`doc`), `project`, `knowledge-base` (`kb`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use scoped_rag::{config, embed_cmd, logging, search, status};

/// Scoped RAG CLI: multi-context retrieval over a hosted chunk store.
#[derive(Parser)]
#[command(
    name = "srag",
    about = "Multi-context retrieval over a hosted chunk store",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/srag.toml")]
    config: PathBuf,

    /// Log retrieval decisions at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Retrieve the most relevant chunks across one or more contexts.
    ///
    /// Each context is searched concurrently; results are deduplicated
    /// and ranked by similarity.
    Search {
        /// Natural-language query.
        query: String,

        /// Context to search, as `kind:id` (repeatable).
        /// Examples: `document:3f2a...`, `project:site`, `kb:hvac`.
        #[arg(long = "context", short = 'c', required = true)]
        contexts: Vec<String>,

        /// Maximum results (defaults to `retrieval.default_limit`).
        #[arg(long)]
        limit: Option<i64>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,

        /// Report per-context chunk counts and failures on stderr.
        #[arg(long)]
        explain: bool,
    },

    /// Embed a text with the configured provider and print the vector.
    Embed {
        text: String,

        /// Print the full vector as a JSON array.
        #[arg(long)]
        json: bool,
    },

    /// Validate the configuration and list required environment variables.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Search {
            query,
            contexts,
            limit,
            json,
            explain,
        } => {
            search::run_search(&cfg, &query, &contexts, limit, json, explain).await?;
        }
        Commands::Embed { text, json } => {
            embed_cmd::run_embed(&cfg, &text, json).await?;
        }
        Commands::Check => {
            status::run_check(&cfg)?;
        }
    }

    Ok(())
}
