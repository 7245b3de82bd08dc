//! # fusion-rag CLI (`rag`)
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag ingest [paths]` | Segment and index files, print chunk counts |
//! | `rag search "<query>" [paths]` | Hybrid search over the indexed files |
//! | `rag ask "<question>" [paths]` | Retrieve, rerank, and generate an answer |
//! | `rag serve` | Start the HTTP API |
//!
//! With no paths, commands use `[corpus].root`. A missing config file falls
//! back to the built-in defaults.
//!
//! Log verbosity is read from `RAG_LOG` (e.g. `RAG_LOG=fusion_rag_core=debug`).

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use fusion_rag::config::{self, Config};
use fusion_rag::{ingest, search, server};

#[derive(Parser)]
#[command(
    name = "rag",
    about = "Hybrid retrieval, reranking, and answer generation over local documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment and index documents, printing per-file chunk counts.
    Ingest {
        /// Files or directories. Defaults to `[corpus].root`.
        paths: Vec<PathBuf>,

        /// Stored as the `doc_type` metadata of every chunk.
        #[arg(long, default_value = "general")]
        doc_type: String,
    },

    /// Hybrid (BM25 + dense) search.
    Search {
        query: String,

        /// Files or directories to index first. Defaults to `[corpus].root`.
        paths: Vec<PathBuf>,

        /// Number of results. Defaults to `[retrieval].top_k_retrieval`.
        #[arg(long, short)]
        k: Option<usize>,

        /// Dense weight in `[0, 1]`. Defaults to `[retrieval].hybrid_alpha`.
        #[arg(long)]
        alpha: Option<f64>,

        /// Show the dense and lexical components of each score.
        #[arg(long)]
        explain: bool,
    },

    /// Answer a question with retrieved context.
    Ask {
        question: String,

        /// Files or directories to index first. Defaults to `[corpus].root`.
        paths: Vec<PathBuf>,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("RAG_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: &Path) -> Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found; using defaults");
        Ok(Config::minimal())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();
    let cfg = load(&cli.config)?;

    match cli.command {
        Commands::Ingest { paths, doc_type } => {
            ingest::run_ingest(&cfg, &paths, &doc_type).await?;
        }
        Commands::Search {
            query,
            paths,
            k,
            alpha,
            explain,
        } => {
            search::run_search(&cfg, &query, &paths, k, alpha, explain).await?;
        }
        Commands::Ask { question, paths } => {
            search::run_ask(&cfg, &question, &paths).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
