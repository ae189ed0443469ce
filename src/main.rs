//! Lattice CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "lattice")]
#[command(about = "Local code-intelligence service: knowledge graph, semantic search, MCP tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Project root path (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve MCP tools over stdio (default) or a Unix socket
    Serve {
        /// Unix socket path instead of stdio
        #[arg(long)]
        socket: Option<PathBuf>,

        /// Watch the project root and reindex on changes
        #[arg(short, long)]
        watch: bool,
    },
    /// Index the project and persist the embedding cache
    Index {
        /// Do not recurse into subdirectories
        #[arg(long)]
        no_recursive: bool,
    },
    /// Search the indexed project
    Search {
        query: String,

        /// Number of results
        #[arg(short, default_value = "10")]
        k: usize,

        /// Pure dense search instead of the hybrid pipeline
        #[arg(long)]
        semantic: bool,

        /// Search intent: general, explain, refactor, debug
        #[arg(long, default_value = "general")]
        intent: String,
    },
    /// Show graph and cache statistics
    Stats,
    /// Clear the embedding cache
    ClearCache {
        /// Clear every project's cache, not just this one
        #[arg(long)]
        all: bool,

        /// Clear caches older than this many days
        #[arg(long)]
        older_than: Option<u64>,
    },
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr: stdout carries MCP frames under `serve`.
    let log_level = if cli.verbose { "debug" } else { "info" };
    let ansi = std::env::var_os("NO_COLOR").is_none()
        && std::env::var("TERM").map(|t| t != "dumb").unwrap_or(true);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(format!("lattice={log_level}"))
        }))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(ansi),
        )
        .init();

    tracing::debug!("lattice v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Serve { socket, watch } => commands::serve(cli.root, socket, watch).await,
        Commands::Index { no_recursive } => commands::index(cli.root, !no_recursive).await,
        Commands::Search {
            query,
            k,
            semantic,
            intent,
        } => commands::search(cli.root, query, k, semantic, intent).await,
        Commands::Stats => commands::stats(cli.root).await,
        Commands::ClearCache { all, older_than } => {
            commands::clear_cache(cli.root, all, older_than).await
        }
        Commands::Version => {
            println!("lattice v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
