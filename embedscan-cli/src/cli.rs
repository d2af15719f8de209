//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use embedscan::{BackendKind, ScanStrategy};

/// List the source documents stored in a vector database
#[derive(Parser, Debug)]
#[command(name = "embedscan")]
#[command(about = "List the source documents stored in a vector database", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Log filter (error, warn, info, debug, trace or an EnvFilter directive)
    #[arg(long, global = true, env = "RUST_LOG")]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = LogFormat::Pretty,
        env = "EMBEDSCAN_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    /// Disable colored log output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a store and print its distinct sources as JSON
    Sources(SourcesArgs),

    /// Print each backend and the strategy used to scan it
    Backends,
}

#[derive(Args, Debug)]
pub struct SourcesArgs {
    /// Backend kind (pgvector, qdrant, chroma, elasticsearch, opensearch,
    /// ai-search, weaviate, milvus, in-memory)
    #[arg(long, env = "EMBEDSCAN_BACKEND", value_parser = parse_backend)]
    pub backend: BackendKind,

    /// Collection, index, class or table to scan
    #[arg(long, env = "EMBEDSCAN_STORE")]
    pub store: String,

    /// Backend URL or connection string
    #[arg(long, env = "EMBEDSCAN_URL")]
    pub url: Option<String>,

    /// API key or token for the backend
    #[arg(long, env = "EMBEDSCAN_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Segments requested per page
    #[arg(
        long,
        env = "EMBEDSCAN_PAGE_SIZE",
        default_value_t = embedscan::config::DEFAULT_PAGE_SIZE
    )]
    pub page_size: usize,

    /// Embedding dimensionality, used by keyset scans
    #[arg(long, env = "EMBEDSCAN_DIMENSIONS", default_value_t = 0)]
    pub dimensions: usize,

    /// Override the backend's default scan strategy
    #[arg(long, env = "EMBEDSCAN_STRATEGY", value_parser = parse_strategy)]
    pub strategy: Option<ScanStrategy>,

    /// Abandon the scan after this many seconds
    #[arg(long, env = "EMBEDSCAN_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// JSON Lines file of segments to load (in-memory backend only)
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Print the listing on a single line
    #[arg(long)]
    pub compact: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

fn parse_backend(s: &str) -> Result<BackendKind, String> {
    s.parse().map_err(|e: embedscan::ScanError| e.to_string())
}

fn parse_strategy(s: &str) -> Result<ScanStrategy, String> {
    s.parse().map_err(|e: embedscan::ScanError| e.to_string())
}
