//! embedscan CLI
//!
//! Lists the distinct source documents stored in a vector database and
//! prints them as JSON on stdout.

mod backends;
mod cli;
mod logging;

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use embedscan::{BackendKind, ListSourcesService, ScanConfig, SourceListing};

use crate::backends::Endpoint;
use crate::cli::{Cli, Commands, SourcesArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_level.as_deref(), cli.log_format, cli.no_color)?;

    match cli.command {
        Commands::Sources(args) => {
            let compact = args.compact;
            let listing = sources(args).await?;
            let json = if compact {
                serde_json::to_string(&listing)?
            } else {
                serde_json::to_string_pretty(&listing)?
            };
            println!("{json}");
        }
        Commands::Backends => {
            for kind in BackendKind::ALL {
                let strategy = kind.scan_strategy().map_or("unsupported", |s| s.as_str());
                println!("{:<14} {strategy}", kind.as_str());
            }
        }
    }
    Ok(())
}

async fn sources(args: SourcesArgs) -> Result<SourceListing> {
    if args.input.is_some() && args.backend != BackendKind::InMemory {
        bail!("--input is only supported with the in-memory backend");
    }

    let config = ScanConfig::builder()
        .page_size(args.page_size)
        .embedding_dimensions(args.dimensions)
        .build()?;
    let endpoint = Endpoint { url: args.url, api_key: args.api_key };
    let store = backends::connect(args.backend, &endpoint, &args.store, args.input.as_deref())
        .await
        .with_context(|| format!("failed to set up the {} backend", args.backend))?;

    let service = match args.strategy {
        Some(strategy) => ListSourcesService::with_strategy(store, strategy, config)?,
        None => ListSourcesService::new(store, config)?,
    };
    tracing::info!(
        backend = %service.backend_kind(),
        store = %args.store,
        strategy = %service.strategy(),
        page_size = service.config().page_size,
        "listing sources"
    );

    let scan = service.list_sources(&args.store);
    let listing = match args.timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), scan)
            .await
            .with_context(|| format!("scan of '{}' timed out after {secs}s", args.store))??,
        None => scan.await?,
    };
    Ok(listing)
}
