use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use arti_catalog::config::ScannerConfig;
use arti_catalog::graph::transient_store::TransientGraphStore;
use arti_catalog::maven::effective_model::ValidationPolicy;
use arti_catalog::scanner::change_listing::JsonLinesChangeListing;
use arti_catalog::scanner::repository_scanner::MavenRepositoryScanner;

#[derive(Parser)]
#[command(name = "arti-catalog")]
#[command(about = "Catalogs changed artifacts of a Maven repository as a dependency graph", long_about = None)]
struct Cli {
    /// Base URL of the repository. User info in the URL is sent as basic authentication.
    #[arg(env = "ARTI_CATALOG_REPOSITORY")]
    repository: String,

    /// Changed artifacts, one JSON object per line: {"path": "<path in repository>", "lastModified": <epoch millis>}
    #[arg(short, long)]
    changes: PathBuf,

    /// JSON config file; flags override its settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fetch and scan artifact files, not only their POMs
    #[arg(long)]
    scan_artifacts: bool,

    /// Delete fetched files after scanning them
    #[arg(long)]
    discard_artifacts: bool,

    /// Include patterns 'group:artifact:type[:classifier]', comma separated
    #[arg(long, value_delimiter = ',')]
    include: Vec<String>,

    /// Exclude patterns 'group:artifact:type[:classifier]', comma separated
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Root directory for local copies of repositories
    #[arg(long, env = "ARTI_CATALOG_DIRECTORY")]
    directory: Option<PathBuf>,

    /// Fall back to raw models on any validation error, not only on fatal ones
    #[arg(long)]
    strict: bool,

    /// Where to write the resulting graph as JSON, stdout if omitted
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl Cli {
    async fn scanner_config(&self) -> anyhow::Result<ScannerConfig> {
        let mut config = match &self.config {
            Some(path) => ScannerConfig::read(path).await?,
            None => ScannerConfig::default(),
        };

        if self.scan_artifacts {
            config.scan_artifacts = true;
        }
        if self.discard_artifacts {
            config.keep_artifacts = false;
        }
        if !self.include.is_empty() {
            config.filter.includes = self.include.clone();
        }
        if !self.exclude.is_empty() {
            config.filter.excludes = self.exclude.clone();
        }
        if let Some(directory) = &self.directory {
            config.directory = Some(directory.clone());
        }
        if self.strict {
            config.validation = ValidationPolicy::Strict;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run(Cli::parse()).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.scanner_config().await?;
    let scanner = MavenRepositoryScanner::new(config);

    let cancel = scanner.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Stopping scan");
            cancel.cancel();
        }
    });

    let listing = JsonLinesChangeListing::new(&cli.changes);
    let mut store = TransientGraphStore::new();
    let count = scanner.scan(&cli.repository, &listing, &mut store).await?;
    info!("Cataloged {} changed artifacts", count);

    let json = store.to_json()?;
    match &cli.output {
        Some(path) => tokio::fs::write(path, json).await
            .with_context(|| format!("cannot write graph to {}", path.display()))?,
        None => println!("{}", json),
    }
    Ok(())
}
