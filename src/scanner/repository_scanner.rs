use std::sync::Arc;

use anyhow::{anyhow, Context};
use chrono::{Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ScannerConfig;
use crate::error::ScanError;
use crate::graph::model::{Node, NodeKey, RepositoryNode};
use crate::graph::store::{get_or_create, GraphStore};
use crate::maven::artifact_provider::ArtifactProvider;
use crate::maven::remote_repo::RemoteMavenRepo;
use crate::scanner::change_listing::ChangeListingService;
use crate::scanner::pipeline::ScanPipeline;

/// Incrementally catalogs Maven repositories: each scan picks up the changes since the previous
///  scan of the same repository.
///
/// A scanner stops for good when its cancellation token is cancelled: the running scan ends early
///  and later scans return right away, both without moving the repository's cursor. Use a new
///  scanner to scan again.
pub struct MavenRepositoryScanner {
    config: ScannerConfig,
    cancel: CancellationToken,
}

impl MavenRepositoryScanner {
    pub fn new(config: ScannerConfig) -> MavenRepositoryScanner {
        MavenRepositoryScanner {
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Scans a remote repository, fetching into `<directory>/<repository id>`. Credentials in
    ///  the URL are used for authentication but are not part of the repository's identity.
    pub async fn scan(&self, url: &str, listing_service: &dyn ChangeListingService, store: &mut dyn GraphStore) -> Result<u64, ScanError> {
        let local_directory = self.config.local_directory()
            .join(repository_id(url).map_err(ScanError::Configuration)?);
        debug!("local repository for {} is {}", url, local_directory.display());

        let repo = RemoteMavenRepo::new(url, local_directory)
            .map_err(ScanError::Configuration)?;
        let repository_url = repo.base_uri().to_string();
        self.scan_with_provider(&repository_url, Arc::new(repo), listing_service, store).await
    }

    pub async fn scan_with_provider(&self, repository_url: &str, provider: Arc<dyn ArtifactProvider>, listing_service: &dyn ChangeListingService, store: &mut dyn GraphStore) -> Result<u64, ScanError> {
        if self.cancel.is_cancelled() {
            info!("Scanner was stopped, not scanning {}", repository_url);
            return Ok(0);
        }

        let (repository, created) = get_or_create(
            store,
            NodeKey::Repository(repository_url.to_string()),
            || Node::Repository(RepositoryNode { url: repository_url.to_string(), last_update: None }),
        ).map_err(ScanError::Store)?;

        let mut repository_node = match store.get_existing(repository).map_err(ScanError::Store)? {
            Node::Repository(node) => node,
            other => return Err(ScanError::Store(anyhow!("node {} is no repository: {:?}", repository, other))),
        };
        if created {
            info!("Cataloging new repository {}", repository_url);
        }

        let started = Utc::now();
        match repository_node.last_update {
            Some(last_update) => info!("Scanning {} for changes since {}", repository_url, last_update),
            None => info!("Scanning all artifacts of {}", repository_url),
        }
        let listing = listing_service.changes_since(repository_node.last_update).await
            .map_err(ScanError::Listing)?;

        let pipeline = ScanPipeline::new(provider, &self.config)
            .map_err(ScanError::Configuration)?
            .with_cancellation(self.cancel.child_token());
        let summary = pipeline.scan(listing, repository, store).await?;

        if self.cancel.is_cancelled() {
            info!("Scan of {} was interrupted, keeping the previous cursor", repository_url);
            return Ok(summary.processed);
        }

        // artifacts without a file are listed again by the next scan
        let cursor = match summary.unfetched_since {
            Some(unfetched) => {
                warn!("Some files of {} could not be fetched, the next scan starts before {}", repository_url, unfetched);
                started.min(unfetched - Duration::milliseconds(1))
            }
            None => started,
        };
        repository_node.last_update = Some(cursor);
        store.update(repository, Node::Repository(repository_node)).map_err(ScanError::Store)?;
        store.flush().map_err(ScanError::Store)?;
        Ok(summary.processed)
    }
}

/// Identifies a repository in the local file system: 'host[/port]/path'
pub fn repository_id(url: &str) -> anyhow::Result<String> {
    let url = Url::parse(url)
        .with_context(|| format!("invalid repository URL {}", url))?;
    let host = url.host_str()
        .ok_or_else(|| anyhow!("repository URL {} has no host", url))?;

    let mut id = host.to_string();
    if let Some(port) = url.port() {
        id.push('/');
        id.push_str(&port.to_string());
    }
    let path = url.path().trim_matches('/');
    if !path.is_empty() {
        id.push('/');
        id.push_str(path);
    }
    Ok(id)
}
