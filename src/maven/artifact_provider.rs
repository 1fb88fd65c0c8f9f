use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::maven::coordinates::MavenArtifactRef;

/// An artifact that was made available in the local file system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    /// The coordinates as resolved by the repository, e.g. with a snapshot version replaced by
    ///  the timestamped version of its latest deployment
    pub artifact: MavenArtifactRef,
    pub file: PathBuf,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0} not found in repository")]
    NotFound(MavenArtifactRef),
    #[error("request for {0} rejected, repository is failing")]
    Rejected(MavenArtifactRef),
    #[error("cannot fetch {0}: {1:#}")]
    Transport(MavenArtifactRef, anyhow::Error),
}

/// Provides artifacts of a single repository as local files.
#[async_trait]
pub trait ArtifactProvider: Send + Sync {
    async fn get_artifact(&self, artifact_ref: &MavenArtifactRef) -> Result<ResolvedArtifact, FetchError>;

    /// The local directory holding fetched files in Maven2 layout
    fn repository_root(&self) -> &Path;
}
