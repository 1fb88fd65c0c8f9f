use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use sha1::{Digest, Sha1};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::trace;

use crate::graph::model::ContentDescriptor;
use crate::maven::coordinates::MavenArtifactRef;

/// Inspects the file of an artifact
#[async_trait]
pub trait ContentScanner: Send + Sync {
    async fn scan(&self, artifact_ref: &MavenArtifactRef, file: &Path) -> anyhow::Result<ContentDescriptor>;
}

/// Records size and SHA-1 checksum
#[derive(Default)]
pub struct ChecksumContentScanner;

#[async_trait]
impl ContentScanner for ChecksumContentScanner {
    async fn scan(&self, artifact_ref: &MavenArtifactRef, file: &Path) -> anyhow::Result<ContentDescriptor> {
        let f = File::open(file).await
            .with_context(|| format!("cannot open {} for {}", file.display(), artifact_ref))?;
        let mut data = ReaderStream::new(f);

        let mut size = 0u64;
        let mut hasher: Sha1 = Default::default();
        while let Some(bytes) = data.next().await {
            let bytes = bytes?;
            size += bytes.len() as u64;
            hasher.update(&bytes);
        }

        let sha1 = hex::encode(hasher.finalize());
        trace!("scanned {}: {} bytes, sha1 {}", artifact_ref, size, sha1);
        Ok(ContentDescriptor { size, sha1 })
    }
}
