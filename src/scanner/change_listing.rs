use std::path::{Path, PathBuf};
use std::pin::Pin;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_core::Stream;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::maven::coordinates::MavenArtifactRef;
use crate::maven::paths::{parse_maven_path, METADATA_FILE_NAME};

/// files next to artifacts in a repository that are not artifacts themselves
const SIDECAR_EXTENSIONS: [&str; 5] = [".sha1", ".md5", ".sha256", ".sha512", ".asc"];

/// An artifact that was deployed or redeployed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedArtifact {
    pub artifact: MavenArtifactRef,
    pub last_modified: DateTime<Utc>,
}

/// The artifacts that changed since some point in time, in the order in which they should be
///  processed. The stream can be consumed once.
pub struct ChangeListing {
    pub artifacts: Pin<Box<dyn Stream<Item = anyhow::Result<ChangedArtifact>> + Send>>,
    pub estimated_size: Option<u64>,
}

impl ChangeListing {
    pub fn from_vec(artifacts: Vec<ChangedArtifact>) -> ChangeListing {
        let estimated_size = Some(artifacts.len() as u64);
        ChangeListing {
            artifacts: Box::pin(futures::stream::iter(artifacts.into_iter().map(Ok))),
            estimated_size,
        }
    }
}

#[async_trait]
pub trait ChangeListingService: Send + Sync {
    /// `None` lists all artifacts
    async fn changes_since(&self, since: Option<DateTime<Utc>>) -> anyhow::Result<ChangeListing>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeRecord {
    path: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    last_modified: DateTime<Utc>,
}

/// Reads changes from a file with one JSON object per line, e.g.
///
/// ```json
/// {"path": "org/acme/lib/1.0/lib-1.0.jar", "lastModified": 1700000000000}
/// ```
///
/// Paths are relative to the repository root. Entries that are no artifacts (metadata, checksum
///  files) are skipped.
pub struct JsonLinesChangeListing {
    path: PathBuf,
}

impl JsonLinesChangeListing {
    pub fn new(path: impl AsRef<Path>) -> JsonLinesChangeListing {
        JsonLinesChangeListing {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl ChangeListingService for JsonLinesChangeListing {
    async fn changes_since(&self, since: Option<DateTime<Utc>>) -> anyhow::Result<ChangeListing> {
        let content = tokio::fs::read_to_string(&self.path).await
            .with_context(|| format!("cannot read change listing {}", self.path.display()))?;

        let lines: Vec<(usize, String)> = content.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| (i + 1, line.to_string()))
            .collect();
        debug!("change listing {} has {} entries", self.path.display(), lines.len());

        let estimated_size = Some(lines.len() as u64);
        let artifacts = lines.into_iter()
            .filter_map(move |(line_number, line)| parse_line(&line, since)
                .with_context(|| format!("invalid entry in line {}", line_number))
                .transpose());

        Ok(ChangeListing {
            artifacts: Box::pin(futures::stream::iter(artifacts)),
            estimated_size,
        })
    }
}

fn parse_line(line: &str, since: Option<DateTime<Utc>>) -> anyhow::Result<Option<ChangedArtifact>> {
    let record: ChangeRecord = serde_json::from_str(line)?;

    if since.map_or(false, |since| record.last_modified <= since) {
        return Ok(None);
    }
    if record.path.ends_with(METADATA_FILE_NAME) || SIDECAR_EXTENSIONS.iter().any(|ext| record.path.ends_with(ext)) {
        trace!("skipping {}, it is no artifact", record.path);
        return Ok(None);
    }

    Ok(Some(ChangedArtifact {
        artifact: parse_maven_path(&record.path)?,
        last_modified: record.last_modified,
    }))
}

#[cfg(test)]
mod test {
    use futures::StreamExt;
    use super::*;

    const LISTING: &str = r#"{"path": "org/acme/lib/1.0/lib-1.0.pom", "lastModified": 1000}
{"path": "org/acme/lib/1.0/lib-1.0.jar", "lastModified": 2000}
{"path": "org/acme/lib/1.0/lib-1.0.jar.sha1", "lastModified": 2000}

{"path": "org/acme/lib/maven-metadata.xml", "lastModified": 3000}
{"path": "org/acme/lib/2.0-SNAPSHOT/lib-2.0-20230101.120000-3-sources.jar", "lastModified": 4000}
not json
"#;

    fn millis(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    async fn listing(since: Option<DateTime<Utc>>) -> (Option<u64>, Vec<anyhow::Result<ChangedArtifact>>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("changes.jsonl");
        std::fs::write(&path, LISTING).unwrap();

        let listing = JsonLinesChangeListing::new(&path).changes_since(since).await.unwrap();
        (listing.estimated_size, listing.artifacts.collect().await)
    }

    #[tokio::test]
    async fn test_all_changes() {
        let (estimated_size, items) = listing(None).await;
        assert_eq!(estimated_size, Some(6));
        assert_eq!(items.len(), 4);

        let artifacts: Vec<_> = items.iter()
            .filter_map(|i| i.as_ref().ok())
            .collect();
        assert_eq!(artifacts, vec![
            &ChangedArtifact { artifact: MavenArtifactRef::new("org.acme", "lib", "1.0", None, "pom"), last_modified: millis(1000) },
            &ChangedArtifact { artifact: MavenArtifactRef::new("org.acme", "lib", "1.0", None, "jar"), last_modified: millis(2000) },
            &ChangedArtifact { artifact: MavenArtifactRef::new("org.acme", "lib", "2.0-20230101.120000-3", Some("sources"), "jar"), last_modified: millis(4000) },
        ]);

        let error = items[3].as_ref().unwrap_err();
        assert_eq!(error.to_string(), "invalid entry in line 7");
    }

    #[tokio::test]
    async fn test_changes_since() {
        let (_, items) = listing(Some(millis(2000))).await;
        let artifacts: Vec<_> = items.into_iter()
            .filter_map(|i| i.ok())
            .map(|c| c.artifact.id())
            .collect();
        assert_eq!(artifacts, vec!["org.acme:lib:jar:sources:2.0-20230101.120000-3"]);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let service = JsonLinesChangeListing::new("/does/not/exist.jsonl");
        assert!(service.changes_since(None).await.is_err());
    }
}
