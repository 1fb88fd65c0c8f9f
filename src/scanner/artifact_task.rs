use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::maven::artifact_filter::ArtifactFilter;
use crate::maven::artifact_provider::{ArtifactProvider, ResolvedArtifact};
use crate::maven::coordinates::MavenArtifactRef;
use crate::scanner::change_listing::{ChangeListing, ChangedArtifact};

/// What became of an artifact's own file
#[derive(Debug)]
pub enum FetchOutcome {
    Resolved(ResolvedArtifact),
    /// fetching was attempted and failed
    Failed,
    /// fetching was not attempted, either because the scan does not fetch files or because the
    ///  artifact is a POM
    Skipped,
}

/// A changed artifact with its model (and possibly its file) available locally
#[derive(Debug)]
pub struct ResolutionResult {
    /// as listed, i.e. before the repository resolved its version
    pub artifact: MavenArtifactRef,
    pub last_modified: DateTime<Utc>,
    pub model: ResolvedArtifact,
    pub binary: FetchOutcome,
}

#[derive(Debug)]
pub enum TaskMessage {
    Result(ResolutionResult),
    /// sent once after the last result; a channel that closes without it means the task failed
    Last,
}

/// Producer side of a scan: fetches models and files for changed artifacts and hands them to
///  the consumer through a bounded channel, which throttles fetching when the consumer falls
///  behind.
///
/// Problems with individual artifacts are logged and the artifact is skipped. The task only
///  returns an error if the consumer went away.
pub struct ArtifactTask {
    pub listing: ChangeListing,
    pub provider: Arc<dyn ArtifactProvider>,
    pub filter: Arc<ArtifactFilter>,
    pub fetch_artifacts: bool,
    pub sender: Sender<TaskMessage>,
    pub cancel: CancellationToken,
}

impl ArtifactTask {
    pub async fn run(self) -> anyhow::Result<()> {
        let ArtifactTask { listing, provider, filter, fetch_artifacts, sender, cancel } = self;
        let mut artifacts = listing.artifacts;
        let worker = Worker { provider, filter, fetch_artifacts };

        loop {
            let step = async {
                let changed = match artifacts.next().await {
                    None => return Ok(false),
                    Some(Ok(changed)) => changed,
                    Some(Err(e)) => {
                        warn!("Skipping unreadable change listing entry: {:#}", e);
                        return Ok(true);
                    }
                };

                if let Some(result) = worker.resolve(changed).await {
                    sender.send(TaskMessage::Result(result)).await
                        .map_err(|_| anyhow!("artifact channel was closed by the receiver"))?;
                }
                Ok::<bool, anyhow::Error>(true)
            };

            let more = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Artifact task was interrupted");
                    // the consumer may be waiting, but the task must not block on a full channel
                    if sender.try_send(TaskMessage::Last).is_err() {
                        debug!("could not send end marker after interruption");
                    }
                    return Ok(());
                }
                more = step => more?,
            };
            if !more {
                break;
            }
        }

        trace!("change listing exhausted");
        sender.send(TaskMessage::Last).await
            .map_err(|_| anyhow!("artifact channel was closed by the receiver"))?;
        Ok(())
    }
}

struct Worker {
    provider: Arc<dyn ArtifactProvider>,
    filter: Arc<ArtifactFilter>,
    fetch_artifacts: bool,
}

impl Worker {
    async fn resolve(&self, changed: ChangedArtifact) -> Option<ResolutionResult> {
        let artifact = changed.artifact;
        if !self.filter.matches(&artifact) {
            debug!("Skipping {}", artifact);
            return None;
        }

        let model = match self.provider.get_artifact(&artifact.model_ref()).await {
            Ok(model) => model,
            Err(e) => {
                warn!("Cannot fetch model for {}, skipping it: {}", artifact, e);
                return None;
            }
        };

        let binary = if self.fetch_artifacts && !artifact.is_pom() {
            match self.provider.get_artifact(&artifact).await {
                Ok(resolved) => FetchOutcome::Resolved(resolved),
                Err(e) => {
                    warn!("Cannot fetch {}: {}", artifact, e);
                    FetchOutcome::Failed
                }
            }
        }
        else {
            FetchOutcome::Skipped
        };

        Some(ResolutionResult {
            artifact,
            last_modified: changed.last_modified,
            model,
            binary,
        })
    }
}
