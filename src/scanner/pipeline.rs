use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::bail;
use chrono::{DateTime, Utc};
use lru::LruCache;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::blob::fs_blob_storage::FsBlobStorage;
use crate::config::ScannerConfig;
use crate::error::ScanError;
use crate::graph::model::*;
use crate::graph::store::GraphStore;
use crate::maven::artifact_filter::ArtifactFilter;
use crate::maven::artifact_provider::{ArtifactProvider, ResolvedArtifact};
use crate::maven::coordinates::{type_extension, MavenArtifactRef, MavenVersion};
use crate::maven::effective_model::EffectiveModelBuilder;
use crate::maven::pom::DocumentKind;
use crate::scanner::artifact_resolver::{ArtifactResolver, RepositoryArtifactResolver};
use crate::scanner::artifact_task::{ArtifactTask, FetchOutcome, ResolutionResult, TaskMessage};
use crate::scanner::change_listing::ChangeListing;
use crate::scanner::content::{ChecksumContentScanner, ContentScanner};
use crate::scanner::gav_resolver::GavResolver;

const CHANNEL_CAPACITY: usize = 500;
const MODEL_CACHE_SIZE: usize = 256;

/// Aborts the artifact task when the scan ends, whichever way it ends
struct AbortOnDrop(AbortHandle);
impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// State that lives for a single scan
struct ScanContext {
    repository: NodeId,
    gav_resolver: GavResolver,
    models: LruCache<String, NodeId>,
    summary: ScanSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// number of changed artifacts that passed the filter and had a readable model
    pub processed: u64,
    /// the earliest modification time of an artifact whose file could not be fetched. It is not
    ///  cataloged, so a cursor for the next scan must stay below this.
    pub unfetched_since: Option<DateTime<Utc>>,
}

/// Catalogs changed artifacts of one repository into a graph store.
///
/// Fetching runs in a separate task (see [ArtifactTask]) while this side builds models and
///  updates the graph, so slow downloads and slow store operations overlap. The store is only
///  ever touched from the task calling [ScanPipeline::scan].
pub struct ScanPipeline {
    provider: Arc<dyn ArtifactProvider>,
    filter: Arc<ArtifactFilter>,
    builder: EffectiveModelBuilder,
    content_scanner: Arc<dyn ContentScanner>,
    artifact_resolver: Arc<dyn ArtifactResolver>,
    local_files: FsBlobStorage,
    fetch_artifacts: bool,
    keep_artifacts: bool,
    flush_interval: u64,
    cancel: CancellationToken,
}

impl ScanPipeline {
    pub fn new(provider: Arc<dyn ArtifactProvider>, config: &ScannerConfig) -> anyhow::Result<ScanPipeline> {
        let filter = config.artifact_filter()?;
        debug!("artifact filter: {}", filter);

        Ok(ScanPipeline {
            builder: EffectiveModelBuilder::new(provider.clone(), config.validation),
            local_files: FsBlobStorage::new(provider.repository_root().to_path_buf()),
            provider,
            filter: Arc::new(filter),
            content_scanner: Arc::new(ChecksumContentScanner),
            artifact_resolver: Arc::new(RepositoryArtifactResolver),
            fetch_artifacts: config.scan_artifacts,
            keep_artifacts: config.keep_artifacts,
            flush_interval: config.flush_interval.max(1),
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_content_scanner(self, content_scanner: Arc<dyn ContentScanner>) -> ScanPipeline {
        ScanPipeline { content_scanner, ..self }
    }

    pub fn with_cancellation(self, cancel: CancellationToken) -> ScanPipeline {
        ScanPipeline { cancel, ..self }
    }

    /// Cancelling the token stops a running scan. Whatever was processed up to that point stays
    ///  in the store.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn scan(&self, listing: ChangeListing, repository: NodeId, store: &mut dyn GraphStore) -> Result<ScanSummary, ScanError> {
        let estimated_size = listing.estimated_size
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".to_string());

        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let task = ArtifactTask {
            listing,
            provider: self.provider.clone(),
            filter: self.filter.clone(),
            fetch_artifacts: self.fetch_artifacts,
            sender,
            cancel: self.cancel.child_token(),
        };
        let handle = tokio::spawn(task.run());
        self.drain(receiver, handle, &estimated_size, repository, store).await
    }

    /// Processes results until the end marker. If the channel closes without one, the producer's
    ///  own outcome decides the error, but only after everything it queued was processed.
    async fn drain(&self, mut receiver: mpsc::Receiver<TaskMessage>, handle: JoinHandle<anyhow::Result<()>>, estimated_size: &str, repository: NodeId, store: &mut dyn GraphStore) -> Result<ScanSummary, ScanError> {
        let started = Instant::now();
        let _abort_task = AbortOnDrop(handle.abort_handle());

        let mut context = ScanContext {
            repository,
            gav_resolver: GavResolver::new(repository),
            models: LruCache::new(NonZeroUsize::new(MODEL_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN)),
            summary: ScanSummary::default(),
        };

        loop {
            let message = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    warn!("Interrupted while waiting for artifact result");
                    info!("Stopped scan after {} artifacts (duration: {:?}).", context.summary.processed, started.elapsed());
                    return Ok(context.summary);
                }
                message = receiver.recv() => message,
            };

            match message {
                Some(TaskMessage::Result(result)) => {
                    self.process(result, &mut context, store).await
                        .map_err(ScanError::Store)?;
                    context.summary.processed += 1;
                    if context.summary.processed % self.flush_interval == 0 {
                        info!("Processed {}/{} artifacts (duration: {:?}).", context.summary.processed, estimated_size, started.elapsed());
                        store.flush().map_err(ScanError::Store)?;
                    }
                }
                Some(TaskMessage::Last) => break,
                None => {
                    producer_outcome(handle.await)?;
                    return Err(ScanError::Protocol);
                }
            }
        }

        producer_outcome(handle.await)?;
        info!("Finished scan: {} artifacts (duration: {:?}).", context.summary.processed, started.elapsed());
        Ok(context.summary)
    }

    async fn process(&self, result: ResolutionResult, context: &mut ScanContext, store: &mut dyn GraphStore) -> anyhow::Result<()> {
        let ResolutionResult { artifact, last_modified, model, binary } = result;
        trace!("processing {}", artifact);

        let lifecycle = if artifact.is_snapshot() {
            Lifecycle::Snapshot { last_modified }
        }
        else {
            Lifecycle::Release
        };

        let model_node = self.get_model(&artifact, &model, &lifecycle, context, store).await?;
        self.discard(&model.file).await;

        if artifact.is_pom() {
            return Ok(());
        }

        let catalog_ref = match &binary {
            FetchOutcome::Resolved(resolved) => {
                if resolved.artifact != artifact {
                    debug!("{} was resolved as {}", artifact, resolved.artifact);
                }
                resolved.artifact.clone()
            }
            _ => artifact.clone(),
        };

        let key = NodeKey::Artifact { repository: context.repository, fqn: catalog_ref.id() };
        if let Some(existing) = store.find(&key)? {
            if store.has_relation(context.repository, &Relation::ContainsArtifact, existing)? {
                debug!("{} is cataloged already", catalog_ref);
                return Ok(());
            }
        }

        let artifact_node = match binary {
            FetchOutcome::Failed => {
                warn!("No file for {}, not cataloging it", artifact);
                let earliest = context.summary.unfetched_since.map_or(last_modified, |t| t.min(last_modified));
                context.summary.unfetched_since = Some(earliest);
                return Ok(());
            }
            FetchOutcome::Resolved(resolved) => {
                let content = self.scan_content(&resolved).await;
                self.discard(&resolved.file).await;

                let id = self.artifact_resolver.resolve(&resolved.artifact, context.repository, store)?;
                promote(store, id, lifecycle, content)?;
                id
            }
            FetchOutcome::Skipped => {
                let id = self.artifact_resolver.resolve(&artifact, context.repository, store)?;
                promote(store, id, lifecycle, None)?;
                id
            }
        };

        if let Some(model_node) = model_node {
            store.relate(model_node, Relation::Describes, artifact_node)?;
            if describes_primary_artifact(store, model_node, &catalog_ref)? {
                for (relation, target) in store.outgoing(model_node)? {
                    if let Relation::DeclaresDependency(dependency) = relation {
                        store.relate(artifact_node, Relation::DependsOn(dependency), target)?;
                    }
                }
            }
        }

        store.relate(context.repository, Relation::ContainsArtifact, artifact_node)?;
        let version_node = context.gav_resolver.resolve(&catalog_ref.coordinates, store)?;
        store.relate(version_node, Relation::ContainsArtifact, artifact_node)?;
        Ok(())
    }

    /// The model node for an artifact, built on first sight. A model that cannot be read at all
    ///  yields `None`, and the artifact is cataloged without it.
    async fn get_model(&self, artifact: &MavenArtifactRef, model: &ResolvedArtifact, lifecycle: &Lifecycle, context: &mut ScanContext, store: &mut dyn GraphStore) -> anyhow::Result<Option<NodeId>> {
        let requested_version = &artifact.coordinates.version;
        let resolved_version = &model.artifact.coordinates.version;
        if requested_version.base_version() != resolved_version.base_version() {
            warn!("Model for {} was resolved with diverging version {}", artifact, resolved_version);
        }

        let fqn = model.artifact.id();
        if let Some(id) = context.models.get(&fqn) {
            return Ok(Some(*id));
        }

        let key = NodeKey::Model { repository: context.repository, fqn: fqn.clone(), snapshot: lifecycle.is_snapshot() };
        if let Some(id) = store.find(&key)? {
            context.models.put(fqn, id);
            return Ok(Some(id));
        }

        info!("Scanning model '{}'", model.file.display());
        let document = match self.builder.build(&model.file).await {
            Ok(document) => document,
            Err(e) => {
                warn!("No model found for {}: {:#}", model.artifact, e);
                return Ok(None);
            }
        };

        let coordinates = &model.artifact.coordinates;
        if document.group_id != coordinates.group_id.0
            || document.artifact_id != coordinates.artifact_id.0
            || MavenVersion::parse(&document.version).base_version() != resolved_version.base_version()
        {
            warn!("Model {} declares diverging coordinates {}:{}:{}", fqn, document.group_id, document.artifact_id, document.version);
        }

        let id = store.create(key, Node::Model(ModelNode {
            fqn: fqn.clone(),
            group_id: document.group_id.clone(),
            artifact_id: document.artifact_id.clone(),
            version: document.version.clone(),
            packaging: document.packaging.clone(),
            classifier: document.classifier.clone(),
            name: document.name.clone(),
            kind: document.kind,
            lifecycle: lifecycle.clone(),
        }))?;
        store.relate(context.repository, Relation::ContainsModel, id)?;

        for dependency in &document.dependencies {
            match dependency.target() {
                Some(target) => {
                    let target_node = self.artifact_resolver.resolve(&target, context.repository, store)?;
                    let edge = DependencyEdge { scope: dependency.scope.clone(), optional: dependency.optional };
                    store.relate(id, Relation::DeclaresDependency(edge), target_node)?;
                }
                None => debug!("dependency {}:{} of {} has no concrete version, not linking it", dependency.group_id, dependency.artifact_id, fqn),
            }
        }

        context.models.put(fqn, id);
        Ok(Some(id))
    }

    async fn scan_content(&self, resolved: &ResolvedArtifact) -> Option<ContentDescriptor> {
        match self.content_scanner.scan(&resolved.artifact, &resolved.file).await {
            Ok(content) => Some(content),
            Err(e) => {
                warn!("Cannot scan content of {}: {:#}", resolved.artifact, e);
                None
            }
        }
    }

    async fn discard(&self, file: &Path) {
        if self.keep_artifacts {
            return;
        }
        if let Err(e) = self.local_files.delete(file).await {
            warn!("Cannot delete {}: {:#}", file.display(), e);
        }
    }
}

fn producer_outcome(joined: Result<anyhow::Result<()>, JoinError>) -> Result<(), ScanError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ScanError::Producer(e)),
        Err(e) => Err(ScanError::ProducerAborted(e)),
    }
}

/// Sets the lifecycle (and content, if scanned) on an artifact node that may so far have been a
///  mere reference
fn promote(store: &mut dyn GraphStore, id: NodeId, lifecycle: Lifecycle, content: Option<ContentDescriptor>) -> anyhow::Result<()> {
    let mut node = match store.get_existing(id)? {
        Node::Artifact(node) => node,
        other => bail!("node {} is no artifact: {:?}", id, other),
    };
    node.lifecycle = Some(lifecycle);
    if content.is_some() {
        node.content = content;
    }
    store.update(id, Node::Artifact(node))
}

/// Dependencies of a model are those of its main artifact, not of attached artifacts like
///  sources or javadoc
fn describes_primary_artifact(store: &dyn GraphStore, model_node: NodeId, artifact: &MavenArtifactRef) -> anyhow::Result<bool> {
    let model = match store.get_existing(model_node)? {
        Node::Model(model) => model,
        other => bail!("node {} is no model: {:?}", model_node, other),
    };
    Ok(model.kind == DocumentKind::Effective
        && type_extension(&model.packaging) == artifact.extension()
        && model.classifier.as_deref() == artifact.classifier.as_option())
}
