use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use tempfile::TempDir;

use crate::maven::artifact_provider::{ArtifactProvider, FetchError, ResolvedArtifact};
use crate::maven::coordinates::MavenArtifactRef;
use crate::maven::paths::as_maven_path;

/// In-memory repository: serves registered contents by writing them to a temporary directory
///  in Maven2 layout, and records every request.
pub struct StubArtifactProvider {
    root: TempDir,
    artifacts: Mutex<HashMap<MavenArtifactRef, (MavenArtifactRef, String)>>,
    failing: Mutex<HashSet<MavenArtifactRef>>,
    panicking: Mutex<HashSet<MavenArtifactRef>>,
    requests: Mutex<Vec<MavenArtifactRef>>,
}

impl StubArtifactProvider {
    pub fn new() -> StubArtifactProvider {
        StubArtifactProvider {
            root: tempfile::tempdir().unwrap(),
            artifacts: Default::default(),
            failing: Default::default(),
            panicking: Default::default(),
            requests: Default::default(),
        }
    }

    pub fn add(&self, artifact_ref: MavenArtifactRef, content: &str) {
        self.add_resolved(artifact_ref.clone(), artifact_ref, content);
    }

    /// registers content that is returned under different coordinates, e.g. a timestamped
    ///  snapshot for a '-SNAPSHOT' request
    pub fn add_resolved(&self, requested: MavenArtifactRef, resolved: MavenArtifactRef, content: &str) {
        self.artifacts.lock().unwrap().insert(requested, (resolved, content.to_string()));
    }

    /// requests for this artifact panic, taking down the calling task
    pub fn panic_on(&self, artifact_ref: MavenArtifactRef) {
        self.panicking.lock().unwrap().insert(artifact_ref);
    }

    /// requests for this artifact fail with a transport error until `recover` is called
    pub fn fail(&self, artifact_ref: MavenArtifactRef) {
        self.failing.lock().unwrap().insert(artifact_ref);
    }

    pub fn recover(&self, artifact_ref: &MavenArtifactRef) {
        self.failing.lock().unwrap().remove(artifact_ref);
    }

    pub fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.root.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn requests(&self) -> Vec<MavenArtifactRef> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactProvider for StubArtifactProvider {
    async fn get_artifact(&self, artifact_ref: &MavenArtifactRef) -> Result<ResolvedArtifact, FetchError> {
        self.requests.lock().unwrap().push(artifact_ref.clone());

        let panics = self.panicking.lock().unwrap().contains(artifact_ref);
        if panics {
            panic!("simulated crash fetching {}", artifact_ref);
        }

        if self.failing.lock().unwrap().contains(artifact_ref) {
            return Err(FetchError::Transport(artifact_ref.clone(), anyhow!("connection reset")));
        }

        let entry = self.artifacts.lock().unwrap().get(artifact_ref).cloned();
        match entry {
            Some((resolved, content)) => {
                let file = self.write_file(&as_maven_path(&resolved), &content);
                Ok(ResolvedArtifact { artifact: resolved, file })
            }
            None => Err(FetchError::NotFound(artifact_ref.clone())),
        }
    }

    fn repository_root(&self) -> &Path {
        self.root.path()
    }
}
