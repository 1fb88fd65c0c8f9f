use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use failsafe::{backoff, failure_policy, Config, StateMachine};
use failsafe::backoff::Exponential;
use failsafe::failure_policy::ConsecutiveFailures;
use failsafe::futures::CircuitBreaker;
use futures::StreamExt;
use tracing::{debug, trace, warn};

use crate::blob::fs_blob_storage::FsBlobStorage;
use crate::maven::artifact_provider::{ArtifactProvider, FetchError, ResolvedArtifact};
use crate::maven::coordinates::{MavenArtifactRef, MavenVersion};
use crate::maven::metadata_xml::Metadata;
use crate::maven::paths::{as_maven_path, snapshot_metadata_path};
use crate::util::validating_http_downloader::ValidatingHttpDownloader;

const FAILURES_BEFORE_OPEN: u32 = 3;
const MIN_BACKOFF: Duration = Duration::from_secs(10);
const MAX_BACKOFF: Duration = Duration::from_secs(300);

type RepoCircuitBreaker = StateMachine<ConsecutiveFailures<Exponential>, ()>;

/// Fetches artifacts from a remote Maven2 layout repository into a local directory.
///
/// Files already present locally are not downloaded again. Unqualified snapshot versions are
///  resolved to their latest deployment through the version's 'maven-metadata.xml'. Repeated
///  transport failures open a circuit breaker, rejecting requests until the repository has had
///  time to recover.
pub struct RemoteMavenRepo {
    downloader: ValidatingHttpDownloader,
    storage: FsBlobStorage,
    circuit_breaker: RepoCircuitBreaker,
}

impl RemoteMavenRepo {
    pub fn new(base_uri: &str, local_root: PathBuf) -> anyhow::Result<RemoteMavenRepo> {
        let backoff = backoff::exponential(MIN_BACKOFF, MAX_BACKOFF);
        let policy = failure_policy::consecutive_failures(FAILURES_BEFORE_OPEN, backoff);

        Ok(RemoteMavenRepo {
            downloader: ValidatingHttpDownloader::new(base_uri)?,
            storage: FsBlobStorage::new(local_root),
            circuit_breaker: Config::new()
                .failure_policy(policy)
                .build(),
        })
    }

    /// The repository's base URI, without credentials
    pub fn base_uri(&self) -> &str {
        self.downloader.base_uri()
    }

    async fn fetch(&self, artifact_ref: &MavenArtifactRef) -> Result<ResolvedArtifact, FetchError> {
        let resolved_ref = self.resolve_version(artifact_ref).await?;
        let path = as_maven_path(&resolved_ref);

        if let Some(file) = self.storage.get(&path).await.map_err(|e| FetchError::Transport(resolved_ref.clone(), e))? {
            return Ok(ResolvedArtifact {
                artifact: resolved_ref,
                file,
            });
        }

        let download = match self.downloader.get(&path).await {
            Ok(Some(download)) => download,
            Ok(None) => return Err(FetchError::NotFound(resolved_ref)),
            Err(e) => return Err(FetchError::Transport(resolved_ref, e)),
        };
        let stored = self.storage.insert(&path, download.data).await
            .map_err(|e| FetchError::Transport(resolved_ref.clone(), e))?;
        debug!("downloaded {} ({} bytes)", resolved_ref, stored.size);

        Ok(ResolvedArtifact {
            artifact: resolved_ref,
            file: stored.path,
        })
    }

    /// Resolves '-SNAPSHOT' to the timestamped version of the latest deployment, falling back to
    ///  the unqualified version if the repository has no (usable) metadata for it
    async fn resolve_version(&self, artifact_ref: &MavenArtifactRef) -> Result<MavenArtifactRef, FetchError> {
        if !matches!(artifact_ref.coordinates.version, MavenVersion::Snapshot { timestamp: None, .. }) {
            return Ok(artifact_ref.clone());
        }

        let metadata_path = snapshot_metadata_path(&artifact_ref.coordinates);
        let xml = match self.download_string(&metadata_path).await {
            Ok(Some(xml)) => xml,
            Ok(None) => {
                trace!("no snapshot metadata for {}", artifact_ref);
                return Ok(artifact_ref.clone());
            }
            Err(e) => return Err(FetchError::Transport(artifact_ref.clone(), e)),
        };

        let resolved = match Metadata::parse(&xml) {
            Ok(metadata) => metadata.resolve_snapshot_version(artifact_ref),
            Err(e) => {
                warn!("cannot parse {}, using unqualified snapshot version for {}: {}", metadata_path, artifact_ref, e);
                None
            }
        };
        match resolved {
            Some(version) => {
                trace!("resolved {} to version {}", artifact_ref, version);
                Ok(artifact_ref.with_version(version))
            }
            None => Ok(artifact_ref.clone()),
        }
    }

    async fn download_string(&self, path: &str) -> anyhow::Result<Option<String>> {
        let mut download = match self.downloader.get(path).await? {
            Some(download) => download,
            None => return Ok(None),
        };

        let mut data = Vec::new();
        while let Some(chunk) = download.data.next().await {
            data.extend_from_slice(&chunk?);
        }
        Ok(Some(String::from_utf8(data)?))
    }
}

fn is_transport_failure(e: &FetchError) -> bool {
    matches!(e, FetchError::Transport(..))
}

#[async_trait]
impl ArtifactProvider for RemoteMavenRepo {
    async fn get_artifact(&self, artifact_ref: &MavenArtifactRef) -> Result<ResolvedArtifact, FetchError> {
        match self.circuit_breaker.call_with(is_transport_failure, self.fetch(artifact_ref)).await {
            Ok(resolved) => Ok(resolved),
            Err(failsafe::Error::Inner(e)) => Err(e),
            Err(failsafe::Error::Rejected) => {
                debug!("circuit breaker for {} is open, rejecting {}", self.base_uri(), artifact_ref);
                Err(FetchError::Rejected(artifact_ref.clone()))
            }
        }
    }

    fn repository_root(&self) -> &Path {
        self.storage.root()
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    use hyper::{Body, Request, Response, Server, StatusCode};
    use hyper::header::AUTHORIZATION;
    use hyper::service::{make_service_fn, service_fn};

    use super::*;

    const METADATA: &str = r#"<metadata>
  <groupId>org.acme</groupId>
  <artifactId>lib</artifactId>
  <version>1.0-SNAPSHOT</version>
  <versioning>
    <snapshot>
      <timestamp>20230101.120000</timestamp>
      <buildNumber>3</buildNumber>
    </snapshot>
  </versioning>
</metadata>"#;

    #[derive(Clone)]
    struct ServedFile {
        status: StatusCode,
        body: &'static str,
        sha1: Option<&'static str>,
    }
    fn ok(body: &'static str) -> ServedFile {
        ServedFile { status: StatusCode::OK, body, sha1: None }
    }

    /// (path, authorization header) of every request
    type RequestLog = Arc<Mutex<Vec<(String, Option<String>)>>>;

    /// Serves the given files under '/repo/', answering 404 for everything else, or with
    ///  `fallback` if one is given
    async fn serve(files: Vec<(&'static str, ServedFile)>, fallback: Option<StatusCode>) -> (SocketAddr, RequestLog) {
        let files: Arc<HashMap<String, ServedFile>> = Arc::new(files.into_iter()
            .map(|(path, file)| (format!("/repo/{}", path), file))
            .collect());
        let requests: RequestLog = Default::default();

        let log = requests.clone();
        let make_service = make_service_fn(move |_| {
            let files = files.clone();
            let log = log.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |request: Request<Body>| {
                    let files = files.clone();
                    let log = log.clone();
                    async move {
                        let authorization = request.headers().get(AUTHORIZATION)
                            .and_then(|h| h.to_str().ok())
                            .map(str::to_string);
                        log.lock().unwrap().push((request.uri().path().to_string(), authorization));

                        let response = match (files.get(request.uri().path()), fallback) {
                            (Some(file), _) => {
                                let mut builder = Response::builder().status(file.status);
                                if let Some(sha1) = file.sha1 {
                                    builder = builder.header("x-checksum-sha1", sha1);
                                }
                                builder.body(Body::from(file.body)).unwrap()
                            }
                            (None, status) => Response::builder()
                                .status(status.unwrap_or(StatusCode::NOT_FOUND))
                                .body(Body::empty())
                                .unwrap(),
                        };
                        Ok::<_, Infallible>(response)
                    }
                }))
            }
        });

        let server = Server::bind(&([127, 0, 0, 1], 0).into()).serve(make_service);
        let addr = server.local_addr();
        tokio::spawn(server);
        (addr, requests)
    }

    fn paths(requests: &RequestLog) -> Vec<String> {
        requests.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }

    #[tokio::test]
    async fn test_get_release_artifact() {
        let (addr, requests) = serve(vec![("org/acme/lib/1.0/lib-1.0.jar", ok("jar content"))], None).await;
        let dir = tempfile::tempdir().unwrap();
        let repo = RemoteMavenRepo::new(&format!("http://{}/repo", addr), dir.path().to_path_buf()).unwrap();

        let artifact_ref = MavenArtifactRef::new("org.acme", "lib", "1.0", None, "jar");
        let resolved = repo.get_artifact(&artifact_ref).await.unwrap();
        assert_eq!(resolved.artifact, artifact_ref);
        assert_eq!(resolved.file, dir.path().join("org/acme/lib/1.0/lib-1.0.jar"));
        assert_eq!(std::fs::read_to_string(&resolved.file).unwrap(), "jar content");

        // served from the local repository the second time
        let again = repo.get_artifact(&artifact_ref).await.unwrap();
        assert_eq!(again, resolved);
        assert_eq!(paths(&requests), vec!["/repo/org/acme/lib/1.0/lib-1.0.jar"]);
        assert_eq!(repo.repository_root(), dir.path());
    }

    #[tokio::test]
    async fn test_not_found() {
        let (addr, _) = serve(vec![], None).await;
        let dir = tempfile::tempdir().unwrap();
        let repo = RemoteMavenRepo::new(&format!("http://{}/repo", addr), dir.path().to_path_buf()).unwrap();

        let artifact_ref = MavenArtifactRef::new("org.acme", "lib", "1.0", Some("sources"), "jar");
        let result = repo.get_artifact(&artifact_ref).await;
        assert!(matches!(result, Err(FetchError::NotFound(r)) if r == artifact_ref));
    }

    #[tokio::test]
    async fn test_snapshot_resolved_through_metadata() {
        let (addr, requests) = serve(vec![
            ("org/acme/lib/1.0-SNAPSHOT/maven-metadata.xml", ok(METADATA)),
            ("org/acme/lib/1.0-SNAPSHOT/lib-1.0-20230101.120000-3.pom", ok("<project/>")),
        ], None).await;
        let dir = tempfile::tempdir().unwrap();
        let repo = RemoteMavenRepo::new(&format!("http://{}/repo/", addr), dir.path().to_path_buf()).unwrap();

        let resolved = repo.get_artifact(&MavenArtifactRef::new("org.acme", "lib", "1.0-SNAPSHOT", None, "pom")).await.unwrap();
        assert_eq!(resolved.artifact, MavenArtifactRef::new("org.acme", "lib", "1.0-20230101.120000-3", None, "pom"));
        assert_eq!(resolved.file, dir.path().join("org/acme/lib/1.0-SNAPSHOT/lib-1.0-20230101.120000-3.pom"));
        assert_eq!(paths(&requests), vec![
            "/repo/org/acme/lib/1.0-SNAPSHOT/maven-metadata.xml",
            "/repo/org/acme/lib/1.0-SNAPSHOT/lib-1.0-20230101.120000-3.pom",
        ]);
    }

    #[tokio::test]
    async fn test_snapshot_without_metadata() {
        let (addr, _) = serve(vec![
            ("org/acme/lib/1.0-SNAPSHOT/lib-1.0-SNAPSHOT.pom", ok("<project/>")),
        ], None).await;
        let dir = tempfile::tempdir().unwrap();
        let repo = RemoteMavenRepo::new(&format!("http://{}/repo", addr), dir.path().to_path_buf()).unwrap();

        let artifact_ref = MavenArtifactRef::new("org.acme", "lib", "1.0-SNAPSHOT", None, "pom");
        let resolved = repo.get_artifact(&artifact_ref).await.unwrap();
        assert_eq!(resolved.artifact, artifact_ref);
    }

    #[tokio::test]
    async fn test_checksum_mismatch() {
        let (addr, _) = serve(vec![
            ("g/a/1/a-1.jar", ServedFile { status: StatusCode::OK, body: "tampered", sha1: Some("2aae6c35c94fcfb415dbe95f408b9ce91ee846ed") }),
        ], None).await;
        let dir = tempfile::tempdir().unwrap();
        let repo = RemoteMavenRepo::new(&format!("http://{}/repo", addr), dir.path().to_path_buf()).unwrap();

        let result = repo.get_artifact(&MavenArtifactRef::new("g", "a", "1", None, "jar")).await;
        assert!(matches!(result, Err(FetchError::Transport(..))));
        assert!(!dir.path().join("g/a/1/a-1.jar").exists());
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_after_repeated_failures() {
        let (addr, requests) = serve(vec![], Some(StatusCode::INTERNAL_SERVER_ERROR)).await;
        let dir = tempfile::tempdir().unwrap();
        let repo = RemoteMavenRepo::new(&format!("http://{}/repo", addr), dir.path().to_path_buf()).unwrap();

        for i in 0..FAILURES_BEFORE_OPEN {
            let result = repo.get_artifact(&MavenArtifactRef::new("g", "a", &i.to_string(), None, "jar")).await;
            assert!(matches!(result, Err(FetchError::Transport(..))));
        }
        let result = repo.get_artifact(&MavenArtifactRef::new("g", "a", "99", None, "jar")).await;
        assert!(matches!(result, Err(FetchError::Rejected(..))));
        assert_eq!(requests.lock().unwrap().len(), FAILURES_BEFORE_OPEN as usize);
    }

    #[tokio::test]
    async fn test_not_found_does_not_open_circuit_breaker() {
        let (addr, _) = serve(vec![("g/a/9/a-9.jar", ok("x"))], None).await;
        let dir = tempfile::tempdir().unwrap();
        let repo = RemoteMavenRepo::new(&format!("http://{}/repo", addr), dir.path().to_path_buf()).unwrap();

        for i in 0..FAILURES_BEFORE_OPEN + 1 {
            let result = repo.get_artifact(&MavenArtifactRef::new("g", "a", &i.to_string(), None, "jar")).await;
            assert!(matches!(result, Err(FetchError::NotFound(..))));
        }
        assert!(repo.get_artifact(&MavenArtifactRef::new("g", "a", "9", None, "jar")).await.is_ok());
    }

    #[tokio::test]
    async fn test_credentials_sent_as_basic_auth() {
        let (addr, requests) = serve(vec![("g/a/1/a-1.pom", ok("<project/>"))], None).await;
        let dir = tempfile::tempdir().unwrap();
        let repo = RemoteMavenRepo::new(&format!("http://user:secret@{}/repo", addr), dir.path().to_path_buf()).unwrap();
        assert_eq!(repo.base_uri(), format!("http://{}/repo/", addr));

        repo.get_artifact(&MavenArtifactRef::new("g", "a", "1", None, "pom")).await.unwrap();
        let (path, authorization) = requests.lock().unwrap()[0].clone();
        assert_eq!(path, "/repo/g/a/1/a-1.pom");
        assert_eq!(authorization.as_deref(), Some("Basic dXNlcjpzZWNyZXQ="));
    }
}
