use crate::graph::model::{ArtifactNode, Node, NodeId, NodeKey};
use crate::graph::store::{get_or_create, GraphStore};
use crate::maven::coordinates::MavenArtifactRef;
use crate::maven::paths::as_maven_path;

/// Provides artifact nodes for artifacts whose files were not fetched, e.g. dependency targets
pub trait ArtifactResolver: Send + Sync {
    fn resolve(&self, artifact_ref: &MavenArtifactRef, repository: NodeId, store: &mut dyn GraphStore) -> anyhow::Result<NodeId>;
}

/// Reference-only nodes pointing at the artifact's location in the repository
#[derive(Default)]
pub struct RepositoryArtifactResolver;

impl ArtifactResolver for RepositoryArtifactResolver {
    fn resolve(&self, artifact_ref: &MavenArtifactRef, repository: NodeId, store: &mut dyn GraphStore) -> anyhow::Result<NodeId> {
        let fqn = artifact_ref.id();
        let key = NodeKey::Artifact { repository, fqn: fqn.clone() };
        let (id, _) = get_or_create(store, key, || Node::Artifact(ArtifactNode {
            fqn,
            artifact: artifact_ref.clone(),
            lifecycle: None,
            content: None,
            file_name: as_maven_path(artifact_ref),
        }))?;
        Ok(id)
    }
}

#[cfg(test)]
mod test {
    use crate::graph::model::RepositoryNode;
    use crate::graph::transient_store::TransientGraphStore;
    use super::*;

    #[test]
    fn test_resolve_reuses_node() {
        let mut store = TransientGraphStore::new();
        let repository = store.create(NodeKey::Repository("r".to_string()), Node::Repository(RepositoryNode { url: "r".to_string(), last_update: None })).unwrap();

        let artifact_ref = MavenArtifactRef::new("org.acme", "lib", "1.0", Some("tests"), "jar");
        let first = RepositoryArtifactResolver.resolve(&artifact_ref, repository, &mut store).unwrap();
        let second = RepositoryArtifactResolver.resolve(&artifact_ref, repository, &mut store).unwrap();
        assert_eq!(first, second);

        match store.get_existing(first).unwrap() {
            Node::Artifact(node) => {
                assert_eq!(node.fqn, "org.acme:lib:jar:tests:1.0");
                assert_eq!(node.file_name, "org/acme/lib/1.0/lib-1.0-tests.jar");
                assert_eq!(node.lifecycle, None);
                assert_eq!(node.content, None);
            }
            other => panic!("unexpected node {:?}", other),
        }
    }
}
