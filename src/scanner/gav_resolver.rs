use std::num::NonZeroUsize;

use lru::LruCache;
use tracing::trace;

use crate::graph::model::{ArtifactIdNode, GroupNode, Node, NodeId, NodeKey, Relation, VersionNode};
use crate::graph::store::{get_or_create, GraphStore};
use crate::maven::coordinates::MavenCoordinates;

const CACHE_SIZE: usize = 16;

/// Maps coordinates to the group / artifact id / version nodes of one repository, creating them
///  on first sight.
///
/// Changed artifacts arrive roughly grouped by coordinates, so a small cache per level avoids
///  most store lookups. Not thread safe: a resolver belongs to a single scan.
pub struct GavResolver {
    repository: NodeId,
    groups: LruCache<String, NodeId>,
    artifact_ids: LruCache<(String, String), NodeId>,
    versions: LruCache<(String, String, String), NodeId>,
}

impl GavResolver {
    pub fn new(repository: NodeId) -> GavResolver {
        let capacity = NonZeroUsize::new(CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        GavResolver {
            repository,
            groups: LruCache::new(capacity),
            artifact_ids: LruCache::new(capacity),
            versions: LruCache::new(capacity),
        }
    }

    /// Returns the version node, which always carries the base version
    pub fn resolve(&mut self, coordinates: &MavenCoordinates, store: &mut dyn GraphStore) -> anyhow::Result<NodeId> {
        let group = coordinates.group_id.0.clone();
        let artifact_id = coordinates.artifact_id.0.clone();
        let version = coordinates.version.base_version().to_string();

        let version_key = (group.clone(), artifact_id.clone(), version.clone());
        if let Some(id) = self.versions.get(&version_key) {
            return Ok(*id);
        }

        let artifact_id_node = self.resolve_artifact_id(&group, &artifact_id, store)?;
        let (id, created) = get_or_create(
            store,
            NodeKey::Version { artifact_id: artifact_id_node, version: version.clone() },
            || Node::Version(VersionNode { group, artifact_id, version }),
        )?;
        if created {
            trace!("created version node {} for {}", id, coordinates);
            store.relate(artifact_id_node, Relation::ContainsVersion, id)?;
        }

        self.versions.put(version_key, id);
        Ok(id)
    }

    fn resolve_artifact_id(&mut self, group: &str, artifact_id: &str, store: &mut dyn GraphStore) -> anyhow::Result<NodeId> {
        let key = (group.to_string(), artifact_id.to_string());
        if let Some(id) = self.artifact_ids.get(&key) {
            return Ok(*id);
        }

        let group_node = self.resolve_group(group, store)?;
        let (id, created) = get_or_create(
            store,
            NodeKey::ArtifactId { group: group_node, name: artifact_id.to_string() },
            || Node::ArtifactId(ArtifactIdNode { group: group.to_string(), name: artifact_id.to_string() }),
        )?;
        if created {
            store.relate(group_node, Relation::ContainsArtifactId, id)?;
        }

        self.artifact_ids.put(key, id);
        Ok(id)
    }

    fn resolve_group(&mut self, group: &str, store: &mut dyn GraphStore) -> anyhow::Result<NodeId> {
        if let Some(id) = self.groups.get(group) {
            return Ok(*id);
        }

        let (id, created) = get_or_create(
            store,
            NodeKey::Group { repository: self.repository, name: group.to_string() },
            || Node::Group(GroupNode { name: group.to_string() }),
        )?;
        if created {
            store.relate(self.repository, Relation::ContainsGroup, id)?;
        }

        self.groups.put(group.to_string(), id);
        Ok(id)
    }
}
