use std::fmt::{Display, Formatter};
use std::mem::discriminant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::maven::coordinates::MavenArtifactRef;
use crate::maven::pom::DocumentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u64);
impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a cataloged artifact or document is immutable or may be redeployed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum Lifecycle {
    Release,
    Snapshot {
        #[serde(with = "chrono::serde::ts_milliseconds")]
        last_modified: DateTime<Utc>,
    },
}
impl Lifecycle {
    pub fn is_snapshot(&self) -> bool {
        matches!(self, Lifecycle::Snapshot { .. })
    }
}

/// What a content scanner found out about an artifact's file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentDescriptor {
    pub size: u64,
    pub sha1: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryNode {
    pub url: String,
    /// cursor for incremental scans: changes up to this point are cataloged
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupNode {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactIdNode {
    pub group: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionNode {
    pub group: String,
    pub artifact_id: String,
    /// always the base version, i.e. '-SNAPSHOT' rather than a timestamp
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactNode {
    pub fqn: String,
    pub artifact: MavenArtifactRef,
    /// `None` for nodes that are only referenced (e.g. as a dependency target) but not cataloged
    pub lifecycle: Option<Lifecycle>,
    /// present if the artifact's file was fetched and scanned
    pub content: Option<ContentDescriptor>,
    /// the artifact's file relative to the repository root
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelNode {
    pub fqn: String,
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub packaging: String,
    pub classifier: Option<String>,
    pub name: Option<String>,
    pub kind: DocumentKind,
    pub lifecycle: Lifecycle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Node {
    Repository(RepositoryNode),
    Group(GroupNode),
    ArtifactId(ArtifactIdNode),
    Version(VersionNode),
    Artifact(ArtifactNode),
    Model(ModelNode),
}

/// The indexed identity of a node. Nodes below the repository are keyed relative to their
///  owner, so the same group name in two repositories yields two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKey {
    Repository(String),
    Group { repository: NodeId, name: String },
    ArtifactId { group: NodeId, name: String },
    Version { artifact_id: NodeId, version: String },
    Artifact { repository: NodeId, fqn: String },
    Model { repository: NodeId, fqn: String, snapshot: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DependencyEdge {
    pub scope: String,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type")]
pub enum Relation {
    ContainsGroup,
    ContainsArtifactId,
    ContainsVersion,
    /// repository -> artifact and version -> artifact
    ContainsArtifact,
    ContainsModel,
    /// model -> artifact
    Describes,
    /// model -> dependency target artifact
    DeclaresDependency(DependencyEdge),
    /// artifact -> dependency target artifact
    DependsOn(DependencyEdge),
}
impl Relation {
    /// Same relation type, ignoring edge properties
    pub fn is_same_kind(&self, other: &Relation) -> bool {
        discriminant(self) == discriminant(other)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub from: NodeId,
    pub relation: Relation,
    pub to: NodeId,
}
