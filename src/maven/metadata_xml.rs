use serde::Deserialize;

use crate::maven::coordinates::{MavenArtifactRef, MavenVersion};

/// The subset of 'maven-metadata.xml' needed to resolve snapshot versions, see
///  https://maven.apache.org/ref/3.9.5/maven-repository-metadata/repository-metadata.html
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
    pub versioning: Option<Versioning>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Versioning {
    pub latest: Option<String>,
    pub release: Option<String>,
    pub versions: Option<Versions>,
    pub last_updated: Option<String>,
    pub snapshot: Option<Snapshot>,
    pub snapshot_versions: Option<SnapshotVersions>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Versions {
    #[serde(default)]
    pub version: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub timestamp: Option<String>,
    pub build_number: Option<u32>,
    pub local_copy: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SnapshotVersions {
    #[serde(rename = "snapshotVersion", default)]
    pub snapshot_version: Vec<SnapshotVersion>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SnapshotVersion {
    pub classifier: Option<String>,
    pub extension: String,
    pub value: String,
    pub updated: Option<String>,
}

impl Metadata {
    pub fn parse(xml: &str) -> anyhow::Result<Metadata> {
        Ok(serde_xml_rs::from_str(xml)?)
    }

    /// Determines the timestamped version of the most recent deployment of a snapshot artifact.
    ///
    /// Per-file entries ('snapshotVersions', Maven 3) take precedence over the version-wide
    ///  'snapshot' element (Maven 2). Returns `None` if the metadata does not describe a deployed
    ///  snapshot, e.g. for repositories with non-unique snapshots.
    pub fn resolve_snapshot_version(&self, artifact_ref: &MavenArtifactRef) -> Option<MavenVersion> {
        let versioning = self.versioning.as_ref()?;

        let classifier = artifact_ref.classifier.as_option().unwrap_or("");
        if let Some(snapshot_versions) = &versioning.snapshot_versions {
            let matching = snapshot_versions.snapshot_version
                .iter()
                .find(|v| v.extension == artifact_ref.extension() && v.classifier.as_deref().unwrap_or("") == classifier);
            if let Some(snapshot_version) = matching {
                return Some(MavenVersion::parse(&snapshot_version.value));
            }
        }

        let snapshot = versioning.snapshot.as_ref()?;
        if snapshot.local_copy == Some(true) {
            return None;
        }
        match (&snapshot.timestamp, snapshot.build_number) {
            (Some(timestamp), Some(build_number)) => Some(MavenVersion::qualify(
                artifact_ref.coordinates.version.base_version(),
                timestamp,
                build_number,
            )),
            _ => None,
        }
    }
}
