use std::fmt::{Display, Formatter};

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

pub const SNAPSHOT_QUALIFIER: &str = "SNAPSHOT";

/// The type of the artifact holding a package's metadata document
pub const POM_TYPE: &str = "pom";

lazy_static! {
    /// a deployed snapshot version: '<base>-<yyyyMMdd.HHmmss>-<buildNumber>'
    static ref SNAPSHOT_TIMESTAMP_REGEX: Regex = Regex::new(r"^(.*-)?(\d{8}\.\d{6})-(\d+)$").unwrap();
}

#[derive(Debug, Eq, PartialEq, Clone, Hash, Serialize)]
pub struct SnapshotTimestamp {
    pub timestamp: String, // yyyyMMdd.HHmmss
    pub build_number: u32,
}

#[derive(Debug, Eq, PartialEq, Clone, Hash, Serialize)]
pub enum MavenVersion {
    Release(String),
    Snapshot {
        version: String, // ending in 'SNAPSHOT'
        timestamp: Option<SnapshotTimestamp>,
    }
}
impl MavenVersion {
    pub fn parse(version: &str) -> MavenVersion {
        if let Some(captures) = SNAPSHOT_TIMESTAMP_REGEX.captures(version) {
            if let Ok(build_number) = captures[3].parse::<u32>() {
                let prefix = captures.get(1).map(|m| m.as_str()).unwrap_or("");
                return MavenVersion::Snapshot {
                    version: format!("{}{}", prefix, SNAPSHOT_QUALIFIER),
                    timestamp: Some(SnapshotTimestamp {
                        timestamp: captures[2].to_string(),
                        build_number,
                    }),
                };
            }
        }

        if version.ends_with(SNAPSHOT_QUALIFIER) {
            MavenVersion::Snapshot {
                version: version.to_string(),
                timestamp: None,
            }
        }
        else {
            MavenVersion::Release(version.to_string())
        }
    }

    /// Replaces the 'SNAPSHOT' suffix of a base version with a deployment timestamp. A base
    ///  version without that suffix is taken as the prefix of one, i.e. '1.0' is qualified as
    ///  '1.0-SNAPSHOT'.
    pub fn qualify(base_version: &str, timestamp: &str, build_number: u32) -> MavenVersion {
        let version = if base_version.ends_with(SNAPSHOT_QUALIFIER) {
            base_version.to_string()
        }
        else {
            format!("{}-{}", base_version.trim_end_matches('-'), SNAPSHOT_QUALIFIER)
        };
        MavenVersion::Snapshot {
            version,
            timestamp: Some(SnapshotTimestamp {
                timestamp: timestamp.to_string(),
                build_number,
            }),
        }
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(self, MavenVersion::Snapshot { .. })
    }

    /// The version with any snapshot timestamp stripped, i.e. the version used for the directory
    ///  of an artifact inside a repository
    pub fn base_version(&self) -> &str {
        match self {
            MavenVersion::Release(v) => v,
            MavenVersion::Snapshot { version, .. } => version,
        }
    }
}
impl Display for MavenVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MavenVersion::Release(v) => write!(f, "{}", v),
            MavenVersion::Snapshot { version, timestamp: None } => write!(f, "{}", version),
            MavenVersion::Snapshot { version, timestamp: Some(t) } => {
                let prefix = version.strip_suffix(SNAPSHOT_QUALIFIER).unwrap_or(version);
                write!(f, "{}{}-{}", prefix, t.timestamp, t.build_number)
            }
        }
    }
}

#[derive(PartialEq, Eq, Clone, Debug, Hash, Serialize)]
pub struct MavenArtifactId(pub String);

#[derive(PartialEq, Eq, Clone, Debug, Hash, Serialize)]
pub struct MavenGroupId(pub String);

#[derive(PartialEq, Eq, Clone, Debug, Hash, Serialize)]
pub struct MavenCoordinates {
    pub group_id: MavenGroupId,
    pub artifact_id: MavenArtifactId,
    pub version: MavenVersion,
}
impl MavenCoordinates {
    pub fn new(group_id: &str, artifact_id: &str, version: &str) -> MavenCoordinates {
        MavenCoordinates {
            group_id: MavenGroupId(group_id.to_string()),
            artifact_id: MavenArtifactId(artifact_id.to_string()),
            version: MavenVersion::parse(version),
        }
    }
}
impl Display for MavenCoordinates {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.group_id.0, self.artifact_id.0, self.version)
    }
}

#[derive(PartialEq, Eq, Clone, Debug, Hash, Serialize)]
pub enum MavenClassifier {
    Unclassified,
    Classified(String),
}
impl MavenClassifier {
    pub fn from_option(classifier: Option<&str>) -> MavenClassifier {
        match classifier {
            None | Some("") => MavenClassifier::Unclassified,
            Some(c) => MavenClassifier::Classified(c.to_string()),
        }
    }

    pub fn as_option(&self) -> Option<&str> {
        match self {
            MavenClassifier::Unclassified => None,
            MavenClassifier::Classified(c) => Some(c),
        }
    }
}

/// A concrete file in a repository: coordinates plus classifier and type. Identity is structural.
#[derive(PartialEq, Eq, Clone, Debug, Hash, Serialize)]
pub struct MavenArtifactRef {
    pub coordinates: MavenCoordinates,
    pub classifier: MavenClassifier,
    pub artifact_type: String,
}
impl MavenArtifactRef {
    pub fn new(group_id: &str, artifact_id: &str, version: &str, classifier: Option<&str>, artifact_type: &str) -> MavenArtifactRef {
        MavenArtifactRef {
            coordinates: MavenCoordinates::new(group_id, artifact_id, version),
            classifier: MavenClassifier::from_option(classifier),
            artifact_type: artifact_type.to_string(),
        }
    }

    /// The artifact holding the metadata document for the same coordinates
    pub fn model_ref(&self) -> MavenArtifactRef {
        MavenArtifactRef {
            coordinates: self.coordinates.clone(),
            classifier: MavenClassifier::Unclassified,
            artifact_type: POM_TYPE.to_string(),
        }
    }

    pub fn with_version(&self, version: MavenVersion) -> MavenArtifactRef {
        MavenArtifactRef {
            coordinates: MavenCoordinates {
                version,
                ..self.coordinates.clone()
            },
            classifier: self.classifier.clone(),
            artifact_type: self.artifact_type.clone(),
        }
    }

    pub fn is_pom(&self) -> bool {
        self.artifact_type == POM_TYPE
    }

    pub fn is_snapshot(&self) -> bool {
        self.coordinates.version.is_snapshot()
    }

    /// The fully qualified name used as catalog identity: 'group:name:type[:classifier]:version'
    pub fn id(&self) -> String {
        match &self.classifier {
            MavenClassifier::Unclassified => format!("{}:{}:{}:{}",
                self.coordinates.group_id.0,
                self.coordinates.artifact_id.0,
                self.artifact_type,
                self.coordinates.version,
            ),
            MavenClassifier::Classified(c) => format!("{}:{}:{}:{}:{}",
                self.coordinates.group_id.0,
                self.coordinates.artifact_id.0,
                self.artifact_type,
                c,
                self.coordinates.version,
            ),
        }
    }

    pub fn extension(&self) -> &str {
        type_extension(&self.artifact_type)
    }
}

/// The file extension for an artifact type or packaging, following Maven's default artifact
///  handlers
pub fn type_extension(artifact_type: &str) -> &str {
    match artifact_type {
        "bundle" | "maven-plugin" | "ejb" | "ejb-client" | "test-jar" | "java-source" | "javadoc" => "jar",
        other => other,
    }
}
impl Display for MavenArtifactRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

#[cfg(test)]
mod test {
    use rstest::*;
    use super::*;

    #[rstest]
    #[case::release("1.0.0", false, "1.0.0")]
    #[case::release_with_qualifier("1.0.0-beta-2", false, "1.0.0-beta-2")]
    #[case::plain_snapshot("1.0-SNAPSHOT", true, "1.0-SNAPSHOT")]
    #[case::timestamped("1.0-20230101.120000-3", true, "1.0-SNAPSHOT")]
    #[case::timestamped_with_dashes("1.0-rc-20230101.120000-12", true, "1.0-rc-SNAPSHOT")]
    #[case::timestamp_only("20230101.120000-1", true, "SNAPSHOT")]
    #[case::lowercase_snapshot("1.0-snapshot", false, "1.0-snapshot")]
    #[case::timestamp_without_build_number("1.0-20230101.120000", false, "1.0-20230101.120000")]
    #[case::short_timestamp("1.0-2023101.120000-3", false, "1.0-2023101.120000-3")]
    fn test_parse_version(#[case] version: &str, #[case] snapshot: bool, #[case] base_version: &str) {
        let parsed = MavenVersion::parse(version);
        assert_eq!(parsed.is_snapshot(), snapshot);
        assert_eq!(parsed.base_version(), base_version);
        assert_eq!(parsed.to_string(), version);
    }

    #[rstest]
    #[case("1.0-SNAPSHOT", "20230101.120000", 3)]
    #[case("SNAPSHOT", "19991231.235959", 1)]
    #[case("2.1.0-alpha-SNAPSHOT", "20240229.000000", 4711)]
    fn test_qualify_round_trip(#[case] base: &str, #[case] timestamp: &str, #[case] build_number: u32) {
        let qualified = MavenVersion::qualify(base, timestamp, build_number).to_string();
        let parsed = MavenVersion::parse(&qualified);
        assert!(parsed.is_snapshot());
        assert_eq!(parsed.base_version(), base);
    }

    #[rstest]
    #[case("1.0", "1.0-SNAPSHOT", "1.0-20230101.120000-3")]
    #[case("1.0-", "1.0-SNAPSHOT", "1.0-20230101.120000-3")]
    #[case("1.0-SNAPSHOT", "1.0-SNAPSHOT", "1.0-20230101.120000-3")]
    fn test_qualify_release_base(#[case] base: &str, #[case] expected_base: &str, #[case] expected: &str) {
        let qualified = MavenVersion::qualify(base, "20230101.120000", 3);
        assert_eq!(qualified.base_version(), expected_base);
        assert_eq!(qualified.to_string(), expected);
        assert_eq!(MavenVersion::parse(expected), qualified);
    }

    #[test]
    fn test_artifact_id() {
        let jar = MavenArtifactRef::new("org.acme", "lib", "1.0", None, "jar");
        assert_eq!(jar.id(), "org.acme:lib:jar:1.0");

        let sources = MavenArtifactRef::new("org.acme", "lib", "1.0", Some("sources"), "jar");
        assert_eq!(sources.id(), "org.acme:lib:jar:sources:1.0");

        assert_eq!(sources.model_ref().id(), "org.acme:lib:pom:1.0");
        assert!(sources.model_ref().is_pom());
    }

    #[test]
    fn test_empty_classifier_is_unclassified() {
        let artifact = MavenArtifactRef::new("g", "a", "1", Some(""), "jar");
        assert_eq!(artifact.classifier, MavenClassifier::Unclassified);
        assert_eq!(artifact.classifier.as_option(), None);
    }

    #[rstest]
    #[case("jar", "jar")]
    #[case("bundle", "jar")]
    #[case("maven-plugin", "jar")]
    #[case("pom", "pom")]
    #[case("war", "war")]
    fn test_extension(#[case] artifact_type: &str, #[case] extension: &str) {
        let artifact = MavenArtifactRef::new("g", "a", "1", None, artifact_type);
        assert_eq!(artifact.extension(), extension);
    }
}
