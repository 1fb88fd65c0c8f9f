use anyhow::anyhow;
use lazy_static::lazy_static;
use regex::Regex;

use crate::maven::coordinates::*;

pub const METADATA_FILE_NAME: &str = "maven-metadata.xml";

/// Extensions containing a '.' that are recognized in file names
const COMPOUND_EXTENSIONS: &[&str] = &["tar.gz", "tar.bz2", "tar.xz"];

lazy_static! {
    static ref TIMESTAMP_BUILD_NUMBER_REGEX: Regex = Regex::new(r"^(\d{8}\.\d{6})-(\d+)").unwrap();
}


/// The path of an artifact relative to the repository root:
///  '<group as dirs>/<artifactId>/<baseVersion>/<artifactId>-<version>[-<classifier>].<extension>'
pub fn as_maven_path(artifact_ref: &MavenArtifactRef) -> String {
    format!(
        "{}/{}",
        version_directory(&artifact_ref.coordinates),
        maven_file_name(artifact_ref),
    )
}

/// The path of the 'maven-metadata.xml' file listing the deployed snapshots of a version
pub fn snapshot_metadata_path(coordinates: &MavenCoordinates) -> String {
    format!("{}/{}", version_directory(coordinates), METADATA_FILE_NAME)
}

fn version_directory(coordinates: &MavenCoordinates) -> String {
    format!(
        "{}/{}/{}",
        coordinates.group_id.0.replace('.', "/"),
        coordinates.artifact_id.0,
        coordinates.version.base_version(),
    )
}

fn maven_file_name(artifact_ref: &MavenArtifactRef) -> String {
    let classifier_string = match &artifact_ref.classifier {
        MavenClassifier::Unclassified => "".to_string(),
        MavenClassifier::Classified(c) => format!("-{}", c),
    };

    format!("{}-{}{}.{}",
            artifact_ref.coordinates.artifact_id.0,
            artifact_ref.coordinates.version,
            classifier_string,
            artifact_ref.extension(),
    )
}


fn parse_maven_filename<'a>(file_name: &'a str, artifact_id: &str, version_string: &str) -> anyhow::Result<ParseFilenameResult<'a>> {
    let full_file_name = file_name;

    let file_name = file_name.strip_prefix(artifact_id)
        .and_then(|s| s.strip_prefix('-'))
        .ok_or_else(|| anyhow!("{} is not a valid maven file name: expected to start with artifact id {}", full_file_name, artifact_id))?;

    let (version, file_name) = if let Some(prefix) = version_string.strip_suffix(SNAPSHOT_QUALIFIER) {
        // <artifactId>-<baseVersion>[-<classifier>].<extension> or
        // <artifactId>-<version prefix><timestamp>-<buildNumber>[-<classifier>].<extension>
        let file_name = file_name.strip_prefix(prefix)
            .ok_or_else(|| anyhow!("{} is not a valid maven file name: expected to have version string {}", full_file_name, version_string))?;

        if let Some(rest) = file_name.strip_prefix(SNAPSHOT_QUALIFIER) {
            (MavenVersion::parse(version_string), rest)
        }
        else if let Some(captures) = TIMESTAMP_BUILD_NUMBER_REGEX.captures(file_name) {
            let build_number = captures[2].parse::<u32>()?;
            let version = MavenVersion::qualify(version_string, &captures[1], build_number);
            (version, &file_name[captures[0].len()..])
        }
        else {
            return Err(anyhow!("snapshot file name has neither 'SNAPSHOT' nor a timestamp: {}", full_file_name));
        }
    }
    else {
        // <artifactId>-<version>[-<classifier>].<extension>
        let rest = file_name.strip_prefix(version_string)
            .ok_or_else(|| anyhow!("{} is not a valid maven file name: expected to have version string {}", full_file_name, version_string))?;
        (MavenVersion::Release(version_string.to_string()), rest)
    };

    // NB: classifiers may contain '-' and '.'
    let (classifier_part, extension) = split_extension(file_name)
        .ok_or_else(|| anyhow!("not a valid maven file name - no extension: {}", full_file_name))?;
    if extension.is_empty() {
        return Err(anyhow!("not a valid maven file name - empty extension: {}", full_file_name));
    }

    let classifier = if classifier_part.is_empty() {
        None
    }
    else if let Some(c) = classifier_part.strip_prefix('-').filter(|c| !c.is_empty()) {
        Some(c)
    }
    else {
        return Err(anyhow!("not a valid maven file name - invalid classifier format: {}", full_file_name));
    };

    Ok(ParseFilenameResult {
        version,
        classifier,
        extension,
    })
}

fn split_extension(file_name: &str) -> Option<(&str, &str)> {
    COMPOUND_EXTENSIONS.iter()
        .find_map(|extension| {
            let rest = file_name.strip_suffix(extension)?.strip_suffix('.')?;
            Some((rest, &file_name[rest.len() + 1..]))
        })
        .or_else(|| file_name.rsplit_once('.'))
}

/// path is the relative path inside a maven repository, i.e. it starts with something like
///  "org/..." or "com/..."
pub fn parse_maven_path(path: &str) -> anyhow::Result<MavenArtifactRef> {
    let path = path.trim_start_matches('/');

    if let Some((without_filename, file_name)) = path.rsplit_once('/') {
        if let Some((without_version, version)) = without_filename.rsplit_once('/') {
            if let Some((group_id, artifact_id)) = without_version.rsplit_once('/') {
                let parsed_filename = parse_maven_filename(file_name, artifact_id, version)?;

                return Ok(MavenArtifactRef {
                    coordinates: MavenCoordinates {
                        group_id: MavenGroupId(group_id.replace('/', ".")),
                        artifact_id: MavenArtifactId(artifact_id.to_string()),
                        version: parsed_filename.version,
                    },
                    classifier: MavenClassifier::from_option(parsed_filename.classifier),
                    artifact_type: parsed_filename.extension.to_string(),
                });
            }
        }
    }

    Err(anyhow!("not a valid Maven artifact path: {:?}", path))
}


#[derive(Debug, Eq, PartialEq)]
struct ParseFilenameResult<'a> {
    version: MavenVersion,
    classifier: Option<&'a str>,
    extension: &'a str, // without leading '.', e.g. "jar"
}
