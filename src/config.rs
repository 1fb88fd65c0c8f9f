use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize};

use crate::maven::artifact_filter::{split_patterns, ArtifactFilter};
use crate::maven::effective_model::ValidationPolicy;

pub const DEFAULT_DIRECTORY: &str = "arti-catalog/m2repo";
pub const DEFAULT_FLUSH_INTERVAL: u64 = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    /// 'group:artifact:type[:classifier]' glob patterns, as a list or a comma-separated string
    #[serde(deserialize_with = "pattern_list")]
    pub includes: Vec<String>,
    #[serde(deserialize_with = "pattern_list")]
    pub excludes: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PatternList {
    List(Vec<String>),
    CommaSeparated(String),
}

fn pattern_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match PatternList::deserialize(deserializer)? {
        PatternList::List(patterns) => patterns,
        PatternList::CommaSeparated(s) => split_patterns(&s),
    })
}

/// Settings for scanning repositories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScannerConfig {
    /// fetch and scan artifact files in addition to their POMs
    pub scan_artifacts: bool,
    /// keep fetched files in the local directory after scanning them
    pub keep_artifacts: bool,
    pub filter: FilterConfig,
    /// root of the local repositories, one subdirectory per remote repository
    pub directory: Option<PathBuf>,
    pub validation: ValidationPolicy,
    /// the graph store is flushed after this many processed artifacts
    pub flush_interval: u64,
}

impl Default for ScannerConfig {
    fn default() -> ScannerConfig {
        ScannerConfig {
            scan_artifacts: false,
            keep_artifacts: true,
            filter: Default::default(),
            directory: None,
            validation: Default::default(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

impl ScannerConfig {
    pub fn from_json(json: &str) -> anyhow::Result<ScannerConfig> {
        Ok(serde_json::from_str(json)?)
    }

    pub async fn read(path: &Path) -> anyhow::Result<ScannerConfig> {
        let json = tokio::fs::read_to_string(path).await
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        ScannerConfig::from_json(&json)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn local_directory(&self) -> PathBuf {
        self.directory.clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DIRECTORY))
    }

    pub fn artifact_filter(&self) -> anyhow::Result<ArtifactFilter> {
        ArtifactFilter::new(&self.filter.includes[..], &self.filter.excludes[..])
    }
}
