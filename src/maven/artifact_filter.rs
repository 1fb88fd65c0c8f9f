use std::fmt::{Display, Formatter};

use anyhow::{bail, Context};
use glob::Pattern;

use crate::maven::coordinates::MavenArtifactRef;

/// A single 'group:artifact:type[:classifier]' pattern, each token a glob. Tokens that are
///  omitted match anything.
#[derive(Debug, Clone)]
struct ArtifactPattern {
    original: String,
    tokens: Vec<Pattern>,
}

impl ArtifactPattern {
    fn parse(pattern: &str) -> anyhow::Result<ArtifactPattern> {
        let raw_tokens: Vec<&str> = pattern.split(':').map(str::trim).collect();
        if raw_tokens.len() > 4 || raw_tokens.iter().any(|t| t.is_empty()) {
            bail!("invalid artifact pattern '{}', expected 'group:artifact:type[:classifier]'", pattern);
        }

        let tokens = raw_tokens.iter()
            .map(|t| Pattern::new(t).with_context(|| format!("invalid glob '{}' in artifact pattern '{}'", t, pattern)))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(ArtifactPattern {
            original: pattern.to_string(),
            tokens,
        })
    }

    fn matches(&self, artifact_ref: &MavenArtifactRef) -> bool {
        let values = [
            artifact_ref.coordinates.group_id.0.as_str(),
            artifact_ref.coordinates.artifact_id.0.as_str(),
            artifact_ref.artifact_type.as_str(),
            artifact_ref.classifier.as_option().unwrap_or(""),
        ];
        self.tokens.iter()
            .zip(values)
            .all(|(pattern, value)| pattern.matches(value))
    }
}

/// Include / exclude filter for artifacts. An artifact passes if it matches any include
///  pattern (or there are none) and no exclude pattern.
///
/// Immutable after construction, so it can be shared freely between tasks.
#[derive(Debug, Clone, Default)]
pub struct ArtifactFilter {
    includes: Vec<ArtifactPattern>,
    excludes: Vec<ArtifactPattern>,
}

impl ArtifactFilter {
    pub fn new<S: AsRef<str>>(includes: &[S], excludes: &[S]) -> anyhow::Result<ArtifactFilter> {
        Ok(ArtifactFilter {
            includes: parse_patterns(includes)?,
            excludes: parse_patterns(excludes)?,
        })
    }

    pub fn matches(&self, artifact_ref: &MavenArtifactRef) -> bool {
        let included = self.includes.is_empty() || self.includes.iter().any(|p| p.matches(artifact_ref));
        included && !self.excludes.iter().any(|p| p.matches(artifact_ref))
    }
}

impl Display for ArtifactFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let originals = |patterns: &[ArtifactPattern]| patterns.iter()
            .map(|p| p.original.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "includes [{}], excludes [{}]", originals(&self.includes[..]), originals(&self.excludes[..]))
    }
}

fn parse_patterns<S: AsRef<str>>(patterns: &[S]) -> anyhow::Result<Vec<ArtifactPattern>> {
    patterns.iter()
        .map(|p| ArtifactPattern::parse(p.as_ref()))
        .collect()
}

/// Patterns from a comma-separated list, e.g. "org.acme.*:*:jar, org.other:*:*:sources"
pub fn split_patterns(patterns: &str) -> Vec<String> {
    patterns.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod test {
    use rstest::*;
    use super::*;

    const GROUP: &str = "org.acme.plugin";
    const ARTIFACT: &str = "acme.plugin.m2repo";

    fn artifact(artifact_type: &str, classifier: Option<&str>) -> MavenArtifactRef {
        MavenArtifactRef::new(GROUP, ARTIFACT, "1.0.0", classifier, artifact_type)
    }

    #[rstest]
    #[case::includes(Some("org.acme.*:*:jar"), None, "jar", None, true)]
    #[case::includes_other_type(Some("org.acme.*:*:jar"), None, "zip", None, false)]
    #[case::includes_any_classifier(Some("org.acme.*:*:jar"), None, "jar", Some("sources"), true)]
    #[case::includes_classifier(Some("org.acme.*:*:jar:sources"), None, "jar", Some("sources"), true)]
    #[case::includes_classifier_other(Some("org.acme.*:*:jar:sources"), None, "zip", Some("tests"), false)]
    #[case::includes_classifier_unclassified(Some("org.acme.*:*:jar:sources"), None, "zip", None, false)]
    #[case::excludes(None, Some("org.acme.*:*:jar"), "jar", None, false)]
    #[case::excludes_other_type(None, Some("org.acme.*:*:jar"), "zip", None, true)]
    #[case::excludes_classifier(None, Some("org.acme.*:*:jar:sources"), "jar", Some("sources"), false)]
    #[case::excludes_classifier_other(None, Some("org.acme.*:*:jar:sources"), "zip", Some("tests"), true)]
    #[case::excludes_classifier_unclassified(None, Some("org.acme.*:*:jar:sources"), "zip", None, true)]
    #[case::includes_and_excludes(Some("org.acme.*:*:jar"), Some("org.acme.*:*:zip"), "jar", None, true)]
    #[case::includes_and_excludes_excluded(Some("org.acme.*:*:jar"), Some("org.acme.*:*:zip"), "zip", None, false)]
    #[case::excludes_win(Some("org.acme.*:*:*"), Some("*:*:jar"), "jar", None, false)]
    #[case::several_includes(Some("x:*:*, *:acme.plugin.*:zip"), None, "zip", None, true)]
    #[case::no_filter(None, None, "jar", None, true)]
    #[case::no_filter_zip(None, None, "zip", None, true)]
    fn test_matches(#[case] includes: Option<&str>, #[case] excludes: Option<&str>, #[case] artifact_type: &str, #[case] classifier: Option<&str>, #[case] expected: bool) {
        let includes = includes.map(split_patterns).unwrap_or_default();
        let excludes = excludes.map(split_patterns).unwrap_or_default();
        let filter = ArtifactFilter::new(&includes[..], &excludes[..]).unwrap();
        assert_eq!(filter.matches(&artifact(artifact_type, classifier)), expected);
    }

    #[rstest]
    #[case("g:a:jar:sources:1.0")]
    #[case("g::jar")]
    #[case("g:[a:jar")]
    fn test_invalid_pattern(#[case] pattern: &str) {
        assert!(ArtifactFilter::new(&[pattern], &[]).is_err());
    }

    #[test]
    fn test_short_pattern_matches_remaining_tokens() {
        let filter = ArtifactFilter::new(&["org.acme.*"], &[]).unwrap();
        assert!(filter.matches(&artifact("war", Some("classes"))));
        assert_eq!(filter.to_string(), "includes [org.acme.*], excludes []");
    }
}
