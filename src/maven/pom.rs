use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::maven::coordinates::MavenArtifactRef;

pub const DEFAULT_PACKAGING: &str = "jar";
pub const DEFAULT_SCOPE: &str = "compile";
pub const DEFAULT_DEPENDENCY_TYPE: &str = "jar";

/// A 'pom.xml' as declared, i.e. without inheritance or interpolation applied. All leaves are
///  optional strings so that partially broken documents can still be read.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PomXml {
    pub model_version: Option<String>,
    pub parent: Option<PomParent>,
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
    pub packaging: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub properties: HashMap<String, String>,
    pub dependency_management: Option<PomDependencyManagement>,
    pub dependencies: Option<PomDependencies>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PomParent {
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
    pub relative_path: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct PomDependencyManagement {
    pub dependencies: Option<PomDependencies>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct PomDependencies {
    #[serde(rename = "dependency", default)]
    pub dependency: Vec<PomDependency>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PomDependency {
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
    #[serde(rename = "type")]
    pub dependency_type: Option<String>,
    pub classifier: Option<String>,
    pub scope: Option<String>,
    pub optional: Option<String>,
}
impl PomDependency {
    /// The identity used for merging and dependency management: 'groupId:artifactId:type[:classifier]'
    pub fn management_key(&self) -> String {
        let mut key = format!(
            "{}:{}:{}",
            self.group_id.as_deref().unwrap_or(""),
            self.artifact_id.as_deref().unwrap_or(""),
            self.dependency_type.as_deref().unwrap_or(DEFAULT_DEPENDENCY_TYPE),
        );
        if let Some(classifier) = self.classifier.as_deref().filter(|c| !c.is_empty()) {
            key.push(':');
            key.push_str(classifier);
        }
        key
    }
}

impl PomXml {
    pub fn parse(xml: &str) -> anyhow::Result<PomXml> {
        Ok(serde_xml_rs::from_str(xml)?)
    }

    pub async fn read(pom_file: &Path) -> anyhow::Result<PomXml> {
        let xml = tokio::fs::read_to_string(pom_file).await
            .with_context(|| format!("cannot read {}", pom_file.display()))?;
        PomXml::parse(&xml)
            .with_context(|| format!("cannot parse {}", pom_file.display()))
    }

    /// groupId, falling back to the parent's
    pub fn effective_group_id(&self) -> Option<&str> {
        self.group_id.as_deref()
            .or_else(|| self.parent.as_ref().and_then(|p| p.group_id.as_deref()))
    }

    /// version, falling back to the parent's
    pub fn effective_version(&self) -> Option<&str> {
        self.version.as_deref()
            .or_else(|| self.parent.as_ref().and_then(|p| p.version.as_deref()))
    }

    pub fn declared_dependencies(&self) -> &[PomDependency] {
        self.dependencies.as_ref()
            .map(|d| d.dependency.as_slice())
            .unwrap_or(&[])
    }

    pub fn managed_dependencies(&self) -> &[PomDependency] {
        self.dependency_management.as_ref()
            .and_then(|m| m.dependencies.as_ref())
            .map(|d| d.dependency.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DocumentKind {
    /// inheritance, interpolation and dependency management applied
    Effective,
    /// as declared in the file, used when the effective model cannot be built
    Raw,
}

/// A package's metadata as cataloged
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataDocument {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub packaging: String,
    pub classifier: Option<String>,
    pub name: Option<String>,
    pub dependencies: Vec<DeclaredDependency>,
    pub kind: DocumentKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeclaredDependency {
    pub group_id: String,
    pub artifact_id: String,
    pub version: Option<String>,
    pub classifier: Option<String>,
    pub dependency_type: String,
    pub scope: String,
    pub optional: bool,
}
impl DeclaredDependency {
    pub fn from_pom(dependency: &PomDependency) -> Option<DeclaredDependency> {
        Some(DeclaredDependency {
            group_id: dependency.group_id.clone().filter(|s| !s.is_empty())?,
            artifact_id: dependency.artifact_id.clone().filter(|s| !s.is_empty())?,
            version: dependency.version.clone().filter(|s| !s.is_empty()),
            classifier: dependency.classifier.clone().filter(|s| !s.is_empty()),
            dependency_type: dependency.dependency_type.clone().unwrap_or_else(|| DEFAULT_DEPENDENCY_TYPE.to_string()),
            scope: dependency.scope.clone().unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
            optional: dependency.optional.as_deref().map(str::trim) == Some("true"),
        })
    }

    /// The artifact this dependency points to, if its version is concrete
    pub fn target(&self) -> Option<MavenArtifactRef> {
        let version = self.version.as_deref()
            .filter(|v| !v.contains("${"))?;
        Some(MavenArtifactRef::new(
            &self.group_id,
            &self.artifact_id,
            version,
            self.classifier.as_deref(),
            &self.dependency_type,
        ))
    }
}

impl MetadataDocument {
    /// The document as declared, with only groupId / version inherited from the parent declaration
    pub fn raw(pom: &PomXml) -> anyhow::Result<MetadataDocument> {
        let artifact_id = pom.artifact_id.as_deref()
            .ok_or_else(|| anyhow!("POM does not declare an artifactId"))?;

        Ok(MetadataDocument {
            group_id: pom.effective_group_id().unwrap_or_default().to_string(),
            artifact_id: artifact_id.to_string(),
            version: pom.effective_version().unwrap_or_default().to_string(),
            packaging: pom.packaging.clone().unwrap_or_else(|| DEFAULT_PACKAGING.to_string()),
            classifier: None,
            name: pom.name.clone(),
            dependencies: pom.declared_dependencies()
                .iter()
                .filter_map(DeclaredDependency::from_pom)
                .collect(),
            kind: DocumentKind::Raw,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const CHILD_POM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
         xsi:schemaLocation="http://maven.apache.org/POM/4.0.0 http://maven.apache.org/xsd/maven-4.0.0.xsd">
  <modelVersion>4.0.0</modelVersion>
  <parent>
    <groupId>org.acme</groupId>
    <artifactId>parent</artifactId>
    <version>1.0</version>
  </parent>
  <artifactId>lib</artifactId>
  <name>Library</name>
  <properties>
    <junit.version>4.13</junit.version>
  </properties>
  <dependencies>
    <dependency>
      <groupId>junit</groupId>
      <artifactId>junit</artifactId>
      <version>${junit.version}</version>
      <scope>test</scope>
    </dependency>
    <dependency>
      <groupId>org.acme</groupId>
      <artifactId>core</artifactId>
      <optional>true</optional>
    </dependency>
  </dependencies>
  <build>
    <plugins>
      <plugin>
        <artifactId>maven-compiler-plugin</artifactId>
        <dependencies>
          <dependency>
            <groupId>ignored</groupId>
            <artifactId>ignored</artifactId>
          </dependency>
        </dependencies>
      </plugin>
    </plugins>
  </build>
</project>"#;

    #[test]
    fn test_parse_pom() {
        let pom = PomXml::parse(CHILD_POM).unwrap();
        assert_eq!(pom.artifact_id.as_deref(), Some("lib"));
        assert_eq!(pom.group_id, None);
        assert_eq!(pom.effective_group_id(), Some("org.acme"));
        assert_eq!(pom.effective_version(), Some("1.0"));
        assert_eq!(pom.properties.get("junit.version").map(String::as_str), Some("4.13"));
        assert_eq!(pom.declared_dependencies().len(), 2);
        assert!(pom.managed_dependencies().is_empty());
    }

    #[test]
    fn test_raw_document() {
        let pom = PomXml::parse(CHILD_POM).unwrap();
        let raw = MetadataDocument::raw(&pom).unwrap();

        assert_eq!(raw.kind, DocumentKind::Raw);
        assert_eq!(raw.group_id, "org.acme");
        assert_eq!(raw.packaging, "jar");
        assert_eq!(raw.name.as_deref(), Some("Library"));

        // no interpolation, no management
        assert_eq!(raw.dependencies[0].version.as_deref(), Some("${junit.version}"));
        assert_eq!(raw.dependencies[0].scope, "test");
        assert_eq!(raw.dependencies[0].target(), None);
        assert_eq!(raw.dependencies[1].version, None);
        assert!(raw.dependencies[1].optional);
        assert_eq!(raw.dependencies[1].scope, "compile");
    }

    #[test]
    fn test_raw_document_requires_artifact_id() {
        let pom = PomXml::parse("<project><groupId>g</groupId></project>").unwrap();
        assert!(MetadataDocument::raw(&pom).is_err());
    }

    #[test]
    fn test_management_key() {
        let dependency = PomDependency {
            group_id: Some("g".to_string()),
            artifact_id: Some("a".to_string()),
            classifier: Some("tests".to_string()),
            ..Default::default()
        };
        assert_eq!(dependency.management_key(), "g:a:jar:tests");
    }
}
