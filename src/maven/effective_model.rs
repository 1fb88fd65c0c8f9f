use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use async_recursion::async_recursion;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::maven::artifact_provider::ArtifactProvider;
use crate::maven::coordinates::{MavenArtifactRef, POM_TYPE};
use crate::maven::pom::*;

const MAX_PARENT_DEPTH: usize = 32;
const MAX_INTERPOLATION_DEPTH: usize = 16;
const IMPORT_SCOPE: &str = "import";
const VALID_SCOPES: [&str; 5] = ["compile", "provided", "runtime", "test", "system"];

lazy_static! {
    static ref EXPRESSION_REGEX: Regex = Regex::new(r"\$\{([^}]+)\}").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelProblem {
    pub severity: Severity,
    pub message: String,
}
impl ModelProblem {
    fn new(severity: Severity, message: String) -> ModelProblem {
        ModelProblem { severity, message }
    }
}
impl Display for ModelProblem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.severity, self.message)
    }
}

/// Decides which validation problems of an effective model fail the build (and thus cause the
///  fallback to the raw model) and which are only logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    /// only fatal problems (e.g. a document without coordinates) fail the build
    #[default]
    Lenient,
    /// any error (e.g. a dependency without version) fails the build
    Strict,
}
impl ValidationPolicy {
    pub fn threshold(&self) -> Severity {
        match self {
            ValidationPolicy::Lenient => Severity::Fatal,
            ValidationPolicy::Strict => Severity::Error,
        }
    }
}

/// The POM hierarchy of a document merged into one, before validation
#[derive(Debug, Default)]
struct MergedModel {
    group_id: Option<String>,
    artifact_id: Option<String>,
    version: Option<String>,
    packaging: Option<String>,
    name: Option<String>,
    parent: Option<PomParent>,
    properties: HashMap<String, String>,
    managed: Vec<PomDependency>,
    dependencies: Vec<PomDependency>,
}

/// Builds the effective metadata document of a POM: parents are merged in, expressions are
///  interpolated, dependency management (including imported BOMs) is applied.
///
/// Parent and imported POMs are fetched through the [ArtifactProvider]. Any failure doing so,
///  or validation problems at or above the policy's threshold, degrade the result to the raw
///  document rather than failing.
pub struct EffectiveModelBuilder {
    provider: Arc<dyn ArtifactProvider>,
    policy: ValidationPolicy,
}

impl EffectiveModelBuilder {
    pub fn new(provider: Arc<dyn ArtifactProvider>, policy: ValidationPolicy) -> EffectiveModelBuilder {
        EffectiveModelBuilder {
            provider,
            policy,
        }
    }

    /// Returns an error only if the file itself cannot be read as a POM
    pub async fn build(&self, pom_file: &Path) -> anyhow::Result<MetadataDocument> {
        let pom = PomXml::read(pom_file).await?;
        match self.build_effective(pom.clone()).await {
            Ok(document) => Ok(document),
            Err(e) => {
                debug!("Cannot build effective model for {}: {:?}", pom_file.display(), e);
                warn!("Building model for '{}' reported errors: {:#}", pom_file.display(), e);
                warn!("Using raw model for {}", pom_file.display());
                MetadataDocument::raw(&pom)
            }
        }
    }

    async fn build_effective(&self, pom: PomXml) -> anyhow::Result<MetadataDocument> {
        let mut problems = Vec::new();
        let mut model = self.build_merged(pom, &mut Vec::new(), &mut problems).await?;
        apply_management(&mut model);
        validate(&model, &mut problems);
        self.check_problems(&model, problems)?;
        to_document(model)
    }

    #[async_recursion]
    async fn build_merged(&self, pom: PomXml, importing: &mut Vec<String>, problems: &mut Vec<ModelProblem>) -> anyhow::Result<MergedModel> {
        let lineage = self.lineage(pom).await?;
        let mut model = merge(&lineage);
        interpolate_model(&mut model, problems);
        self.import_managed(&mut model, importing, problems).await?;
        Ok(model)
    }

    /// The document followed by its parent, grandparent, ...
    async fn lineage(&self, pom: PomXml) -> anyhow::Result<Vec<PomXml>> {
        let mut lineage = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(pom);

        while let Some(pom) = current.take() {
            let parent = pom.parent.clone();
            lineage.push(pom);

            if let Some(parent) = parent {
                let (group_id, artifact_id, version) = match (parent.group_id, parent.artifact_id, parent.version) {
                    (Some(g), Some(a), Some(v)) => (g, a, v),
                    _ => bail!("incomplete parent declaration"),
                };
                let key = format!("{}:{}:{}", group_id, artifact_id, version);
                if !seen.insert(key.clone()) {
                    bail!("cyclic parent reference to {}", key);
                }
                if lineage.len() > MAX_PARENT_DEPTH {
                    bail!("parent hierarchy deeper than {} levels", MAX_PARENT_DEPTH);
                }
                trace!("resolving parent {}", key);
                current = Some(self.resolve_model(&group_id, &artifact_id, &version).await?);
            }
        }
        Ok(lineage)
    }

    /// Replaces 'import' scoped entries of the dependency management by the managed dependencies
    ///  of the referenced POMs. Entries declared directly take precedence over imported ones, and
    ///  earlier imports over later ones.
    async fn import_managed(&self, model: &mut MergedModel, importing: &mut Vec<String>, problems: &mut Vec<ModelProblem>) -> anyhow::Result<()> {
        let (imports, mut managed): (Vec<_>, Vec<_>) = model.managed
            .drain(..)
            .partition(|d| d.scope.as_deref() == Some(IMPORT_SCOPE) && d.dependency_type.as_deref() == Some(POM_TYPE));

        for import in imports {
            let (group_id, artifact_id, version) = match (&import.group_id, &import.artifact_id, &import.version) {
                (Some(g), Some(a), Some(v)) => (g.clone(), a.clone(), v.clone()),
                _ => bail!("incomplete import declaration {}", import.management_key()),
            };
            let key = format!("{}:{}:{}", group_id, artifact_id, version);
            if importing.contains(&key) {
                bail!("cyclic import of {}", key);
            }

            trace!("importing dependency management of {}", key);
            let pom = self.resolve_model(&group_id, &artifact_id, &version).await?;
            importing.push(key);
            let imported = self.build_merged(pom, importing, problems).await?;
            importing.pop();

            for dependency in imported.managed {
                let dependency_key = dependency.management_key();
                if !managed.iter().any(|m| m.management_key() == dependency_key) {
                    managed.push(dependency);
                }
            }
        }

        model.managed = managed;
        Ok(())
    }

    async fn resolve_model(&self, group_id: &str, artifact_id: &str, version: &str) -> anyhow::Result<PomXml> {
        let model_ref = MavenArtifactRef::new(group_id, artifact_id, version, None, POM_TYPE);
        let resolved = self.provider.get_artifact(&model_ref).await
            .with_context(|| format!("cannot resolve model {}", model_ref))?;
        PomXml::read(&resolved.file).await
    }

    fn check_problems(&self, model: &MergedModel, problems: Vec<ModelProblem>) -> anyhow::Result<()> {
        let threshold = self.policy.threshold();
        let (failures, suppressed): (Vec<_>, Vec<_>) = problems
            .into_iter()
            .partition(|p| p.severity >= threshold);

        let id = format!(
            "{}:{}:{}",
            model.group_id.as_deref().unwrap_or("?"),
            model.artifact_id.as_deref().unwrap_or("?"),
            model.version.as_deref().unwrap_or("?"),
        );
        if !suppressed.is_empty() {
            warn!("Problems have been detected while validating POM model {}: {}.", id, join(&suppressed));
        }
        if !failures.is_empty() {
            return Err(anyhow!("validation of {} failed: {}", id, join(&failures)));
        }
        Ok(())
    }
}

fn join(problems: &[ModelProblem]) -> String {
    problems.iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn merge(lineage: &[PomXml]) -> MergedModel {
    let mut model = MergedModel::default();

    // root ancestor first, so that descendants override
    for pom in lineage.iter().rev() {
        model.group_id = pom.effective_group_id().map(str::to_string).or(model.group_id.take());
        model.version = pom.effective_version().map(str::to_string).or(model.version.take());
        model.properties.extend(pom.properties.iter().map(|(k, v)| (k.clone(), v.clone())));
        merge_dependencies(&mut model.managed, pom.managed_dependencies());
        merge_dependencies(&mut model.dependencies, pom.declared_dependencies());
    }

    if let Some(own) = lineage.first() {
        model.artifact_id = own.artifact_id.clone();
        model.packaging = own.packaging.clone();
        model.name = own.name.clone();
        model.parent = own.parent.clone();
    }
    model
}

fn merge_dependencies(inherited: &mut Vec<PomDependency>, declared: &[PomDependency]) {
    for dependency in declared {
        let key = dependency.management_key();
        match inherited.iter_mut().find(|d| d.management_key() == key) {
            Some(existing) => *existing = dependency.clone(),
            None => inherited.push(dependency.clone()),
        }
    }
}

fn interpolation_values(model: &MergedModel) -> HashMap<String, String> {
    let mut values = model.properties.clone();

    let project_values = [
        ("groupId", &model.group_id),
        ("artifactId", &model.artifact_id),
        ("version", &model.version),
        ("packaging", &model.packaging),
        ("name", &model.name),
    ];
    for (name, value) in project_values {
        if let Some(value) = value {
            values.insert(format!("project.{}", name), value.clone());
            values.insert(format!("pom.{}", name), value.clone());
        }
    }
    if !values.contains_key("project.packaging") {
        values.insert("project.packaging".to_string(), DEFAULT_PACKAGING.to_string());
    }

    if let Some(parent) = &model.parent {
        let parent_values = [
            ("groupId", &parent.group_id),
            ("artifactId", &parent.artifact_id),
            ("version", &parent.version),
        ];
        for (name, value) in parent_values {
            if let Some(value) = value {
                values.insert(format!("project.parent.{}", name), value.clone());
                values.insert(format!("parent.{}", name), value.clone());
            }
        }
    }
    values
}

fn interpolate(value: &str, values: &HashMap<String, String>, problems: &mut Vec<ModelProblem>) -> String {
    let mut current = value.to_string();
    for _ in 0..MAX_INTERPOLATION_DEPTH {
        if !current.contains("${") {
            return current;
        }
        let next = EXPRESSION_REGEX
            .replace_all(&current, |captures: &Captures| {
                values.get(&captures[1])
                    .cloned()
                    .unwrap_or_else(|| captures[0].to_string())
            })
            .into_owned();
        if next == current {
            break;
        }
        current = next;
    }

    if let Some(expression) = EXPRESSION_REGEX.find(&current) {
        problems.push(ModelProblem::new(
            Severity::Warning,
            format!("unresolved expression {} in '{}'", expression.as_str(), value),
        ));
    }
    current
}

fn interpolate_option(value: &mut Option<String>, values: &HashMap<String, String>, problems: &mut Vec<ModelProblem>) {
    if let Some(v) = value {
        *v = interpolate(v, values, problems);
    }
}

fn interpolate_dependency(dependency: &mut PomDependency, values: &HashMap<String, String>, problems: &mut Vec<ModelProblem>) {
    interpolate_option(&mut dependency.group_id, values, problems);
    interpolate_option(&mut dependency.artifact_id, values, problems);
    interpolate_option(&mut dependency.version, values, problems);
    interpolate_option(&mut dependency.dependency_type, values, problems);
    interpolate_option(&mut dependency.classifier, values, problems);
    interpolate_option(&mut dependency.scope, values, problems);
    interpolate_option(&mut dependency.optional, values, problems);
}

fn interpolate_model(model: &mut MergedModel, problems: &mut Vec<ModelProblem>) {
    let values = interpolation_values(model);

    interpolate_option(&mut model.group_id, &values, problems);
    interpolate_option(&mut model.version, &values, problems);
    for dependency in model.managed.iter_mut().chain(model.dependencies.iter_mut()) {
        interpolate_dependency(dependency, &values, problems);
    }
}

fn apply_management(model: &mut MergedModel) {
    for dependency in model.dependencies.iter_mut() {
        let key = dependency.management_key();
        if let Some(managed) = model.managed.iter().find(|m| m.management_key() == key) {
            if dependency.version.is_none() {
                dependency.version = managed.version.clone();
            }
            if dependency.scope.is_none() {
                dependency.scope = managed.scope.clone();
            }
            if dependency.optional.is_none() {
                dependency.optional = managed.optional.clone();
            }
        }
    }
}

fn validate(model: &MergedModel, problems: &mut Vec<ModelProblem>) {
    for (field, value) in [("groupId", &model.group_id), ("artifactId", &model.artifact_id), ("version", &model.version)] {
        if value.as_deref().map_or(true, str::is_empty) {
            problems.push(ModelProblem::new(Severity::Fatal, format!("'{}' is missing", field)));
        }
    }

    let mut seen = HashSet::new();
    for dependency in &model.dependencies {
        let key = dependency.management_key();
        if dependency.group_id.is_none() || dependency.artifact_id.is_none() {
            problems.push(ModelProblem::new(Severity::Error, format!("'dependencies.dependency' {} lacks groupId or artifactId", key)));
            continue;
        }
        match dependency.version.as_deref() {
            None | Some("") => problems.push(ModelProblem::new(Severity::Error, format!("'dependencies.dependency.version' for {} is missing", key))),
            Some(v) if v.contains("${") => problems.push(ModelProblem::new(Severity::Error, format!("'dependencies.dependency.version' for {} is not resolvable: {}", key, v))),
            _ => {}
        }
        if let Some(scope) = dependency.scope.as_deref() {
            if !VALID_SCOPES.contains(&scope) {
                problems.push(ModelProblem::new(Severity::Warning, format!("'dependencies.dependency.scope' for {} has invalid value '{}'", key, scope)));
            }
        }
        if !seen.insert(key.clone()) {
            problems.push(ModelProblem::new(Severity::Warning, format!("'dependencies.dependency' {} is declared more than once", key)));
        }
    }
}

fn to_document(model: MergedModel) -> anyhow::Result<MetadataDocument> {
    let artifact_id = model.artifact_id
        .ok_or_else(|| anyhow!("effective model has no artifactId"))?;

    Ok(MetadataDocument {
        group_id: model.group_id.unwrap_or_default(),
        artifact_id,
        version: model.version.unwrap_or_default(),
        packaging: model.packaging.unwrap_or_else(|| DEFAULT_PACKAGING.to_string()),
        classifier: None,
        name: model.name,
        dependencies: model.dependencies
            .iter()
            .filter_map(DeclaredDependency::from_pom)
            .collect(),
        kind: DocumentKind::Effective,
    })
}
