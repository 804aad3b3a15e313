//! Modules, their produced artifacts and the build session.

use crate::ids::SessionId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Key identifying one artifact: `group:artifact:type[:classifier]:version`.
pub fn artifact_key(
    group_id: &str,
    artifact_id: &str,
    artifact_type: &str,
    classifier: Option<&str>,
    version: &str,
) -> String {
    match classifier.filter(|c| !c.is_empty()) {
        Some(classifier) => format!(
            "{}:{}:{}:{}:{}",
            group_id, artifact_id, artifact_type, classifier, version
        ),
        None => format!("{}:{}:{}:{}", group_id, artifact_id, artifact_type, version),
    }
}

/// Versionless module coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinate {
    pub group_id: String,
    pub artifact_id: String,
}

impl Coordinate {
    pub fn new(group_id: impl Into<String>, artifact_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
        }
    }

    /// Key used for per-session bookkeeping (`group:artifact`).
    pub fn versionless_key(&self) -> String {
        format!("{}:{}", self.group_id, self.artifact_id)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group_id, self.artifact_id)
    }
}

/// A resolved dependency of a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    #[serde(default = "default_type")]
    pub artifact_type: String,
    pub classifier: Option<String>,
    /// Local file of the dependency, when resolved.
    pub file: Option<PathBuf>,
}

fn default_type() -> String {
    "jar".to_string()
}

impl Dependency {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
            artifact_type: default_type(),
            classifier: None,
            file: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn artifact_key(&self) -> String {
        artifact_key(
            &self.group_id,
            &self.artifact_id,
            &self.artifact_type,
            self.classifier.as_deref(),
            &self.version,
        )
    }
}

/// A buildable unit of the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub coordinate: Coordinate,
    pub version: String,
    /// Type of the primary artifact (`jar`, `pom`, ...).
    pub packaging: String,
    pub base_dir: PathBuf,
    /// Build output directory; generated sources and attached outputs live here.
    pub target_dir: PathBuf,
    #[serde(default)]
    pub source_roots: Vec<PathBuf>,
    #[serde(default)]
    pub test_source_roots: Vec<PathBuf>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Module {
    pub fn new(coordinate: Coordinate, version: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            coordinate,
            version: version.into(),
            packaging: "jar".to_string(),
            target_dir: base_dir.join("target"),
            base_dir,
            source_roots: vec![],
            test_source_roots: vec![],
            dependencies: vec![],
            properties: BTreeMap::new(),
        }
    }

    pub fn with_packaging(mut self, packaging: impl Into<String>) -> Self {
        self.packaging = packaging.into();
        self
    }

    pub fn with_source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.source_roots.push(root.into());
        self
    }

    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn artifact_id(&self) -> &str {
        &self.coordinate.artifact_id
    }

    pub fn group_id(&self) -> &str {
        &self.coordinate.group_id
    }
}

/// An artifact bound to a module in the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducedArtifact {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub artifact_type: String,
    pub classifier: Option<String>,
    pub file: Option<PathBuf>,
    pub resolved: bool,
}

impl ProducedArtifact {
    /// The module's primary artifact, not yet bound to a file.
    pub fn primary(module: &Module) -> Self {
        Self {
            group_id: module.coordinate.group_id.clone(),
            artifact_id: module.coordinate.artifact_id.clone(),
            version: module.version.clone(),
            artifact_type: module.packaging.clone(),
            classifier: None,
            file: None,
            resolved: false,
        }
    }

    /// A secondary output of the module backed by `file`.
    pub fn attached(
        module: &Module,
        artifact_type: impl Into<String>,
        classifier: Option<String>,
        file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            group_id: module.coordinate.group_id.clone(),
            artifact_id: module.coordinate.artifact_id.clone(),
            version: module.version.clone(),
            artifact_type: artifact_type.into(),
            classifier,
            file: Some(file.into()),
            resolved: true,
        }
    }

    pub fn key(&self) -> String {
        artifact_key(
            &self.group_id,
            &self.artifact_id,
            &self.artifact_type,
            self.classifier.as_deref(),
            &self.version,
        )
    }

    pub fn file_name(&self) -> Option<String> {
        self.file
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
    }
}

/// The build outputs the host currently has bound for a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleOutputs {
    pub primary: ProducedArtifact,
    pub attached: Vec<ProducedArtifact>,
}

impl ModuleOutputs {
    pub fn new(module: &Module) -> Self {
        Self {
            primary: ProducedArtifact::primary(module),
            attached: vec![],
        }
    }

    pub fn with_primary_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.primary.file = Some(file.into());
        self.primary.resolved = true;
        self
    }

    pub fn attach(&mut self, artifact: ProducedArtifact) {
        self.attached.push(artifact);
    }

    /// Unbind the primary artifact and drop every attached artifact.
    pub fn reset(&mut self) {
        self.primary.file = None;
        self.primary.resolved = false;
        self.attached.clear();
    }
}

/// Every module built in the session.
#[derive(Debug, Clone, Default)]
pub struct ModuleIndex {
    modules: HashSet<Coordinate>,
}

impl ModuleIndex {
    pub fn from_modules<'a>(modules: impl IntoIterator<Item = &'a Coordinate>) -> Self {
        Self {
            modules: modules.into_iter().cloned().collect(),
        }
    }

    /// Whether the coordinate is built in this session rather than resolved externally.
    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        self.modules.contains(coordinate)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// One invocation of the host build.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    /// Goals requested on the command line, in order.
    pub goals: Vec<String>,
    pub root_dir: PathBuf,
    /// Directory receiving diff reports for this session.
    pub report_dir: PathBuf,
}

impl Session {
    pub fn new(goals: Vec<String>, root_dir: impl Into<PathBuf>) -> Self {
        let root_dir = root_dir.into();
        Self {
            id: SessionId::new(),
            goals,
            report_dir: root_dir.join("target").join("kiln"),
            root_dir,
        }
    }

    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = dir.into();
        self
    }
}
