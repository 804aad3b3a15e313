//! Build descriptors: the persisted cache record of one module build.

use crate::module::{ProducedArtifact, artifact_key};
use crate::phase::LifecyclePhase;
use crate::step::BuildStep;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag written into every descriptor this implementation produces.
pub const CACHE_IMPLEMENTATION_VERSION: &str = "v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestKind {
    File,
    Dependency,
    /// Artifact produced by a module of the session, digested by that module's checksum.
    Module,
    Property,
    /// Raw effective configuration of the module.
    EffectiveConfig,
}

/// One input contributing to a module checksum. Identity is `(kind, key)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestItem {
    pub kind: DigestKind,
    pub key: String,
    pub hash: Option<String>,
    pub value: Option<String>,
    /// Hash of the artifact file, for module digests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<String>,
}

impl DigestItem {
    pub fn file(key: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            kind: DigestKind::File,
            key: key.into(),
            hash: Some(hash.into()),
            value: None,
            file_hash: None,
        }
    }

    pub fn dependency(key: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            kind: DigestKind::Dependency,
            key: key.into(),
            hash: Some(hash.into()),
            value: None,
            file_hash: None,
        }
    }

    pub fn property(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: DigestKind::Property,
            key: key.into(),
            hash: None,
            value: Some(value.into()),
            file_hash: None,
        }
    }

    pub fn effective_config(
        key: impl Into<String>,
        body: impl Into<String>,
        hash: impl Into<String>,
    ) -> Self {
        Self {
            kind: DigestKind::EffectiveConfig,
            key: key.into(),
            hash: Some(hash.into()),
            value: Some(body.into()),
            file_hash: None,
        }
    }

    /// Digest of an artifact produced in this session, keyed to its module's checksum.
    pub fn by_module_checksum(artifact: &ArtifactDescriptor, checksum: &str) -> Self {
        Self {
            kind: DigestKind::Module,
            key: artifact.versionless_key(),
            hash: Some(checksum.to_string()),
            value: None,
            file_hash: artifact.file_hash.clone(),
        }
    }

    /// The hash when present, else the raw value.
    pub fn digest(&self) -> Option<&str> {
        self.hash.as_deref().or(self.value.as_deref())
    }
}

/// A module checksum together with the inputs that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectsInputInfo {
    pub checksum: String,
    #[serde(default)]
    pub items: Vec<DigestItem>,
}

impl ProjectsInputInfo {
    pub fn new(checksum: impl Into<String>, items: Vec<DigestItem>) -> Self {
        Self {
            checksum: checksum.into(),
            items,
        }
    }

    pub fn effective_config(&self) -> Option<&DigestItem> {
        self.items
            .iter()
            .find(|item| item.kind == DigestKind::EffectiveConfig)
    }

    pub fn find(&self, kind: DigestKind, key: &str) -> Option<&DigestItem> {
        self.items
            .iter()
            .find(|item| item.kind == kind && item.key == key)
    }
}

/// A cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub artifact_type: String,
    pub classifier: Option<String>,
    pub file_name: Option<String>,
    pub file_hash: Option<String>,
    pub file_size: Option<u64>,
}

impl ArtifactDescriptor {
    /// Descriptor of a produced artifact, without content hash.
    pub fn from_produced(artifact: &ProducedArtifact) -> Self {
        Self {
            group_id: artifact.group_id.clone(),
            artifact_id: artifact.artifact_id.clone(),
            version: artifact.version.clone(),
            artifact_type: artifact.artifact_type.clone(),
            classifier: artifact.classifier.clone(),
            file_name: artifact.file_name(),
            file_hash: None,
            file_size: None,
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

    /// Key of this artifact with its type replaced.
    pub fn key_with_type(&self, artifact_type: &str) -> String {
        artifact_key(
            &self.group_id,
            &self.artifact_id,
            artifact_type,
            self.classifier.as_deref(),
            &self.version,
        )
    }

    pub fn versionless_key(&self) -> String {
        match self.classifier.as_deref().filter(|c| !c.is_empty()) {
            Some(classifier) => format!(
                "{}:{}:{}:{}",
                self.group_id, self.artifact_id, self.artifact_type, classifier
            ),
            None => format!("{}:{}:{}", self.group_id, self.artifact_id, self.artifact_type),
        }
    }

    pub fn has_file(&self) -> bool {
        self.file_name.as_deref().is_some_and(|name| !name.trim().is_empty())
    }
}

/// A recorded property of a completed execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyValue {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub tracked: bool,
}

/// Record of one executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedExecution {
    pub execution_key: String,
    pub implementation: String,
    #[serde(default)]
    pub properties: Vec<PropertyValue>,
}

impl CompletedExecution {
    pub fn new(execution_key: impl Into<String>, implementation: impl Into<String>) -> Self {
        Self {
            execution_key: execution_key.into(),
            implementation: implementation.into(),
            properties: vec![],
        }
    }

    pub fn add_property(&mut self, name: impl Into<String>, value: impl Into<String>, tracked: bool) {
        self.properties.push(PropertyValue {
            name: name.into(),
            value: value.into(),
            tracked,
        });
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Whether a value was recorded for every name in `names`.
    pub fn contains_all_properties<I, S>(&self, names: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .all(|name| self.property(name.as_ref()).is_some())
    }
}

/// Source-control state of the workspace at save time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScmInfo {
    pub url: Option<String>,
    pub branch: Option<String>,
    pub revision: Option<String>,
}

impl ScmInfo {
    pub fn is_empty(&self) -> bool {
        self.url.is_none() && self.branch.is_none() && self.revision.is_none()
    }
}

/// The cache record of one module build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildDescriptor {
    pub goals: Vec<String>,
    pub artifact: ArtifactDescriptor,
    #[serde(default)]
    pub attached_artifacts: Vec<ArtifactDescriptor>,
    pub input_info: ProjectsInputInfo,
    #[serde(default)]
    pub executions: Vec<CompletedExecution>,
    pub hash_algorithm: String,
    pub cache_implementation_version: String,
    pub scm: Option<ScmInfo>,
    #[serde(rename = "final", default)]
    pub is_final: bool,
    pub created_at: DateTime<Utc>,
}

impl BuildDescriptor {
    pub fn new(
        goals: Vec<String>,
        artifact: ArtifactDescriptor,
        attached_artifacts: Vec<ArtifactDescriptor>,
        input_info: ProjectsInputInfo,
        executions: Vec<CompletedExecution>,
        hash_algorithm: impl Into<String>,
    ) -> Self {
        Self {
            goals,
            artifact,
            attached_artifacts,
            input_info,
            executions,
            hash_algorithm: hash_algorithm.into(),
            cache_implementation_version: CACHE_IMPLEMENTATION_VERSION.to_string(),
            scm: None,
            is_final: false,
            created_at: Utc::now(),
        }
    }

    pub fn checksum(&self) -> &str {
        &self.input_info.checksum
    }

    pub fn is_compatible(&self) -> bool {
        self.cache_implementation_version == CACHE_IMPLEMENTATION_VERSION
    }

    /// Latest lifecycle phase among the recorded goals. Plugin goals such as
    /// `dependency:tree` are not phases and do not count.
    pub fn highest_completed_phase(&self) -> Option<LifecyclePhase> {
        self.goals
            .iter()
            .filter_map(|goal| goal.parse::<LifecyclePhase>().ok())
            .max()
    }

    pub fn find_execution(&self, step: &BuildStep) -> Option<&CompletedExecution> {
        let key = step.execution_key();
        self.executions.iter().find(|e| e.execution_key == key)
    }

    pub fn has_execution(&self, step: &BuildStep) -> bool {
        self.find_execution(step).is_some()
    }
}
