//! Build steps and the live configuration they executed with.

use crate::phase::LifecyclePhase;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// The plugin implementing a step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PluginRef {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

impl PluginRef {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
        }
    }
}

/// A configuration parameter declared by a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepParameter {
    pub name: String,
    /// Only editable parameters can be set by users, so only they are recorded.
    pub editable: bool,
}

/// One step of a module's requested execution sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStep {
    pub plugin: PluginRef,
    pub goal: String,
    pub execution_id: String,
    pub phase: LifecyclePhase,
    /// Identity of the code implementing the step.
    #[serde(default)]
    pub implementation: String,
    #[serde(default)]
    pub parameters: Vec<StepParameter>,
}

impl BuildStep {
    pub fn new(
        plugin: PluginRef,
        goal: impl Into<String>,
        execution_id: impl Into<String>,
        phase: LifecyclePhase,
    ) -> Self {
        Self {
            plugin,
            goal: goal.into(),
            execution_id: execution_id.into(),
            phase,
            implementation: String::new(),
            parameters: vec![],
        }
    }

    pub fn with_implementation(mut self, implementation: impl Into<String>) -> Self {
        self.implementation = implementation.into();
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, editable: bool) -> Self {
        self.parameters.push(StepParameter {
            name: name.into(),
            editable,
        });
        self
    }

    /// Stable key identifying this execution across builds.
    pub fn execution_key(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.execution_id,
            self.goal,
            self.plugin.artifact_id,
            self.plugin.group_id,
            self.plugin.version
        )
    }
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} ({})",
            self.plugin.artifact_id, self.goal, self.execution_id
        )
    }
}

/// Read access to the configuration a step executed with.
pub trait StepConfiguration: Send + Sync {
    /// Current value of parameter `name`.
    fn value(&self, name: &str) -> Result<Value>;
}

/// Step configuration backed by a fixed map of values.
#[derive(Debug, Clone, Default)]
pub struct MapConfiguration {
    values: BTreeMap<String, Value>,
}

impl MapConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl StepConfiguration for MapConfiguration {
    fn value(&self, name: &str) -> Result<Value> {
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| Error::PropertyUnreadable {
                property: name.to_string(),
                step: "map configuration".to_string(),
                reason: "no such parameter".to_string(),
            })
    }
}

/// Notification that a step finished, with access to its live configuration.
#[derive(Clone)]
pub struct ExecutionEvent {
    pub step: BuildStep,
    /// Base directory of the module; path values are recorded relative to it.
    pub base_dir: PathBuf,
    pub configuration: Arc<dyn StepConfiguration>,
}

impl ExecutionEvent {
    pub fn new(
        step: BuildStep,
        base_dir: impl Into<PathBuf>,
        configuration: Arc<dyn StepConfiguration>,
    ) -> Self {
        Self {
            step,
            base_dir: base_dir.into(),
            configuration,
        }
    }
}

impl fmt::Debug for ExecutionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionEvent")
            .field("step", &self.step)
            .field("base_dir", &self.base_dir)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_key() {
        let step = BuildStep::new(
            PluginRef::new("org.apache.maven.plugins", "maven-compiler-plugin", "3.11.0"),
            "compile",
            "default-compile",
            LifecyclePhase::Compile,
        );
        assert_eq!(
            step.execution_key(),
            "default-compile:compile:maven-compiler-plugin:org.apache.maven.plugins:3.11.0"
        );
        assert_eq!(step.to_string(), "maven-compiler-plugin:compile (default-compile)");
    }

    #[test]
    fn test_map_configuration_missing_value_errors() {
        let config = MapConfiguration::new().with("source", "17");
        assert_eq!(config.value("source").unwrap(), Value::from("17"));
        assert!(matches!(
            config.value("target"),
            Err(Error::PropertyUnreadable { .. })
        ));
    }
}
