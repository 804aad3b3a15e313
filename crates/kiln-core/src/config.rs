//! Cache configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Cache configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether caching is enabled at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Identifier of the file hash algorithm.
    #[serde(default = "default_hash_algorithm")]
    pub hash_algorithm: String,
    #[serde(default)]
    pub remote: RemoteConfig,
    /// Mark saved descriptors as final.
    #[serde(default)]
    pub save_final: bool,
    /// Diff every saved build against the baseline build.
    #[serde(default)]
    pub baseline_diff: bool,
    /// Directories under the target dir to attach as outputs.
    #[serde(default)]
    pub attached_outputs: Vec<String>,
    /// Regular expressions; attached artifacts whose file name fully matches are not cached.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// Record every editable property of steps without an explicit log policy.
    #[serde(default)]
    pub log_all_properties: bool,
    /// Module property listing `plugin[:goal]` entries that always run.
    #[serde(default = "default_always_run_property")]
    pub always_run_property: String,
    /// Per-step rules, first match wins.
    #[serde(default)]
    pub executions: Vec<ExecutionRule>,
}

/// Remote tier settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Builds of this session are also uploaded to the remote tier.
    #[serde(default)]
    pub save_to_remote: bool,
    pub url: Option<String>,
}

/// Rule applying to the steps its selector matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionRule {
    pub selector: StepSelector,
    /// Properties that must be recorded and present for a cached step to be reused.
    #[serde(default)]
    pub tracked_properties: Vec<String>,
    #[serde(default)]
    pub nolog_properties: Vec<String>,
    #[serde(default)]
    pub log_properties: Vec<String>,
    #[serde(default)]
    pub log_all: bool,
    /// The step always re-runs, even after a restore.
    #[serde(default)]
    pub always_run: bool,
    /// A trailing uncached run of this step does not prevent a restore.
    #[serde(default)]
    pub ignore_missing: bool,
}

/// Selects steps by plugin, goal and execution id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepSelector {
    /// Plugin artifact id.
    pub plugin: String,
    /// Goals to match; empty matches every goal.
    #[serde(default)]
    pub goals: Vec<String>,
    /// Execution ids to match; empty matches every execution.
    #[serde(default)]
    pub execution_ids: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_hash_algorithm() -> String {
    "SHA-256".to_string()
}

fn default_always_run_property() -> String {
    "remote.cache.alwaysRunPlugins".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hash_algorithm: default_hash_algorithm(),
            remote: RemoteConfig::default(),
            save_final: false,
            baseline_diff: false,
            attached_outputs: vec![],
            exclude_patterns: vec![],
            log_all_properties: false,
            always_run_property: default_always_run_property(),
            executions: vec![],
        }
    }
}

impl CacheConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: CacheConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.hash_algorithm.trim().is_empty() {
            return Err(Error::InvalidConfig("hash_algorithm must not be empty".into()));
        }
        if let Some(rule) = self.executions.iter().find(|r| r.selector.plugin.is_empty()) {
            return Err(Error::InvalidConfig(format!(
                "execution rule without plugin (goals: {:?})",
                rule.selector.goals
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = CacheConfig::from_yaml("{}").unwrap();
        assert!(config.enabled);
        assert_eq!(config.hash_algorithm, "SHA-256");
        assert!(!config.remote.enabled);
        assert_eq!(config.always_run_property, "remote.cache.alwaysRunPlugins");
    }

    #[test]
    fn test_parse_execution_rules() {
        let yaml = r#"
baseline_diff: true
attached_outputs: ["classes"]
exclude_patterns: [".*\\.log"]
executions:
  - selector:
      plugin: maven-compiler-plugin
      goals: [compile]
    tracked_properties: [source, target]
    log_all: true
  - selector:
      plugin: maven-jar-plugin
    ignore_missing: true
"#;
        let config = CacheConfig::from_yaml(yaml).unwrap();
        assert!(config.baseline_diff);
        assert_eq!(config.executions.len(), 2);
        assert_eq!(config.executions[0].tracked_properties, vec!["source", "target"]);
        assert!(config.executions[1].ignore_missing);
        assert!(config.executions[1].selector.goals.is_empty());
    }

    #[test]
    fn test_rule_without_plugin_is_rejected() {
        let yaml = r#"
executions:
  - selector:
      plugin: ""
"#;
        assert!(matches!(
            CacheConfig::from_yaml(yaml),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiln.yaml");
        std::fs::write(&path, "save_final: true\n").unwrap();
        assert!(CacheConfig::from_file(&path).unwrap().save_final);
    }
}
