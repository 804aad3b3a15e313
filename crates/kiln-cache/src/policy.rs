//! Invalidation policy: which steps and properties the cache cares about.

use kiln_core::config::{CacheConfig, ExecutionRule};
use kiln_core::{BuildStep, Error, Module, Result};
use regex::Regex;

/// Property logging rules resolved for one step.
#[derive(Debug, Clone, Copy)]
pub struct PropertyRules<'a> {
    pub tracked: &'a [String],
    pub nolog: &'a [String],
    pub log: &'a [String],
    pub log_all: bool,
}

impl PropertyRules<'_> {
    pub fn is_tracked(&self, name: &str) -> bool {
        self.tracked.iter().any(|p| p == name)
    }
}

/// Whether a step property is recorded in the descriptor.
///
/// Tracked properties are always recorded. Otherwise an explicit log list
/// wins over a no-log list, which wins over the log-all default.
pub fn should_record_property(name: &str, tracked: bool, rules: &PropertyRules<'_>) -> bool {
    tracked || !is_excluded(name, rules)
}

fn is_excluded(name: &str, rules: &PropertyRules<'_>) -> bool {
    if !rules.log.is_empty() {
        return !rules.log.iter().any(|p| p == name);
    }
    if !rules.nolog.is_empty() {
        return rules.nolog.iter().any(|p| p == name);
    }
    !rules.log_all
}

/// Compiled view of a [`CacheConfig`] answering per-step questions.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    rules: Vec<ExecutionRule>,
    exclude_patterns: Vec<Regex>,
    attached_outputs: Vec<String>,
    log_all_default: bool,
    always_run_property: String,
}

impl CachePolicy {
    pub fn new(config: &CacheConfig) -> Result<Self> {
        let exclude_patterns = config
            .exclude_patterns
            .iter()
            .map(|pattern| {
                Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
                    Error::InvalidConfig(format!("Invalid exclude pattern {}: {}", pattern, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rules: config.executions.clone(),
            exclude_patterns,
            attached_outputs: config.attached_outputs.clone(),
            log_all_default: config.log_all_properties,
            always_run_property: config.always_run_property.clone(),
        })
    }

    fn rule_for(&self, step: &BuildStep) -> Option<&ExecutionRule> {
        self.rules.iter().find(|rule| {
            let selector = &rule.selector;
            selector.plugin == step.plugin.artifact_id
                && (selector.goals.is_empty() || selector.goals.contains(&step.goal))
                && (selector.execution_ids.is_empty()
                    || selector.execution_ids.contains(&step.execution_id))
        })
    }

    pub fn property_rules(&self, step: &BuildStep) -> PropertyRules<'_> {
        match self.rule_for(step) {
            Some(rule) => PropertyRules {
                tracked: &rule.tracked_properties,
                nolog: &rule.nolog_properties,
                log: &rule.log_properties,
                log_all: rule.log_all || self.log_all_default,
            },
            None => PropertyRules {
                tracked: &[],
                nolog: &[],
                log: &[],
                log_all: self.log_all_default,
            },
        }
    }

    pub fn tracked_properties(&self, step: &BuildStep) -> &[String] {
        self.rule_for(step)
            .map(|rule| rule.tracked_properties.as_slice())
            .unwrap_or(&[])
    }

    /// A trailing uncached run of `step` may be skipped.
    pub fn can_ignore(&self, step: &BuildStep) -> bool {
        self.rule_for(step).is_some_and(|rule| rule.ignore_missing)
    }

    /// `step` always re-runs, by rule or by the module's always-run property.
    pub fn is_forced_execution(&self, module: &Module, step: &BuildStep) -> bool {
        if self.rule_for(step).is_some_and(|rule| rule.always_run) {
            return true;
        }
        let Some(always_run) = module.properties.get(&self.always_run_property) else {
            return false;
        };
        always_run
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .any(|entry| {
                let mut tokens = entry.split(':');
                let plugin = tokens.next().unwrap_or_default();
                let goal = tokens.next().unwrap_or("*");
                plugin == step.plugin.artifact_id && (goal == "*" || goal == step.goal)
            })
    }

    /// Attached artifacts whose file name matches an exclude pattern are not cached.
    pub fn is_output_artifact(&self, file_name: &str) -> bool {
        !self
            .exclude_patterns
            .iter()
            .any(|pattern| pattern.is_match(file_name))
    }

    pub fn attached_outputs(&self) -> &[String] {
        &self.attached_outputs
    }
}
