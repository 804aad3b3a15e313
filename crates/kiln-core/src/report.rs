//! Session-level cache report.

use serde::{Deserialize, Serialize};

/// Cache outcome of one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectReport {
    pub group_id: String,
    pub artifact_id: String,
    pub checksum: String,
    pub checksum_matched: bool,
    pub lifecycle_matched: bool,
    pub source: String,
    #[serde(default)]
    pub shared_to_remote: bool,
    pub url: Option<String>,
}

/// Aggregate of every module looked up or saved in a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheReport {
    pub projects: Vec<ProjectReport>,
}

impl CacheReport {
    pub fn add_project(&mut self, project: ProjectReport) {
        self.projects.push(project);
    }
}
