//! Structural comparison of a fresh build against a baseline build.

use crate::controller::CacheController;
use kiln_core::{ArtifactDescriptor, BuildDescriptor, CacheResult, DigestKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{error, info};

/// Part of a descriptor a mismatch was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchContext {
    Checksum,
    Input,
    Execution,
    Artifact,
}

/// One difference between the current and the baseline build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    pub context: MismatchContext,
    pub item: String,
    pub current: Option<String>,
    pub baseline: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDiff {
    pub checksum: String,
    pub baseline_checksum: String,
    pub mismatches: Vec<Mismatch>,
}

impl BuildDiff {
    pub fn is_empty(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Compares two descriptors of the same module.
pub struct CacheDiff<'a> {
    current: &'a BuildDescriptor,
    baseline: &'a BuildDescriptor,
    mismatches: Vec<Mismatch>,
}

fn kind_name(kind: DigestKind) -> &'static str {
    match kind {
        DigestKind::File => "file",
        DigestKind::Dependency => "dependency",
        DigestKind::Module => "module",
        DigestKind::Property => "property",
        DigestKind::EffectiveConfig => "effective_config",
    }
}

fn artifacts(build: &BuildDescriptor) -> BTreeMap<String, &ArtifactDescriptor> {
    std::iter::once(&build.artifact)
        .chain(build.attached_artifacts.iter())
        .map(|artifact| (artifact.versionless_key(), artifact))
        .collect()
}

impl<'a> CacheDiff<'a> {
    pub fn new(current: &'a BuildDescriptor, baseline: &'a BuildDescriptor) -> Self {
        Self {
            current,
            baseline,
            mismatches: Vec::new(),
        }
    }

    pub fn compare(mut self) -> BuildDiff {
        if self.current.checksum() != self.baseline.checksum() {
            self.push(
                MismatchContext::Checksum,
                "checksum",
                Some(self.current.checksum().to_string()),
                Some(self.baseline.checksum().to_string()),
            );
            self.compare_inputs();
        }
        self.compare_executions();
        self.compare_artifacts();

        BuildDiff {
            checksum: self.current.checksum().to_string(),
            baseline_checksum: self.baseline.checksum().to_string(),
            mismatches: self.mismatches,
        }
    }

    fn push(
        &mut self,
        context: MismatchContext,
        item: impl Into<String>,
        current: Option<String>,
        baseline: Option<String>,
    ) {
        self.mismatches.push(Mismatch {
            context,
            item: item.into(),
            current,
            baseline,
        });
    }

    fn compare_inputs(&mut self) {
        let digests = |build: &'a BuildDescriptor| -> BTreeMap<(DigestKind, &'a str), Option<&'a str>> {
            build
                .input_info
                .items
                .iter()
                .map(|item| ((item.kind, item.key.as_str()), item.digest()))
                .collect()
        };
        let current = digests(self.current);
        let baseline = digests(self.baseline);
        let keys: BTreeSet<_> = current.keys().chain(baseline.keys()).copied().collect();

        for key in keys {
            let ours = current.get(&key).copied().flatten();
            let theirs = baseline.get(&key).copied().flatten();
            let present = (current.contains_key(&key), baseline.contains_key(&key));
            if ours != theirs || present.0 != present.1 {
                self.push(
                    MismatchContext::Input,
                    format!("{}:{}", kind_name(key.0), key.1),
                    ours.map(str::to_string),
                    theirs.map(str::to_string),
                );
            }
        }
    }

    fn compare_executions(&mut self) {
        let (current, baseline) = (self.current, self.baseline);
        let current: BTreeMap<_, _> = current
            .executions
            .iter()
            .map(|e| (e.execution_key.as_str(), e))
            .collect();
        let baseline: BTreeMap<_, _> = baseline
            .executions
            .iter()
            .map(|e| (e.execution_key.as_str(), e))
            .collect();
        let keys: BTreeSet<&str> = current.keys().chain(baseline.keys()).copied().collect();

        for key in keys {
            match (current.get(key), baseline.get(key)) {
                (Some(ours), Some(theirs)) => {
                    let names: BTreeSet<&str> = ours
                        .properties
                        .iter()
                        .chain(theirs.properties.iter())
                        .map(|p| p.name.as_str())
                        .collect();
                    for name in names {
                        let a = ours.property(name).map(|p| p.value.clone());
                        let b = theirs.property(name).map(|p| p.value.clone());
                        if a != b {
                            self.push(MismatchContext::Execution, format!("{}#{}", key, name), a, b);
                        }
                    }
                }
                (ours, theirs) => self.push(
                    MismatchContext::Execution,
                    key,
                    ours.map(|_| "present".to_string()),
                    theirs.map(|_| "present".to_string()),
                ),
            }
        }
    }

    fn compare_artifacts(&mut self) {
        let current = artifacts(self.current);
        let baseline = artifacts(self.baseline);
        let keys: BTreeSet<&String> = current.keys().chain(baseline.keys()).collect();

        for key in keys {
            let ours = current.get(key);
            let theirs = baseline.get(key);
            let hash = (
                ours.and_then(|a| a.file_hash.clone()),
                theirs.and_then(|a| a.file_hash.clone()),
            );
            if hash.0 != hash.1 {
                self.push(MismatchContext::Artifact, format!("{}:hash", key), hash.0, hash.1);
            }
            let size = (
                ours.and_then(|a| a.file_size).map(|s| s.to_string()),
                theirs.and_then(|a| a.file_size).map(|s| s.to_string()),
            );
            if size.0 != size.1 {
                self.push(MismatchContext::Artifact, format!("{}:size", key), size.0, size.1);
            }
        }
    }
}

async fn write_report_file(dir: &Path, name: &str, contents: &[u8]) -> std::io::Result<()> {
    tokio::fs::write(dir.join(name), contents).await
}

impl CacheController {
    /// Compare `build` with the module's baseline build and write both, the
    /// diff and their effective configurations to the session report dir.
    pub async fn produce_diff_report(&self, result: &CacheResult, build: &BuildDescriptor) {
        let Some(context) = result.context() else {
            return;
        };
        let module = context.module();
        let baseline = match self.remote.find_baseline_build(module).await {
            Ok(Some(baseline)) => baseline,
            Ok(None) => {
                info!(module = %module.artifact_id(), "Cannot find project in baseline build, skipping diff");
                return;
            }
            Err(e) => {
                error!(module = %module.artifact_id(), error = %e, "Cannot read baseline build, skipping diff");
                return;
            }
        };

        let dir = context.session().report_dir.clone();
        info!(module = %module.artifact_id(), dir = %dir.display(), "Saving cache builds diff");
        let diff = CacheDiff::new(build, &baseline).compare();
        if let Err(e) = write_diff_files(&dir, build, &baseline, &diff).await {
            error!(module = %module.artifact_id(), error = %e, "Cannot produce build diff for project");
        }
    }
}

async fn write_diff_files(
    dir: &Path,
    build: &BuildDescriptor,
    baseline: &BuildDescriptor,
    diff: &BuildDiff,
) -> kiln_core::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let checksum = build.checksum();
    let baseline_checksum = baseline.checksum();

    write_report_file(
        dir,
        &format!("buildinfo-baseline-{}.json", baseline_checksum),
        &serde_json::to_vec_pretty(baseline)?,
    )
    .await?;
    write_report_file(dir, &format!("buildinfo-{}.json", checksum), &serde_json::to_vec_pretty(build)?).await?;
    write_report_file(dir, &format!("buildsdiff-{}.json", checksum), &serde_json::to_vec_pretty(diff)?).await?;

    if let Some(body) = build.input_info.effective_config().and_then(|i| i.value.as_deref()) {
        write_report_file(dir, &format!("effective-config-{}.txt", checksum), body.as_bytes()).await?;
    }
    if let Some(body) = baseline.input_info.effective_config().and_then(|i| i.value.as_deref()) {
        write_report_file(
            dir,
            &format!("effective-config-baseline-{}.txt", baseline_checksum),
            body.as_bytes(),
        )
        .await?;
    }
    Ok(())
}
