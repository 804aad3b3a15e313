//! Recording a freshly built module into the local tier.

use crate::archiver::{self, BUNDLE_TYPE};
use crate::controller::CacheController;
use crate::keys::path_to_classifier;
use crate::policy::should_record_property;
use kiln_core::ports::HashAlgorithm;
use kiln_core::{
    ArtifactDescriptor, BuildDescriptor, BuildStep, CacheContext, CacheResult, CompletedExecution,
    Error, ExecutionEvent, LifecyclePhase, Module, ModuleOutputs, ProducedArtifact, Result,
};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

impl CacheController {
    /// Record the outputs of a module that was built in this session.
    ///
    /// Storage failures clear the module's local entry and are swallowed. The
    /// only error returned is [`Error::UntrackableProperty`], after the entry
    /// was cleared: a tracked property that cannot be read would make the
    /// saved descriptor impossible to validate.
    pub async fn save(
        &self,
        result: &CacheResult,
        outputs: &ModuleOutputs,
        executed: &[BuildStep],
        events: &HashMap<String, ExecutionEvent>,
    ) -> Result<()> {
        let Some(context) = result.context().cloned() else {
            info!("Cannot save project in cache, skipping");
            return Ok(());
        };
        if context.checksum().is_empty() {
            info!(module = %context.module().artifact_id(), "Cannot save project in cache, skipping");
            return Ok(());
        }

        let bundles = match self.bundle_generated_dirs(context.module()).await {
            Ok(bundles) => bundles,
            Err(e) => return self.abort_save(&context, e).await,
        };
        let outcome = self
            .record_build(result, &context, outputs, &bundles, executed, events)
            .await;
        for bundle in bundles.iter().filter_map(|b| b.file.as_deref()) {
            if let Err(e) = tokio::fs::remove_file(bundle).await {
                debug!(file = %bundle.display(), error = %e, "Cannot remove temporary bundle");
            }
        }

        match outcome {
            Ok(()) => Ok(()),
            Err(e) => self.abort_save(&context, e).await,
        }
    }

    async fn abort_save(&self, context: &CacheContext, e: Error) -> Result<()> {
        let module = context.module().artifact_id();
        error!(module = %module, error = %e, "Failed to save project, cleaning cache");
        if let Err(clear) = self.local.clear_cache(context).await {
            error!(module = %module, error = %clear, "Failed to clean cache");
        }
        if e.is_fatal() {
            Err(e)
        } else {
            Ok(())
        }
    }

    async fn record_build(
        &self,
        result: &CacheResult,
        context: &CacheContext,
        outputs: &ModuleOutputs,
        bundles: &[ProducedArtifact],
        executed: &[BuildStep],
        events: &HashMap<String, ExecutionEvent>,
    ) -> Result<()> {
        let module = context.module();
        let checksum = context.checksum();
        let hasher = self.hashes.create();

        let primary = describe(&outputs.primary, hasher.as_ref())?;
        let attached: Vec<&ProducedArtifact> = outputs
            .attached
            .iter()
            .chain(bundles.iter())
            .filter(|artifact| self.is_cacheable(artifact))
            .collect();
        let attached_descriptors = attached
            .iter()
            .map(|artifact| describe(artifact, hasher.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let executions = self.execution_records(executed, events)?;

        let session = context.session();
        let mut build = BuildDescriptor::new(
            session.goals.clone(),
            primary,
            attached_descriptors,
            context.input_info().clone(),
            executions,
            self.hashes.algorithm(),
        );
        let scm = self.scm_info(session).await;
        build.scm = (!scm.is_empty()).then_some(scm);
        build.is_final = self.config.save_final;
        let build = Arc::new(build);

        self.results.insert(
            module.coordinate.versionless_key(),
            CacheResult::rebuilt(result, build.clone()),
        );

        let packaged = executed
            .iter()
            .any(|step| !LifecyclePhase::Package.is_later_than(step.phase));
        if packaged {
            self.local.before_save(context).await?;
            self.local.save_build_info(result, &build).await?;
            if outputs.primary.file.as_deref().is_some_and(Path::is_file) {
                self.local.save_artifact_file(result, &outputs.primary).await?;
                self.register_digest(&build.artifact, checksum);
            }
            for artifact in &attached {
                self.local.save_artifact_file(result, artifact).await?;
            }
            for descriptor in &build.attached_artifacts {
                self.register_digest(descriptor, checksum);
            }
            info!(
                module = %module.artifact_id(),
                checksum = %checksum,
                attached = attached.len(),
                "Saved build and artifacts to local cache"
            );
        } else {
            self.local.save_build_info(result, &build).await?;
            info!(module = %module.artifact_id(), checksum = %checksum, "Saved build info to local cache");
        }

        if self.config.remote.save_to_remote {
            let files: Vec<&ProducedArtifact> = if packaged {
                std::iter::once(&outputs.primary)
                    .filter(|primary| primary.file.as_deref().is_some_and(Path::is_file))
                    .chain(attached.iter().copied())
                    .collect()
            } else {
                vec![]
            };
            self.share_to_remote(result, context, &build, &files).await;
        }

        if self.config.baseline_diff {
            self.produce_diff_report(result, &build).await;
        }
        Ok(())
    }

    /// Upload a fresh build to the remote tier. Upload failures leave the
    /// local entry in place and the build unshared.
    async fn share_to_remote(
        &self,
        result: &CacheResult,
        context: &CacheContext,
        build: &BuildDescriptor,
        files: &[&ProducedArtifact],
    ) {
        let module = context.module();
        let key = module.coordinate.versionless_key();
        self.shared.remove(&key);
        if let Err(e) = self.upload(result, build, files).await {
            warn!(module = %module.artifact_id(), error = %e, "Cannot share build with remote cache");
            return;
        }
        info!(module = %module.artifact_id(), files = files.len(), "Shared build with remote cache");
        self.shared.insert(key);
    }

    async fn upload(&self, result: &CacheResult, build: &BuildDescriptor, files: &[&ProducedArtifact]) -> Result<()> {
        for artifact in files {
            self.remote.save_artifact_file(result, artifact).await?;
        }
        self.remote.save_build_info(result, build).await
    }

    fn is_cacheable(&self, artifact: &ProducedArtifact) -> bool {
        match (&artifact.file, artifact.file_name()) {
            (Some(file), Some(name)) => file.is_file() && self.policy.is_output_artifact(&name),
            _ => false,
        }
    }

    /// Pack every non-empty generated directory of the module into a bundle.
    async fn bundle_generated_dirs(&self, module: &Module) -> Result<Vec<ProducedArtifact>> {
        let mut bundles = Vec::new();
        for dir in self.generated_dirs(module) {
            let Ok(relative) = dir.strip_prefix(&module.target_dir) else {
                continue;
            };
            let nested = relative.components().next().is_some()
                && relative.components().all(|c| matches!(c, Component::Normal(_)));
            if !nested || !dir.is_dir() || !archiver::has_files(&dir) {
                continue;
            }
            let classifier = path_to_classifier(relative);
            let hint = module.artifact_id().to_string();
            let source = dir.clone();
            let file = tokio::task::spawn_blocking(move || archiver::pack_dir_to_temp(&source, &hint))
                .await
                .map_err(|e| Error::Internal(format!("bundle task failed: {}", e)))??;
            debug!(module = %module.artifact_id(), dir = %dir.display(), classifier = %classifier, "Attached directory");
            bundles.push(ProducedArtifact::attached(
                module,
                BUNDLE_TYPE,
                Some(classifier),
                file,
            ));
        }
        Ok(bundles)
    }

    fn generated_dirs(&self, module: &Module) -> Vec<PathBuf> {
        let target = &module.target_dir;
        let generated = target.join("generated-sources");
        let generated_test = target.join("generated-test-sources");

        let roots: BTreeSet<&PathBuf> = module
            .source_roots
            .iter()
            .chain(module.test_source_roots.iter())
            .collect();
        let mut dirs = vec![generated.clone(), generated_test.clone()];
        dirs.extend(
            roots
                .into_iter()
                .filter(|root| {
                    root.starts_with(target)
                        && !root.starts_with(&generated)
                        && !root.starts_with(&generated_test)
                })
                .cloned(),
        );
        dirs.extend(self.policy.attached_outputs().iter().map(|dir| target.join(dir)));

        let mut seen = BTreeSet::new();
        dirs.retain(|dir| seen.insert(dir.clone()));
        dirs
    }

    fn execution_records(
        &self,
        executed: &[BuildStep],
        events: &HashMap<String, ExecutionEvent>,
    ) -> Result<Vec<CompletedExecution>> {
        executed
            .iter()
            .map(|step| {
                let key = step.execution_key();
                let mut execution = CompletedExecution::new(key.clone(), step.implementation.clone());
                if let Some(event) = events.get(&key) {
                    self.record_properties(&mut execution, event)?;
                }
                Ok(execution)
            })
            .collect()
    }

    fn record_properties(&self, execution: &mut CompletedExecution, event: &ExecutionEvent) -> Result<()> {
        let step = &event.step;
        let rules = self.policy.property_rules(step);
        let base_prefix = base_dir_prefix(&event.base_dir);

        for parameter in step.parameters.iter().filter(|p| p.editable) {
            let name = parameter.name.as_str();
            let tracked = rules.is_tracked(name);
            if !should_record_property(name, tracked, &rules) {
                continue;
            }
            match event.configuration.value(name) {
                Ok(value) => execution.add_property(name, render_value(&value, &base_prefix), tracked),
                Err(e) => {
                    info!(step = %step, property = %name, error = %e, "Cannot read step property");
                    if tracked {
                        return Err(Error::UntrackableProperty {
                            property: name.to_string(),
                            step: step.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

fn describe(artifact: &ProducedArtifact, hasher: &dyn HashAlgorithm) -> Result<ArtifactDescriptor> {
    let mut descriptor = ArtifactDescriptor::from_produced(artifact);
    if let Some(file) = artifact.file.as_deref().filter(|f| f.is_file()) {
        descriptor.file_hash = Some(hasher.hash(file)?);
        descriptor.file_size = Some(std::fs::metadata(file)?.len());
    }
    Ok(descriptor)
}

fn base_dir_prefix(base_dir: &Path) -> String {
    let base = base_dir.to_string_lossy();
    let trimmed = base.trim_end_matches(std::path::MAIN_SEPARATOR);
    format!("{}{}", trimmed, std::path::MAIN_SEPARATOR)
}

/// Text recorded for a property value. Paths under the module base dir are
/// made relative so descriptors compare equal across checkouts.
pub(crate) fn render_value(value: &Value, base_prefix: &str) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.strip_prefix(base_prefix).unwrap_or(s).to_string(),
        Value::Array(items) => items
            .iter()
            .map(|item| render_value(item, base_prefix))
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}
