//! Binding cached artifacts to a module.

use crate::archiver;
use crate::controller::CacheController;
use crate::keys::{classifier_to_path, is_directory_bundle};
use kiln_core::{
    ArtifactDescriptor, CacheContext, CacheResult, CacheSource, Error, ModuleOutputs,
    ProducedArtifact, Result,
};
use std::path::PathBuf;
use tracing::{debug, error, info};

impl CacheController {
    /// Bind the files of a cached build to `outputs`.
    ///
    /// Only full and partial hits are restored. Returns false when any file
    /// is missing or cannot be restored. Once the primary artifact was bound,
    /// a failure resets `outputs` so the module is never left half restored.
    pub async fn restore_project_artifacts(&self, result: &CacheResult, outputs: &mut ModuleOutputs) -> bool {
        if !(result.is_success() || result.is_partial_success()) {
            info!(status = ?result.status(), "Cache result is not restorable");
            return false;
        }
        let (Some(build), Some(context)) = (result.build(), result.context()) else {
            info!("Cache result carries nothing to restore");
            return false;
        };
        let source = result.source().unwrap_or(CacheSource::Local);
        let module = context.module();
        let checksum = context.checksum();

        let mut primary = build.artifact.clone();
        primary.version = module.version.clone();
        if primary.has_file() {
            let file = match self.existing_file(context, source, &primary).await {
                Ok(Some(file)) => file,
                Ok(None) => return false,
                Err(e) => {
                    error!(module = %module.artifact_id(), error = %e, "Cannot restore cache, continuing with normal build");
                    return false;
                }
            };
            debug!(module = %module.artifact_id(), file = %file.display(), "Setting project artifact");
            outputs.primary.file = Some(file);
            outputs.primary.resolved = true;
            self.register_digest(&primary, checksum);
        }

        for attached in &build.attached_artifacts {
            let mut attached = attached.clone();
            attached.version = module.version.clone();
            if !attached.has_file() {
                continue;
            }
            match self.restore_attached(context, source, &attached, outputs).await {
                Ok(true) => self.register_digest(&attached, checksum),
                Ok(false) => {
                    outputs.reset();
                    return false;
                }
                Err(e) => {
                    error!(module = %module.artifact_id(), error = %e, "Cannot restore cache, continuing with normal build");
                    outputs.reset();
                    return false;
                }
            }
        }
        true
    }

    async fn existing_file(
        &self,
        context: &CacheContext,
        source: CacheSource,
        artifact: &ArtifactDescriptor,
    ) -> Result<Option<PathBuf>> {
        let file = self.local.artifact_file(context, source, artifact).await?;
        if tokio::fs::try_exists(&file).await.unwrap_or(false) {
            Ok(Some(file))
        } else {
            info!(
                module = %context.module().artifact_id(),
                file = %file.display(),
                "Missing file for cached build, cannot restore"
            );
            Ok(None)
        }
    }

    async fn restore_attached(
        &self,
        context: &CacheContext,
        source: CacheSource,
        artifact: &ArtifactDescriptor,
        outputs: &mut ModuleOutputs,
    ) -> Result<bool> {
        let Some(file) = self.existing_file(context, source, artifact).await? else {
            return Ok(false);
        };
        let module = context.module();
        let classifier = artifact.classifier.as_deref();

        if is_directory_bundle(classifier) {
            let classifier = classifier.unwrap_or_default();
            let dest = classifier_to_path(&module.target_dir, classifier)?;
            debug!(module = %module.artifact_id(), dir = %dest.display(), "Restoring generated directory");
            let bundle = file.clone();
            tokio::task::spawn_blocking(move || archiver::restore_bundle(&bundle, &dest))
                .await
                .map_err(|e| Error::Internal(format!("restore task failed: {}", e)))??;
        } else {
            debug!(module = %module.artifact_id(), file = %file.display(), "Attaching artifact");
            outputs.attach(ProducedArtifact::attached(
                module,
                artifact.artifact_type.clone(),
                artifact.classifier.clone(),
                file,
            ));
        }
        Ok(true)
    }
}
