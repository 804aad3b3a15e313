//! Filesystem-backed cache tiers.
//!
//! Both tiers share one layout: `<root>/<group>/<artifact>/<checksum>/` holds
//! the descriptor ([`BUILD_INFO_FILE`]) and the artifact files of one build.

use crate::keys::{sanitize_key, stored_file_name};
use async_trait::async_trait;
use kiln_core::config::RemoteConfig;
use kiln_core::ports::{LocalStore, RemoteStore};
use kiln_core::{
    ArtifactDescriptor, BuildDescriptor, BuildId, CacheContext, CacheReport, CacheResult,
    CacheSource, Coordinate, Error, Module, ProducedArtifact, Result, Session,
};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Descriptor file name inside a cache entry.
pub const BUILD_INFO_FILE: &str = "buildinfo.json";

/// Entry name holding a module's baseline build in a [`DirectoryRemote`].
pub const BASELINE_ENTRY: &str = "baseline";

fn entry_dir(root: &Path, coordinate: &Coordinate, checksum: &str) -> PathBuf {
    root.join(sanitize_key(&coordinate.group_id))
        .join(sanitize_key(&coordinate.artifact_id))
        .join(sanitize_key(checksum))
}

fn descriptor_file_name(artifact: &ArtifactDescriptor) -> String {
    stored_file_name(
        &artifact.artifact_id,
        &artifact.version,
        &artifact.artifact_type,
        artifact.classifier.as_deref(),
    )
}

async fn read_descriptor(path: &Path) -> Result<Option<BuildDescriptor>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::Storage(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )));
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| Error::CorruptDescriptor(format!("{}: {}", path.display(), e)))
}

async fn ensure_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| Error::Storage(format!("Failed to create cache dir: {}", e)))
}

fn context_of(result: &CacheResult) -> Result<&CacheContext> {
    result
        .context()
        .map(|ctx| ctx.as_ref())
        .ok_or_else(|| Error::Internal("cache result carries no context".to_string()))
}

async fn write_build_info(dir: &Path, build: &BuildDescriptor) -> Result<()> {
    ensure_dir(dir).await?;
    let json = serde_json::to_vec_pretty(build)?;
    tokio::fs::write(dir.join(BUILD_INFO_FILE), json)
        .await
        .map_err(|e| Error::Storage(format!("Failed to write build info: {}", e)))
}

async fn copy_artifact(dir: &Path, artifact: &ProducedArtifact) -> Result<()> {
    let source = artifact
        .file
        .as_deref()
        .ok_or_else(|| Error::Storage(format!("Artifact {} has no file", artifact.key())))?;
    ensure_dir(dir).await?;
    let name = stored_file_name(
        &artifact.artifact_id,
        &artifact.version,
        &artifact.artifact_type,
        artifact.classifier.as_deref(),
    );
    tokio::fs::copy(source, dir.join(&name))
        .await
        .map_err(|e| Error::Storage(format!("Failed to store {}: {}", name, e)))?;
    Ok(())
}

/// Local tier on the filesystem.
///
/// Optionally mirrors artifact files from a [`DirectoryRemote`] when a
/// remote-sourced build is restored.
#[derive(Debug, Clone)]
pub struct FilesystemStore {
    root_dir: PathBuf,
    remote_dir: Option<PathBuf>,
}

impl FilesystemStore {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            remote_dir: None,
        }
    }

    /// Store rooted in the platform cache directory.
    pub fn with_default_root() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("io", "kiln", "kiln")
            .ok_or_else(|| Error::Storage("Could not determine cache directory".to_string()))?;
        Ok(Self::new(dirs.cache_dir().join("builds")))
    }

    /// Fetch remote-sourced artifact files from `remote_dir`.
    pub fn with_remote_mirror(mut self, remote_dir: impl Into<PathBuf>) -> Self {
        self.remote_dir = Some(remote_dir.into());
        self
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Entry directory of the context's checksum.
    pub fn entry_dir(&self, context: &CacheContext) -> PathBuf {
        entry_dir(
            &self.root_dir,
            &context.module().coordinate,
            context.checksum(),
        )
    }

    pub fn report_path(&self, build_id: BuildId) -> PathBuf {
        self.root_dir.join("reports").join(format!("{}.json", build_id))
    }

    async fn mirror_from_remote(&self, context: &CacheContext, name: &str, local: &Path) -> Result<()> {
        let Some(remote_dir) = &self.remote_dir else {
            return Ok(());
        };
        if tokio::fs::try_exists(local).await.unwrap_or(false) {
            return Ok(());
        }
        let remote = entry_dir(remote_dir, &context.module().coordinate, context.checksum()).join(name);
        if !tokio::fs::try_exists(&remote).await.unwrap_or(false) {
            return Ok(());
        }
        if let Some(parent) = local.parent() {
            ensure_dir(parent).await?;
        }
        tokio::fs::copy(&remote, local)
            .await
            .map_err(|e| Error::Storage(format!("Failed to mirror {}: {}", remote.display(), e)))?;
        debug!(file = %local.display(), "Mirrored remote artifact");
        Ok(())
    }
}

#[async_trait]
impl LocalStore for FilesystemStore {
    async fn find_local_build(&self, context: &CacheContext) -> Result<Option<BuildDescriptor>> {
        read_descriptor(&self.entry_dir(context).join(BUILD_INFO_FILE)).await
    }

    async fn before_save(&self, context: &CacheContext) -> Result<()> {
        let dir = self.entry_dir(context);
        if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(&dir)
                .await
                .map_err(|e| Error::Storage(format!("Failed to reset cache entry: {}", e)))?;
        }
        ensure_dir(&dir).await
    }

    async fn save_build_info(&self, result: &CacheResult, build: &BuildDescriptor) -> Result<()> {
        write_build_info(&self.entry_dir(context_of(result)?), build).await
    }

    async fn save_artifact_file(&self, result: &CacheResult, artifact: &ProducedArtifact) -> Result<()> {
        copy_artifact(&self.entry_dir(context_of(result)?), artifact).await
    }

    async fn artifact_file(
        &self,
        context: &CacheContext,
        source: CacheSource,
        artifact: &ArtifactDescriptor,
    ) -> Result<PathBuf> {
        let name = descriptor_file_name(artifact);
        let path = self.entry_dir(context).join(&name);
        if source == CacheSource::Remote {
            self.mirror_from_remote(context, &name, &path).await?;
        }
        Ok(path)
    }

    async fn clear_cache(&self, context: &CacheContext) -> Result<()> {
        let dir = self.entry_dir(context);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("Failed to clear cache entry: {}", e))),
        }
    }

    async fn save_cache_report(
        &self,
        build_id: BuildId,
        _session: &Session,
        report: &CacheReport,
    ) -> Result<()> {
        let path = self.report_path(build_id);
        if let Some(parent) = path.parent() {
            ensure_dir(parent).await?;
        }
        let json = serde_json::to_vec_pretty(report)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| Error::Storage(format!("Failed to write cache report: {}", e)))
    }
}

/// Remote tier backed by a shared directory.
///
/// A module's baseline build lives in the [`BASELINE_ENTRY`] entry.
#[derive(Debug, Clone)]
pub struct DirectoryRemote {
    root_dir: PathBuf,
    base_url: String,
}

impl DirectoryRemote {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        let root_dir = root_dir.into();
        let base_url = format!("file://{}", root_dir.display());
        Self { root_dir, base_url }
    }

    /// Remote over `root_dir`, reporting URLs under `config.url` when set.
    pub fn from_config(root_dir: impl Into<PathBuf>, config: &RemoteConfig) -> Self {
        let remote = Self::new(root_dir);
        match &config.url {
            Some(url) => remote.with_base_url(url.clone()),
            None => remote,
        }
    }

    /// Public URL prefix reported for stored resources.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn entry_dir(&self, context: &CacheContext) -> PathBuf {
        entry_dir(&self.root_dir, &context.module().coordinate, context.checksum())
    }

    async fn ensure_reachable(&self) -> Result<()> {
        if tokio::fs::try_exists(&self.root_dir).await.unwrap_or(false) {
            Ok(())
        } else {
            Err(Error::TierUnavailable(format!(
                "remote directory {} does not exist",
                self.root_dir.display()
            )))
        }
    }
}

#[async_trait]
impl RemoteStore for DirectoryRemote {
    async fn find_build(&self, context: &CacheContext) -> Result<Option<BuildDescriptor>> {
        self.ensure_reachable().await?;
        read_descriptor(&self.entry_dir(context).join(BUILD_INFO_FILE)).await
    }

    async fn find_baseline_build(&self, module: &Module) -> Result<Option<BuildDescriptor>> {
        self.ensure_reachable().await?;
        let dir = entry_dir(&self.root_dir, &module.coordinate, BASELINE_ENTRY);
        read_descriptor(&dir.join(BUILD_INFO_FILE)).await
    }

    async fn save_build_info(&self, result: &CacheResult, build: &BuildDescriptor) -> Result<()> {
        write_build_info(&self.entry_dir(context_of(result)?), build).await
    }

    async fn save_artifact_file(&self, result: &CacheResult, artifact: &ProducedArtifact) -> Result<()> {
        copy_artifact(&self.entry_dir(context_of(result)?), artifact).await
    }

    fn resource_url(&self, context: &CacheContext, resource: &str) -> String {
        let coordinate = &context.module().coordinate;
        format!(
            "{}/{}/{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            sanitize_key(&coordinate.group_id),
            sanitize_key(&coordinate.artifact_id),
            sanitize_key(context.checksum()),
            resource
        )
    }
}
