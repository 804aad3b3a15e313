//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the cache controller and the
//! collaborators it does not implement itself.

use crate::build::{ArtifactDescriptor, BuildDescriptor, ProjectsInputInfo, ScmInfo};
use crate::config::CacheConfig;
use crate::digest::DigestIndex;
use crate::ids::BuildId;
use crate::module::{Module, ModuleIndex, ProducedArtifact, Session};
use crate::report::CacheReport;
use crate::result::{CacheContext, CacheResult, CacheSource};
use crate::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Computes the checksum of a module's inputs.
#[async_trait]
pub trait ChecksumCalculator: Send + Sync {
    /// Compute the module's checksum. Artifacts already present in `digests`
    /// are taken from there instead of being rehashed.
    async fn compute(
        &self,
        module: &Module,
        session: &Session,
        config: &CacheConfig,
        index: &ModuleIndex,
        digests: &DigestIndex,
    ) -> Result<ProjectsInputInfo>;
}

/// Shared remote cache tier.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Find a descriptor for the context's checksum.
    async fn find_build(&self, context: &CacheContext) -> Result<Option<BuildDescriptor>>;

    /// Find the reference build a fresh build is compared against.
    async fn find_baseline_build(&self, module: &Module) -> Result<Option<BuildDescriptor>>;

    /// Upload the descriptor of a build made in this session.
    async fn save_build_info(&self, result: &CacheResult, build: &BuildDescriptor) -> Result<()>;

    /// Upload one artifact file of a build made in this session.
    async fn save_artifact_file(&self, result: &CacheResult, artifact: &ProducedArtifact) -> Result<()>;

    /// Public URL of a resource stored for the context.
    fn resource_url(&self, context: &CacheContext, resource: &str) -> String;
}

/// Local cache tier. It also mirrors files fetched from the remote tier.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Find a descriptor stored locally for the context's checksum.
    async fn find_local_build(&self, context: &CacheContext) -> Result<Option<BuildDescriptor>>;

    /// Prepare the entry for a new save.
    async fn before_save(&self, context: &CacheContext) -> Result<()>;

    async fn save_build_info(&self, result: &CacheResult, build: &BuildDescriptor) -> Result<()>;

    async fn save_artifact_file(&self, result: &CacheResult, artifact: &ProducedArtifact) -> Result<()>;

    /// Path of a cached artifact file, taken from the tier `source` names.
    async fn artifact_file(
        &self,
        context: &CacheContext,
        source: CacheSource,
        artifact: &ArtifactDescriptor,
    ) -> Result<PathBuf>;

    /// Remove the whole entry for the context's checksum.
    async fn clear_cache(&self, context: &CacheContext) -> Result<()>;

    async fn save_cache_report(
        &self,
        build_id: BuildId,
        session: &Session,
        report: &CacheReport,
    ) -> Result<()>;
}

/// A file hash algorithm.
pub trait HashAlgorithm: Send + Sync {
    fn hash(&self, path: &Path) -> Result<String>;
}

/// Supplies hash algorithm instances.
pub trait HashFactory: Send + Sync {
    /// Identifier recorded in descriptors.
    fn algorithm(&self) -> &str;

    fn create(&self) -> Box<dyn HashAlgorithm>;
}

/// Reads source-control metadata of the workspace.
#[async_trait]
pub trait ScmReader: Send + Sync {
    async fn read(&self, session: &Session) -> Result<ScmInfo>;
}
