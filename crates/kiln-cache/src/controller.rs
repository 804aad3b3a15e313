//! The cache controller: lookup, analysis and session bookkeeping.
//!
//! Restore, save and diff reporting live in their own modules as further
//! `impl CacheController` blocks.

use crate::hashing::hash_factory_for;
use crate::keys::extension_for_type;
use crate::policy::CachePolicy;
use crate::segment::{cached_segment, coverage, missing_executions, post_cached_segment};
use crate::store::BUILD_INFO_FILE;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use kiln_core::ports::{ChecksumCalculator, HashFactory, LocalStore, RemoteStore, ScmReader};
use kiln_core::{
    ArtifactDescriptor, BuildDescriptor, BuildId, BuildStep, CACHE_IMPLEMENTATION_VERSION,
    CacheConfig, CacheContext, CacheReport, CacheResult, CacheSource, DigestIndex, DigestItem,
    LifecyclePhase, Module, ModuleIndex, ProjectReport, Result, ScmInfo, Session,
};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

/// Source-control reader used when none is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoScm;

#[async_trait]
impl ScmReader for NoScm {
    async fn read(&self, _session: &Session) -> Result<ScmInfo> {
        Ok(ScmInfo::default())
    }
}

/// Keep the remote result unless the local tier did strictly better.
///
/// Local wins when it is a full hit, or when it is a partial hit and the
/// remote result was not already partial.
pub fn merge_tier_results(remote: CacheResult, local: CacheResult) -> CacheResult {
    if local.is_success() || (local.is_partial_success() && !remote.is_partial_success()) {
        local
    } else {
        remote
    }
}

/// Decides whether module build steps can be skipped and records what was built.
pub struct CacheController {
    pub(crate) config: CacheConfig,
    pub(crate) policy: CachePolicy,
    calculator: Arc<dyn ChecksumCalculator>,
    pub(crate) local: Arc<dyn LocalStore>,
    pub(crate) remote: Arc<dyn RemoteStore>,
    pub(crate) hashes: Arc<dyn HashFactory>,
    scm_reader: Arc<dyn ScmReader>,
    digests: Arc<DigestIndex>,
    pub(crate) results: DashMap<String, CacheResult>,
    /// Modules whose fresh build reached the remote tier.
    pub(crate) shared: DashSet<String>,
    scm: OnceCell<ScmInfo>,
}

impl CacheController {
    pub fn new(
        config: CacheConfig,
        calculator: Arc<dyn ChecksumCalculator>,
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
    ) -> Result<Self> {
        config.validate()?;
        let policy = CachePolicy::new(&config)?;
        let hashes = hash_factory_for(&config.hash_algorithm)?;
        Ok(Self {
            config,
            policy,
            calculator,
            local,
            remote,
            hashes,
            scm_reader: Arc::new(NoScm),
            digests: Arc::new(DigestIndex::new()),
            results: DashMap::new(),
            shared: DashSet::new(),
            scm: OnceCell::new(),
        })
    }

    pub fn with_hash_factory(mut self, hashes: Arc<dyn HashFactory>) -> Self {
        self.hashes = hashes;
        self
    }

    pub fn with_scm_reader(mut self, scm_reader: Arc<dyn ScmReader>) -> Self {
        self.scm_reader = scm_reader;
        self
    }

    /// Share a digest index with other controllers of the same process.
    pub fn with_digest_index(mut self, digests: Arc<DigestIndex>) -> Self {
        self.digests = digests;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub fn digests(&self) -> &Arc<DigestIndex> {
        &self.digests
    }

    /// The result recorded for a module in this session.
    pub fn result_for(&self, module: &Module) -> Option<CacheResult> {
        self.results
            .get(&module.coordinate.versionless_key())
            .map(|entry| entry.value().clone())
    }

    /// Look up a cached build covering `steps` for `module`.
    ///
    /// Never fails: every error degrades to an empty or failed result. The
    /// result is recorded for the session report whenever a checksum was
    /// computed.
    pub async fn find_cached_build(
        &self,
        session: &Arc<Session>,
        module: &Arc<Module>,
        index: &ModuleIndex,
        steps: &[BuildStep],
    ) -> CacheResult {
        if !self.config.enabled {
            debug!(module = %module.artifact_id(), "Cache disabled");
            return CacheResult::empty();
        }
        let Some(last) = steps.last() else {
            return CacheResult::empty();
        };
        if !last.phase.is_later_than(LifecyclePhase::PostClean) {
            return CacheResult::empty();
        }

        info!(module = %module.artifact_id(), "Attempting to restore project from build cache");

        let input_info = match self
            .calculator
            .compute(module, session, &self.config, index, &self.digests)
            .await
        {
            Ok(info) => info,
            Err(e) => {
                error!(module = %module.artifact_id(), error = %e, "Cannot calculate checksum, skipping cache");
                return CacheResult::failure(None, None, None);
            }
        };
        let context = Arc::new(CacheContext::new(module.clone(), input_info, session.clone()));

        let mut result = if self.config.remote.enabled {
            let found = self.remote.find_build(&context).await;
            self.evaluate(found, &context, steps, CacheSource::Remote)
        } else {
            CacheResult::not_found(context.clone(), CacheSource::Local)
        };

        if !result.is_success() && result.context().is_some() {
            debug!(module = %module.artifact_id(), "Remote cache is incomplete or missing, trying local build");
            let found = self.local.find_local_build(&context).await;
            let local = self.evaluate(found, &context, steps, CacheSource::Local);
            result = merge_tier_results(result, local);
        }

        self.results
            .insert(module.coordinate.versionless_key(), result.clone());
        result
    }

    fn evaluate(
        &self,
        found: Result<Option<BuildDescriptor>>,
        context: &Arc<CacheContext>,
        steps: &[BuildStep],
        source: CacheSource,
    ) -> CacheResult {
        let module = context.module().artifact_id();
        match found {
            Ok(Some(build)) => self.analyze(Arc::new(build), context, steps, source),
            Ok(None) => {
                info!(module = %module, source = %source, "Project is not found in cache");
                CacheResult::not_found(context.clone(), source)
            }
            Err(e) => {
                error!(module = %module, source = %source, error = %e, "Cannot read cached build");
                CacheResult::failure(None, Some(context.clone()), Some(source))
            }
        }
    }

    /// Judge a found descriptor against the requested steps.
    pub fn analyze(
        &self,
        build: Arc<BuildDescriptor>,
        context: &Arc<CacheContext>,
        steps: &[BuildStep],
        source: CacheSource,
    ) -> CacheResult {
        let module = context.module().artifact_id();
        info!(module = %module, checksum = %context.checksum(), source = %source, "Found cached build");

        if !build.is_compatible() {
            warn!(
                module = %module,
                expected = CACHE_IMPLEMENTATION_VERSION,
                cached = %build.cache_implementation_version,
                "Cached build was written by a different cache implementation"
            );
        }

        let cached = cached_segment(&build, steps);
        let missing = missing_executions(&build, &cached);
        if !missing.is_empty() {
            let missing: Vec<String> = missing.iter().map(|step| step.to_string()).collect();
            info!(module = %module, missing = ?missing, "Cached build doesn't contain all requested executions");
            return CacheResult::failure(Some(build), Some(context.clone()), Some(source));
        }

        if !self.tracked_properties_present(&build, &cached, module) {
            info!(module = %module, "Cached build violates cache rules");
            return CacheResult::failure(Some(build), Some(context.clone()), Some(source));
        }

        let post = post_cached_segment(&build, steps);
        if post.is_empty() {
            return CacheResult::success(build, context.clone(), source);
        }

        let ignorable = post.iter().all(|step| self.policy.can_ignore(step));
        let covered = coverage(&build);
        let requested = steps.last().map(|s| s.phase.as_str()).unwrap_or_default();
        info!(
            module = %module,
            covered = %covered,
            requested = %requested,
            ignorable,
            "Project restored partially"
        );
        CacheResult::partial_success(build, context.clone(), source, ignorable)
    }

    fn tracked_properties_present(&self, build: &BuildDescriptor, segment: &[&BuildStep], module: &str) -> bool {
        segment.iter().all(|step| {
            let Some(execution) = build.find_execution(step) else {
                info!(module = %module, step = %step, "Execution is not cached");
                return false;
            };
            let tracked = self.policy.tracked_properties(step);
            if !execution.contains_all_properties(tracked) {
                info!(module = %module, step = %step, "Cached execution lacks tracked properties");
                return false;
            }
            true
        })
    }

    /// Whether `step` must run even when a cached build covers it.
    pub fn is_forced_execution(&self, module: &Module, step: &BuildStep) -> bool {
        self.policy.is_forced_execution(module, step)
    }

    /// Make `artifact` resolvable by dependents through the digest index.
    pub(crate) fn register_digest(&self, artifact: &ArtifactDescriptor, checksum: &str) {
        let item = DigestItem::by_module_checksum(artifact, checksum);
        if artifact.artifact_type != "pom" {
            let extension = extension_for_type(&artifact.artifact_type);
            if extension != artifact.artifact_type {
                self.digests.record(artifact.key_with_type(extension), item.clone());
            }
        }
        self.digests.record(artifact.key(), item);
    }

    /// Persist one summary record per module looked up or saved this session.
    pub async fn save_cache_report(&self, session: &Session) {
        let mut keys: Vec<String> = self.results.iter().map(|e| e.key().clone()).collect();
        keys.sort();

        let mut report = CacheReport::default();
        for key in keys {
            let Some(result) = self.results.get(&key).map(|e| e.value().clone()) else {
                continue;
            };
            if let Some(project) = self.project_report(&result) {
                report.add_project(project);
            }
        }

        if let Err(e) = self
            .local
            .save_cache_report(BuildId::new(), session, &report)
            .await
        {
            error!(error = %e, "Cannot save cache report");
        }
    }

    fn project_report(&self, result: &CacheResult) -> Option<ProjectReport> {
        let context = result.context()?;
        let module = context.module();
        let mut project = ProjectReport {
            group_id: module.group_id().to_string(),
            artifact_id: module.artifact_id().to_string(),
            checksum: context.checksum().to_string(),
            checksum_matched: result.checksum_matched(),
            lifecycle_matched: result.lifecycle_matched(),
            source: result.source().map(|s| s.to_string()).unwrap_or_default(),
            shared_to_remote: false,
            url: None,
        };
        match result.source() {
            Some(CacheSource::Remote) => {
                project.url = Some(self.remote.resource_url(context, BUILD_INFO_FILE));
            }
            Some(CacheSource::Build) if self.shared.contains(&module.coordinate.versionless_key()) => {
                project.shared_to_remote = true;
                project.url = Some(self.remote.resource_url(context, BUILD_INFO_FILE));
            }
            _ => {}
        }
        Some(project)
    }

    /// Source-control metadata, read once per controller.
    pub(crate) async fn scm_info(&self, session: &Session) -> ScmInfo {
        self.scm
            .get_or_init(|| async move {
                match self.scm_reader.read(session).await {
                    Ok(info) => info,
                    Err(e) => {
                        error!(error = %e, "Cannot read source control info");
                        ScmInfo::default()
                    }
                }
            })
            .await
            .clone()
    }
}
