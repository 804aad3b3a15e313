//! Shared fixtures: fake tiers, a fixed checksum and a module workspace.

#![allow(dead_code)]

use async_trait::async_trait;
use kiln_cache::{CacheController, FilesystemStore};
use kiln_core::config::{ExecutionRule, StepSelector};
use kiln_core::ports::{ChecksumCalculator, LocalStore, RemoteStore};
use kiln_core::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,kiln_cache=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Checksum `<prefix>-<artifactId>` for every module, or an error.
pub struct FixedChecksum {
    pub prefix: Mutex<String>,
    pub fail: AtomicBool,
}

impl FixedChecksum {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: Mutex::new(prefix.to_string()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn checksum_for(&self, module: &Module) -> String {
        format!("{}-{}", self.prefix.lock().unwrap(), module.artifact_id())
    }
}

#[async_trait]
impl ChecksumCalculator for FixedChecksum {
    async fn compute(
        &self,
        module: &Module,
        _session: &Session,
        _config: &CacheConfig,
        _index: &ModuleIndex,
        _digests: &DigestIndex,
    ) -> Result<ProjectsInputInfo> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::ChecksumComputation {
                module: module.artifact_id().to_string(),
                reason: "injected".to_string(),
            });
        }
        Ok(ProjectsInputInfo::new(
            self.checksum_for(module),
            vec![DigestItem::property("java.version", "21")],
        ))
    }
}

/// In-memory remote tier keyed by checksum.
#[derive(Default)]
pub struct MemoryRemote {
    pub builds: Mutex<HashMap<String, BuildDescriptor>>,
    pub baseline: Mutex<Option<BuildDescriptor>>,
    /// Keys of uploaded artifact files, in upload order.
    pub uploaded: Mutex<Vec<String>>,
    pub fail: AtomicBool,
    pub find_calls: AtomicUsize,
}

impl MemoryRemote {
    pub fn put(&self, build: BuildDescriptor) {
        self.builds
            .lock()
            .unwrap()
            .insert(build.checksum().to_string(), build);
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn find_build(&self, context: &CacheContext) -> Result<Option<BuildDescriptor>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::TierUnavailable("remote down".to_string()));
        }
        Ok(self.builds.lock().unwrap().get(context.checksum()).cloned())
    }

    async fn find_baseline_build(&self, _module: &Module) -> Result<Option<BuildDescriptor>> {
        Ok(self.baseline.lock().unwrap().clone())
    }

    async fn save_build_info(&self, _result: &CacheResult, build: &BuildDescriptor) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::TierUnavailable("remote down".to_string()));
        }
        self.put(build.clone());
        Ok(())
    }

    async fn save_artifact_file(&self, _result: &CacheResult, artifact: &ProducedArtifact) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::TierUnavailable("remote down".to_string()));
        }
        self.uploaded.lock().unwrap().push(artifact.key());
        Ok(())
    }

    fn resource_url(&self, context: &CacheContext, resource: &str) -> String {
        format!(
            "https://cache.acme.io/{}/{}",
            context.checksum(),
            resource
        )
    }
}

/// Filesystem local tier that counts calls and can fail artifact writes.
pub struct CountingLocal {
    pub inner: FilesystemStore,
    pub find_calls: AtomicUsize,
    pub clear_calls: AtomicUsize,
    pub fail_artifact_saves: AtomicBool,
    pub reports: Mutex<Vec<CacheReport>>,
}

impl CountingLocal {
    pub fn new(root: &Path) -> Self {
        Self {
            inner: FilesystemStore::new(root),
            find_calls: AtomicUsize::new(0),
            clear_calls: AtomicUsize::new(0),
            fail_artifact_saves: AtomicBool::new(false),
            reports: Mutex::new(vec![]),
        }
    }
}

#[async_trait]
impl LocalStore for CountingLocal {
    async fn find_local_build(&self, context: &CacheContext) -> Result<Option<BuildDescriptor>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.find_local_build(context).await
    }

    async fn before_save(&self, context: &CacheContext) -> Result<()> {
        self.inner.before_save(context).await
    }

    async fn save_build_info(&self, result: &CacheResult, build: &BuildDescriptor) -> Result<()> {
        self.inner.save_build_info(result, build).await
    }

    async fn save_artifact_file(&self, result: &CacheResult, artifact: &ProducedArtifact) -> Result<()> {
        if self.fail_artifact_saves.load(Ordering::SeqCst) {
            return Err(Error::Storage("disk full".to_string()));
        }
        self.inner.save_artifact_file(result, artifact).await
    }

    async fn artifact_file(
        &self,
        context: &CacheContext,
        source: CacheSource,
        artifact: &ArtifactDescriptor,
    ) -> Result<PathBuf> {
        self.inner.artifact_file(context, source, artifact).await
    }

    async fn clear_cache(&self, context: &CacheContext) -> Result<()> {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.clear_cache(context).await
    }

    async fn save_cache_report(
        &self,
        build_id: BuildId,
        session: &Session,
        report: &CacheReport,
    ) -> Result<()> {
        self.reports.lock().unwrap().push(report.clone());
        self.inner.save_cache_report(build_id, session, report).await
    }
}

pub fn step(plugin: &str, goal: &str, phase: LifecyclePhase) -> BuildStep {
    BuildStep::new(
        PluginRef::new("org.apache.maven.plugins", plugin, "3.0.0"),
        goal,
        format!("default-{}", goal),
        phase,
    )
    .with_implementation(format!("{}Mojo", goal))
}

pub fn validate_step() -> BuildStep {
    step("maven-enforcer-plugin", "enforce", LifecyclePhase::Validate)
}

pub fn compile_step() -> BuildStep {
    step("maven-compiler-plugin", "compile", LifecyclePhase::Compile)
        .with_parameter("release", true)
        .with_parameter("debug", true)
        .with_parameter("compilerId", false)
}

pub fn package_step() -> BuildStep {
    step("maven-jar-plugin", "jar", LifecyclePhase::Package)
}

pub fn install_step() -> BuildStep {
    step("maven-install-plugin", "install", LifecyclePhase::Install)
}

/// Rule marking the jar step as skippable when missing.
pub fn ignorable_jar_rule() -> ExecutionRule {
    ExecutionRule {
        selector: StepSelector {
            plugin: "maven-jar-plugin".into(),
            goals: vec![],
            execution_ids: vec![],
        },
        ignore_missing: true,
        ..ExecutionRule::default()
    }
}

/// Rule tracking `property` on every goal of `plugin`.
pub fn tracking_rule(plugin: &str, property: &str) -> ExecutionRule {
    ExecutionRule {
        selector: StepSelector {
            plugin: plugin.into(),
            goals: vec![],
            execution_ids: vec![],
        },
        tracked_properties: vec![property.into()],
        ..ExecutionRule::default()
    }
}

/// Rule tracking the compiler `release` parameter.
pub fn tracked_release_rule() -> ExecutionRule {
    tracking_rule("maven-compiler-plugin", "release")
}

/// A descriptor as another session would have saved it.
pub fn descriptor(
    checksum: &str,
    module: &Module,
    goals: &[&str],
    executed: &[BuildStep],
) -> BuildDescriptor {
    let executions = executed
        .iter()
        .map(|s| {
            let mut execution = CompletedExecution::new(s.execution_key(), s.implementation.clone());
            if s.goal == "compile" {
                execution.add_property("release", "21", true);
            }
            execution
        })
        .collect();
    BuildDescriptor::new(
        goals.iter().map(|g| g.to_string()).collect(),
        ArtifactDescriptor {
            file_name: Some(format!("{}-{}.jar", module.artifact_id(), module.version)),
            ..ArtifactDescriptor::from_produced(&ProducedArtifact::primary(module))
        },
        vec![],
        ProjectsInputInfo::new(checksum, vec![]),
        executions,
        "SHA-256",
    )
}

/// A workspace with one module, fake tiers and a controller over them.
pub struct Workspace {
    pub dir: TempDir,
    pub session: Arc<Session>,
    pub module: Arc<Module>,
    pub index: ModuleIndex,
    pub calculator: Arc<FixedChecksum>,
    pub local: Arc<CountingLocal>,
    pub remote: Arc<MemoryRemote>,
    pub controller: CacheController,
}

impl Workspace {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_module("app", config)
    }

    pub fn with_module(artifact_id: &str, config: CacheConfig) -> Self {
        init_test_logging();
        let dir = TempDir::new().unwrap();
        let base_dir = dir.path().join(artifact_id);
        std::fs::create_dir_all(&base_dir).unwrap();
        let module = Arc::new(Module::new(Coordinate::new("com.acme", artifact_id), "1.0", base_dir));
        let session = Arc::new(Session::new(vec!["install".into()], dir.path()));
        let index = ModuleIndex::from_modules([&module.coordinate]);

        let calculator = Arc::new(FixedChecksum::new("c0ffee"));
        let local = Arc::new(CountingLocal::new(&dir.path().join("cache")));
        let remote = Arc::new(MemoryRemote::default());
        let controller = CacheController::new(config, calculator.clone(), local.clone(), remote.clone()).unwrap();

        Self {
            dir,
            session,
            module,
            index,
            calculator,
            local,
            remote,
            controller,
        }
    }

    /// Controller over the same tiers, as a later session would create it.
    pub fn next_session(&self, config: CacheConfig) -> CacheController {
        CacheController::new(
            config,
            self.calculator.clone(),
            self.local.clone(),
            self.remote.clone(),
        )
        .unwrap()
    }

    pub fn checksum(&self) -> String {
        self.calculator.checksum_for(&self.module)
    }

    pub async fn lookup(&self, steps: &[BuildStep]) -> CacheResult {
        self.controller
            .find_cached_build(&self.session, &self.module, &self.index, steps)
            .await
    }

    /// Write a primary jar into the module target dir.
    pub fn write_jar(&self, contents: &[u8]) -> PathBuf {
        let jar = self.module.target_dir.join(format!("{}-1.0.jar", self.module.artifact_id()));
        std::fs::create_dir_all(&self.module.target_dir).unwrap();
        std::fs::write(&jar, contents).unwrap();
        jar
    }

    pub fn write_target_file(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.module.target_dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Execution events carrying `values` as the configuration of every step.
    pub fn events(&self, steps: &[BuildStep], values: MapConfiguration) -> HashMap<String, ExecutionEvent> {
        let configuration: Arc<dyn StepConfiguration> = Arc::new(values);
        steps
            .iter()
            .map(|s| {
                (
                    s.execution_key(),
                    ExecutionEvent::new(s.clone(), &self.module.base_dir, configuration.clone()),
                )
            })
            .collect()
    }
}
