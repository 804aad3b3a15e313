//! Lifecycle phases and their ordering.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A lifecycle phase. Declaration order is execution order across the clean,
/// default and site lifecycles, so the derived `Ord` is the phase rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecyclePhase {
    PreClean,
    Clean,
    PostClean,
    Validate,
    Initialize,
    GenerateSources,
    ProcessSources,
    GenerateResources,
    ProcessResources,
    Compile,
    ProcessClasses,
    GenerateTestSources,
    ProcessTestSources,
    GenerateTestResources,
    ProcessTestResources,
    TestCompile,
    ProcessTestClasses,
    Test,
    PreparePackage,
    Package,
    PreIntegrationTest,
    IntegrationTest,
    PostIntegrationTest,
    Verify,
    Install,
    Deploy,
    PreSite,
    Site,
    PostSite,
    SiteDeploy,
}

impl LifecyclePhase {
    pub const ALL: [LifecyclePhase; 30] = [
        LifecyclePhase::PreClean,
        LifecyclePhase::Clean,
        LifecyclePhase::PostClean,
        LifecyclePhase::Validate,
        LifecyclePhase::Initialize,
        LifecyclePhase::GenerateSources,
        LifecyclePhase::ProcessSources,
        LifecyclePhase::GenerateResources,
        LifecyclePhase::ProcessResources,
        LifecyclePhase::Compile,
        LifecyclePhase::ProcessClasses,
        LifecyclePhase::GenerateTestSources,
        LifecyclePhase::ProcessTestSources,
        LifecyclePhase::GenerateTestResources,
        LifecyclePhase::ProcessTestResources,
        LifecyclePhase::TestCompile,
        LifecyclePhase::ProcessTestClasses,
        LifecyclePhase::Test,
        LifecyclePhase::PreparePackage,
        LifecyclePhase::Package,
        LifecyclePhase::PreIntegrationTest,
        LifecyclePhase::IntegrationTest,
        LifecyclePhase::PostIntegrationTest,
        LifecyclePhase::Verify,
        LifecyclePhase::Install,
        LifecyclePhase::Deploy,
        LifecyclePhase::PreSite,
        LifecyclePhase::Site,
        LifecyclePhase::PostSite,
        LifecyclePhase::SiteDeploy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::PreClean => "pre-clean",
            LifecyclePhase::Clean => "clean",
            LifecyclePhase::PostClean => "post-clean",
            LifecyclePhase::Validate => "validate",
            LifecyclePhase::Initialize => "initialize",
            LifecyclePhase::GenerateSources => "generate-sources",
            LifecyclePhase::ProcessSources => "process-sources",
            LifecyclePhase::GenerateResources => "generate-resources",
            LifecyclePhase::ProcessResources => "process-resources",
            LifecyclePhase::Compile => "compile",
            LifecyclePhase::ProcessClasses => "process-classes",
            LifecyclePhase::GenerateTestSources => "generate-test-sources",
            LifecyclePhase::ProcessTestSources => "process-test-sources",
            LifecyclePhase::GenerateTestResources => "generate-test-resources",
            LifecyclePhase::ProcessTestResources => "process-test-resources",
            LifecyclePhase::TestCompile => "test-compile",
            LifecyclePhase::ProcessTestClasses => "process-test-classes",
            LifecyclePhase::Test => "test",
            LifecyclePhase::PreparePackage => "prepare-package",
            LifecyclePhase::Package => "package",
            LifecyclePhase::PreIntegrationTest => "pre-integration-test",
            LifecyclePhase::IntegrationTest => "integration-test",
            LifecyclePhase::PostIntegrationTest => "post-integration-test",
            LifecyclePhase::Verify => "verify",
            LifecyclePhase::Install => "install",
            LifecyclePhase::Deploy => "deploy",
            LifecyclePhase::PreSite => "pre-site",
            LifecyclePhase::Site => "site",
            LifecyclePhase::PostSite => "post-site",
            LifecyclePhase::SiteDeploy => "site-deploy",
        }
    }

    /// Whether this phase runs strictly after `other`.
    pub fn is_later_than(self, other: LifecyclePhase) -> bool {
        self > other
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecyclePhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| format!("unknown lifecycle phase: {}", s))
    }
}
