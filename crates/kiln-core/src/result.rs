//! Lookup outcomes and the context they carry.

use crate::build::{BuildDescriptor, ProjectsInputInfo};
use crate::module::{Module, Session};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Terminal status of a lookup attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RestoreStatus {
    Empty,
    Failure,
    PartialSuccess,
    Success,
}

/// Where a result's descriptor came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheSource {
    Local,
    Remote,
    /// Freshly produced by this session.
    Build,
}

impl fmt::Display for CacheSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheSource::Local => f.write_str("LOCAL"),
            CacheSource::Remote => f.write_str("REMOTE"),
            CacheSource::Build => f.write_str("BUILD"),
        }
    }
}

/// A module, its computed inputs and the session it is built in.
#[derive(Debug, Clone)]
pub struct CacheContext {
    module: Arc<Module>,
    input_info: ProjectsInputInfo,
    session: Arc<Session>,
}

impl CacheContext {
    pub fn new(module: Arc<Module>, input_info: ProjectsInputInfo, session: Arc<Session>) -> Self {
        Self {
            module,
            input_info,
            session,
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn input_info(&self) -> &ProjectsInputInfo {
        &self.input_info
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn checksum(&self) -> &str {
        &self.input_info.checksum
    }
}

/// Outcome of a lookup, or of a save that replaced it.
///
/// Success and partial success always carry a descriptor. Failure carries one
/// when the failure happened after something was found. Empty never does,
/// unless the result was later replaced by a freshly built descriptor.
#[derive(Debug, Clone)]
pub struct CacheResult {
    status: RestoreStatus,
    build: Option<Arc<BuildDescriptor>>,
    context: Option<Arc<CacheContext>>,
    source: Option<CacheSource>,
    ignorable_remainder: bool,
}

impl CacheResult {
    fn with(
        status: RestoreStatus,
        build: Option<Arc<BuildDescriptor>>,
        context: Option<Arc<CacheContext>>,
        source: Option<CacheSource>,
    ) -> Self {
        Self {
            status,
            build,
            context,
            source,
            ignorable_remainder: false,
        }
    }

    /// Nothing worth looking up.
    pub fn empty() -> Self {
        Self::with(RestoreStatus::Empty, None, None, None)
    }

    /// The tier was consulted and holds nothing for this checksum.
    pub fn not_found(context: Arc<CacheContext>, source: CacheSource) -> Self {
        Self::with(RestoreStatus::Empty, None, Some(context), Some(source))
    }

    pub fn failure(
        build: Option<Arc<BuildDescriptor>>,
        context: Option<Arc<CacheContext>>,
        source: Option<CacheSource>,
    ) -> Self {
        Self::with(RestoreStatus::Failure, build, context, source)
    }

    pub fn partial_success(
        build: Arc<BuildDescriptor>,
        context: Arc<CacheContext>,
        source: CacheSource,
        ignorable_remainder: bool,
    ) -> Self {
        Self {
            ignorable_remainder,
            ..Self::with(
                RestoreStatus::PartialSuccess,
                Some(build),
                Some(context),
                Some(source),
            )
        }
    }

    pub fn success(build: Arc<BuildDescriptor>, context: Arc<CacheContext>, source: CacheSource) -> Self {
        Self::with(RestoreStatus::Success, Some(build), Some(context), Some(source))
    }

    /// `original` replaced by a descriptor produced in this session. The
    /// lookup status is kept so reports still show whether the checksum matched.
    pub fn rebuilt(original: &CacheResult, build: Arc<BuildDescriptor>) -> Self {
        Self::with(
            original.status,
            Some(build),
            original.context.clone(),
            Some(CacheSource::Build),
        )
    }

    pub fn status(&self) -> RestoreStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == RestoreStatus::Success
    }

    pub fn is_partial_success(&self) -> bool {
        self.status == RestoreStatus::PartialSuccess
    }

    pub fn is_failure(&self) -> bool {
        self.status == RestoreStatus::Failure
    }

    pub fn is_empty(&self) -> bool {
        self.status == RestoreStatus::Empty
    }

    pub fn build(&self) -> Option<&Arc<BuildDescriptor>> {
        self.build.as_ref()
    }

    pub fn context(&self) -> Option<&Arc<CacheContext>> {
        self.context.as_ref()
    }

    pub fn source(&self) -> Option<CacheSource> {
        self.source
    }

    /// For partial successes: every step past the cached segment may be skipped.
    pub fn ignorable_remainder(&self) -> bool {
        self.ignorable_remainder
    }

    pub fn checksum_matched(&self) -> bool {
        self.status != RestoreStatus::Empty
    }

    pub fn lifecycle_matched(&self) -> bool {
        self.checksum_matched() && self.is_success()
    }
}
