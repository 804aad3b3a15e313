//! Kiln Core
//!
//! Domain types, ports and configuration for the Kiln build cache.
//! This crate defines the shared vocabulary between the cache controller
//! and the collaborators it depends on (checksum calculation, storage tiers,
//! hashing and source-control metadata).

pub mod build;
pub mod config;
pub mod digest;
pub mod error;
pub mod ids;
pub mod module;
pub mod phase;
pub mod ports;
pub mod report;
pub mod result;
pub mod step;

pub use build::{
    ArtifactDescriptor, BuildDescriptor, CACHE_IMPLEMENTATION_VERSION, CompletedExecution,
    DigestItem, DigestKind, ProjectsInputInfo, PropertyValue, ScmInfo,
};
pub use config::CacheConfig;
pub use digest::DigestIndex;
pub use error::{Error, Result};
pub use ids::*;
pub use module::{Coordinate, Dependency, Module, ModuleIndex, ModuleOutputs, ProducedArtifact, Session};
pub use phase::LifecyclePhase;
pub use report::{CacheReport, ProjectReport};
pub use result::{CacheContext, CacheResult, CacheSource, RestoreStatus};
pub use step::{BuildStep, ExecutionEvent, MapConfiguration, PluginRef, StepConfiguration, StepParameter};
