//! Splits a requested step sequence against what a cached build covers.

use kiln_core::{BuildDescriptor, BuildStep, LifecyclePhase};

/// Latest phase the descriptor covers. Descriptors without any lifecycle goal
/// cover nothing past `post-clean`.
pub fn coverage(build: &BuildDescriptor) -> LifecyclePhase {
    build
        .highest_completed_phase()
        .unwrap_or(LifecyclePhase::PostClean)
}

/// Requested steps the cached build claims to have completed: everything
/// after the clean lifecycle up to the first step past its coverage.
pub fn cached_segment<'a>(build: &BuildDescriptor, steps: &'a [BuildStep]) -> Vec<&'a BuildStep> {
    let covered = coverage(build);
    steps
        .iter()
        .filter(|step| step.phase.is_later_than(LifecyclePhase::PostClean))
        .take_while(|step| !step.phase.is_later_than(covered))
        .collect()
}

/// Requested steps past the cached build's coverage.
pub fn post_cached_segment<'a>(build: &BuildDescriptor, steps: &'a [BuildStep]) -> Vec<&'a BuildStep> {
    let covered = coverage(build);
    steps
        .iter()
        .filter(|step| step.phase.is_later_than(covered))
        .collect()
}

/// Steps of `segment` the cached build has no execution record for.
pub fn missing_executions<'a>(build: &BuildDescriptor, segment: &[&'a BuildStep]) -> Vec<&'a BuildStep> {
    segment
        .iter()
        .copied()
        .filter(|step| !build.has_execution(step))
        .collect()
}
