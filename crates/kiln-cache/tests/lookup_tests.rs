//! Lookup decisions over the remote and local tiers.

mod common;

use common::*;
use kiln_core::config::RemoteConfig;
use kiln_core::*;
use std::sync::Arc;
use std::sync::atomic::Ordering;

fn remote_enabled() -> CacheConfig {
    CacheConfig {
        remote: RemoteConfig {
            enabled: true,
            save_to_remote: false,
            url: None,
        },
        ..CacheConfig::default()
    }
}

fn full_steps() -> Vec<BuildStep> {
    vec![validate_step(), compile_step(), package_step(), install_step()]
}

async fn store_locally(ws: &Workspace, build: BuildDescriptor) {
    use kiln_core::ports::LocalStore;
    let ctx = Arc::new(CacheContext::new(
        ws.module.clone(),
        ProjectsInputInfo::new(build.checksum(), vec![]),
        ws.session.clone(),
    ));
    let result = CacheResult::not_found(ctx.clone(), CacheSource::Local);
    ws.local.save_build_info(&result, &build).await.unwrap();
}

#[tokio::test]
async fn test_clean_only_request_is_empty_and_not_recorded() {
    let ws = Workspace::new(remote_enabled());
    let clean = step("maven-clean-plugin", "clean", LifecyclePhase::Clean);

    let result = ws.lookup(&[clean]).await;
    assert!(result.is_empty());
    assert!(result.context().is_none());
    assert!(ws.controller.result_for(&ws.module).is_none());
    assert_eq!(ws.remote.find_calls.load(Ordering::SeqCst), 0);

    assert!(ws.lookup(&[]).await.is_empty());
}

#[tokio::test]
async fn test_checksum_failure_degrades_to_failure_without_context() {
    let ws = Workspace::new(remote_enabled());
    ws.calculator.fail.store(true, Ordering::SeqCst);

    let result = ws.lookup(&full_steps()).await;
    assert!(result.is_failure());
    assert!(result.context().is_none());
    assert!(result.build().is_none());
    assert!(ws.controller.result_for(&ws.module).is_none());
    assert_eq!(ws.local.find_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_miss_in_both_tiers_is_empty_with_context() {
    let ws = Workspace::new(remote_enabled());

    let result = ws.lookup(&full_steps()).await;
    assert!(result.is_empty());
    assert_eq!(result.context().unwrap().checksum(), ws.checksum());
    assert_eq!(ws.remote.find_calls.load(Ordering::SeqCst), 1);
    assert_eq!(ws.local.find_calls.load(Ordering::SeqCst), 1);
    assert!(ws.controller.result_for(&ws.module).unwrap().is_empty());
}

#[tokio::test]
async fn test_remote_success_skips_local_tier() {
    let ws = Workspace::new(remote_enabled());
    let steps = full_steps();
    ws.remote
        .put(descriptor(&ws.checksum(), &ws.module, &["install"], &steps));

    let result = ws.lookup(&steps).await;
    assert!(result.is_success());
    assert_eq!(result.source(), Some(CacheSource::Remote));
    assert_eq!(ws.local.find_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_remote_disabled_goes_straight_to_local() {
    let ws = Workspace::new(CacheConfig::default());
    let steps = full_steps();
    ws.remote
        .put(descriptor(&ws.checksum(), &ws.module, &["install"], &steps));
    store_locally(&ws, descriptor(&ws.checksum(), &ws.module, &["install"], &steps)).await;

    let result = ws.lookup(&steps).await;
    assert!(result.is_success());
    assert_eq!(result.source(), Some(CacheSource::Local));
    assert_eq!(ws.remote.find_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_local_success_replaces_remote_partial() {
    let ws = Workspace::new(remote_enabled());
    let steps = full_steps();
    ws.remote
        .put(descriptor(&ws.checksum(), &ws.module, &["compile"], &steps[..2]));
    store_locally(&ws, descriptor(&ws.checksum(), &ws.module, &["install"], &steps)).await;

    let result = ws.lookup(&steps).await;
    assert!(result.is_success());
    assert_eq!(result.source(), Some(CacheSource::Local));
}

#[tokio::test]
async fn test_remote_read_error_falls_back_to_local_partial() {
    let ws = Workspace::new(remote_enabled());
    ws.remote.fail.store(true, Ordering::SeqCst);
    let steps = full_steps();
    store_locally(&ws, descriptor(&ws.checksum(), &ws.module, &["compile"], &steps[..2])).await;

    let result = ws.lookup(&steps).await;
    assert!(result.is_partial_success());
    assert_eq!(result.source(), Some(CacheSource::Local));
    assert_eq!(
        ws.controller.result_for(&ws.module).unwrap().status(),
        RestoreStatus::PartialSuccess
    );
}

#[tokio::test]
async fn test_remote_read_error_with_local_miss_is_failure() {
    let ws = Workspace::new(remote_enabled());
    ws.remote.fail.store(true, Ordering::SeqCst);

    let result = ws.lookup(&full_steps()).await;
    assert!(result.is_failure());
    assert!(result.build().is_none());
    assert_eq!(result.source(), Some(CacheSource::Remote));
}

#[tokio::test]
async fn test_partial_restore_with_ignorable_trailing_step() {
    let config = CacheConfig {
        executions: vec![ignorable_jar_rule()],
        ..remote_enabled()
    };
    let ws = Workspace::new(config);
    let steps = vec![validate_step(), compile_step(), package_step()];
    ws.remote
        .put(descriptor(&ws.checksum(), &ws.module, &["compile"], &steps[..2]));

    let result = ws.lookup(&steps).await;
    assert!(result.is_partial_success());
    assert!(result.ignorable_remainder());
    assert!(result.checksum_matched());
    assert!(!result.lifecycle_matched());
}

#[tokio::test]
async fn test_partial_restore_without_ignore_rule() {
    let ws = Workspace::new(remote_enabled());
    let steps = vec![validate_step(), compile_step(), package_step()];
    ws.remote
        .put(descriptor(&ws.checksum(), &ws.module, &["compile"], &steps[..2]));

    let result = ws.lookup(&steps).await;
    assert!(result.is_partial_success());
    assert!(!result.ignorable_remainder());
}

#[tokio::test]
async fn test_missing_execution_in_cached_segment_is_failure() {
    let ws = Workspace::new(remote_enabled());
    let steps = full_steps();
    // Recorded without the enforcer execution.
    ws.remote
        .put(descriptor(&ws.checksum(), &ws.module, &["install"], &steps[1..]));

    let result = ws.lookup(&steps).await;
    assert!(result.is_failure());
    assert!(result.build().is_some());
}

#[tokio::test]
async fn test_missing_tracked_property_is_failure() {
    let config = CacheConfig {
        executions: vec![tracking_rule("maven-compiler-plugin", "encoding")],
        ..remote_enabled()
    };
    let ws = Workspace::new(config);
    let steps = full_steps();
    ws.remote
        .put(descriptor(&ws.checksum(), &ws.module, &["install"], &steps));

    let result = ws.lookup(&steps).await;
    assert!(result.is_failure());
}

#[tokio::test]
async fn test_recorded_tracked_property_is_accepted() {
    let config = CacheConfig {
        executions: vec![tracked_release_rule()],
        ..remote_enabled()
    };
    let ws = Workspace::new(config);
    let steps = full_steps();
    ws.remote
        .put(descriptor(&ws.checksum(), &ws.module, &["install"], &steps));

    assert!(ws.lookup(&steps).await.is_success());
}

#[tokio::test]
async fn test_incompatible_descriptor_is_still_analyzed() {
    let ws = Workspace::new(remote_enabled());
    let steps = full_steps();
    let mut build = descriptor(&ws.checksum(), &ws.module, &["install"], &steps);
    build.cache_implementation_version = "v0".into();
    ws.remote.put(build);

    assert!(ws.lookup(&steps).await.is_success());
}

#[tokio::test]
async fn test_shorter_request_against_full_build_succeeds() {
    let ws = Workspace::new(remote_enabled());
    let steps = full_steps();
    ws.remote
        .put(descriptor(&ws.checksum(), &ws.module, &["install"], &steps));

    for len in 1..=steps.len() {
        let result = ws.lookup(&steps[..len]).await;
        assert!(result.is_success(), "prefix of {} steps", len);
    }
}

#[tokio::test]
async fn test_concurrent_lookups_record_every_module() {
    let ws = Workspace::new(remote_enabled());
    let steps = full_steps();
    let modules: Vec<Arc<Module>> = (0..16)
        .map(|i| {
            Arc::new(Module::new(
                Coordinate::new("com.acme", format!("mod{}", i)),
                "1.0",
                ws.dir.path().join(format!("mod{}", i)),
            ))
        })
        .collect();
    for module in modules.iter().step_by(2) {
        ws.remote.put(descriptor(
            &ws.calculator.checksum_for(module),
            module,
            &["install"],
            &steps,
        ));
    }

    let lookups = modules.iter().map(|module| {
        ws.controller
            .find_cached_build(&ws.session, module, &ws.index, &steps)
    });
    let results = futures::future::join_all(lookups).await;

    for (i, (module, result)) in modules.iter().zip(results).enumerate() {
        assert_eq!(result.is_success(), i % 2 == 0);
        let recorded = ws.controller.result_for(module).unwrap();
        assert_eq!(recorded.status(), result.status());
    }
}

#[tokio::test]
async fn test_disabled_cache_is_empty() {
    let config = CacheConfig {
        enabled: false,
        ..remote_enabled()
    };
    let ws = Workspace::new(config);
    assert!(ws.lookup(&full_steps()).await.is_empty());
    assert_eq!(ws.remote.find_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_forced_execution_from_module_property() {
    let ws = Workspace::new(CacheConfig::default());
    let module = (*ws.module)
        .clone()
        .with_property("remote.cache.alwaysRunPlugins", "maven-enforcer-plugin:*");
    assert!(ws.controller.is_forced_execution(&module, &validate_step()));
    assert!(!ws.controller.is_forced_execution(&module, &compile_step()));
    assert!(!ws.controller.is_forced_execution(&ws.module, &validate_step()));
}
