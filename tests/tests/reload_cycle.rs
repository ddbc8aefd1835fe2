//! Install-cycle behaviour against the in-memory host.

use std::sync::Arc;

use hotswap_kernel::config::{ReloaderConfig, StopScope};
use hotswap_kernel::{Privilege, RefreshSignature, ReloadEvent};
use hotswap_plugins::{InstallOutcome, ReloadOrchestrator};
use hotswap_testing::{HostCall, MockHost, assert_refreshed, init_tracing, package_bytes, plugin};

fn orchestrator(host: &Arc<MockHost>, config: &ReloaderConfig) -> ReloadOrchestrator {
    init_tracing();
    ReloadOrchestrator::new(host.bindings(), config)
}

/// X (no deps) and Y (requires X), both running.
fn two_plugin_host() -> Arc<MockHost> {
    MockHost::new()
        .with_plugin(plugin("x", &[], true))
        .with_plugin(plugin("y", &["x"], true))
        .into_arc()
}

async fn install(reloader: &ReloadOrchestrator, id: &str, requires: &[&str]) -> InstallOutcome {
    let bytes = package_bytes(id, "2.0.0", requires).unwrap();
    reloader.install(bytes.as_slice(), &format!("{id}.pkg")).await
}

#[tokio::test]
async fn test_replacing_a_dependency_restarts_its_dependent() {
    let host = two_plugin_host();
    host.request_refresh("x");
    host.request_refresh("y");
    let reloader = orchestrator(&host, &ReloaderConfig::new());

    let outcome = install(&reloader, "x", &[]).await;
    let report = outcome.report().expect("install should succeed");

    assert_eq!(host.stop_order(), vec!["y", "x"]);
    assert_eq!(host.start_order(), vec!["x", "y"]);
    assert_refreshed!(host, 1);

    assert!(report.replaced);
    assert!(report.started);
    assert_eq!(report.stopped, vec!["y"]);
    assert_eq!(report.restarted, vec!["y"]);
    assert_eq!(report.context_refresh, Some(RefreshSignature::Standard));
    assert_eq!(report.version.to_string(), "2.0.0");

    assert!(host.is_started("x"));
    assert!(host.is_started("y"));
    assert_eq!(host.plugin("x").unwrap().version.major, 2);
}

#[tokio::test]
async fn test_dependents_stop_before_target_and_target_is_unloaded_before_store() {
    let host = two_plugin_host();
    let reloader = orchestrator(&host, &ReloaderConfig::new());

    install(&reloader, "x", &[]).await;

    let calls = host.calls();
    let position = |call: HostCall| calls.iter().position(|c| *c == call).unwrap();
    let stop_y = position(HostCall::Stop { plugin: "y".into(), cascade: false });
    let stop_x = position(HostCall::Stop { plugin: "x".into(), cascade: true });
    let unload_x = position(HostCall::Unload("x".into()));
    let store = position(HostCall::Store("x.pkg".into()));
    let load = position(HostCall::Load("x.pkg".into()));
    let start_x = position(HostCall::Start("x".into()));

    assert!(stop_y < stop_x);
    assert!(stop_x < unload_x);
    assert!(unload_x < store);
    assert!(store < load);
    assert!(load < start_x);
}

#[tokio::test]
async fn test_restart_order_follows_dependencies_not_discovery() {
    // z is discovered before y but needs it.
    let host = MockHost::new()
        .with_plugin(plugin("x", &[], true))
        .with_plugin(plugin("z", &["x", "y"], true))
        .with_plugin(plugin("y", &["x"], true))
        .into_arc();
    let reloader = orchestrator(&host, &ReloaderConfig::new());

    let outcome = install(&reloader, "x", &[]).await;

    assert!(outcome.is_installed());
    assert_eq!(host.stop_order(), vec!["z", "y", "x"]);
    assert_eq!(host.start_order(), vec!["x", "y", "z"]);
}

#[tokio::test]
async fn test_cyclic_dependents_restart_in_discovery_order() {
    // p and q need each other, so no dependency order exists between them.
    let host = MockHost::new()
        .with_plugin(plugin("x", &[], true))
        .with_plugin(plugin("p", &["x", "q"], true))
        .with_plugin(plugin("q", &["x", "p"], true))
        .into_arc();
    let reloader = orchestrator(&host, &ReloaderConfig::new());

    let outcome = install(&reloader, "x", &[]).await;
    let report = outcome.report().expect("install should succeed");

    assert_eq!(host.stop_order(), vec!["q", "p", "x"]);
    assert_eq!(host.start_order(), vec!["x", "p", "q"]);
    assert_eq!(report.stopped, vec!["q", "p"]);
    assert_eq!(report.restarted, vec!["p", "q"]);
    assert!(host.is_started("p"));
    assert!(host.is_started("q"));
}

#[tokio::test]
async fn test_unparseable_package_touches_nothing() {
    let host = two_plugin_host();
    let reloader = orchestrator(&host, &ReloaderConfig::new());

    let outcome = reloader
        .install(b"this is not a zip archive".as_slice(), "x.pkg")
        .await;

    assert!(matches!(outcome, InstallOutcome::ParseFailed(_)));
    assert!(host.stop_order().is_empty());
    assert!(host.stored_packages().is_empty());
    assert!(host.is_started("x"));
    assert!(host.is_started("y"));
    assert!(host.held_privileges().is_empty());
    assert!(!host.session_open());
}

#[tokio::test]
async fn test_package_without_manifest_is_a_parse_failure() {
    let host = two_plugin_host();
    let reloader = orchestrator(&host, &ReloaderConfig::new());

    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    zip.start_file("readme.txt", zip::write::SimpleFileOptions::default())
        .unwrap();
    let bytes = zip.finish().unwrap().into_inner();

    let outcome = reloader.install(bytes.as_slice(), "x.pkg").await;
    match outcome {
        InstallOutcome::ParseFailed(msg) => assert!(msg.contains("plugin.toml")),
        other => panic!("expected parse failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_chain_with_direct_scope_leaves_grandchild_running() {
    // a <- b <- c
    let host = MockHost::new()
        .with_plugin(plugin("a", &[], true))
        .with_plugin(plugin("b", &["a"], true))
        .with_plugin(plugin("c", &["b"], true))
        .into_arc();
    let reloader = orchestrator(&host, &ReloaderConfig::new());

    let report = install(&reloader, "a", &[]).await.report().cloned().unwrap();

    assert_eq!(report.stopped, vec!["b"]);
    assert_eq!(host.stop_order(), vec!["b", "a"]);
    assert_eq!(host.start_order(), vec!["a", "b"]);
    assert!(host.is_started("c"));
    assert!(!host.stop_order().contains(&"c".to_string()));
}

#[tokio::test]
async fn test_chain_with_transitive_scope_restarts_whole_chain() {
    let host = MockHost::new()
        .with_plugin(plugin("a", &[], true))
        .with_plugin(plugin("b", &["a"], true))
        .with_plugin(plugin("c", &["b"], true))
        .into_arc();
    let config = ReloaderConfig::new().with_stop_scope(StopScope::Transitive);
    let reloader = orchestrator(&host, &config);

    let report = install(&reloader, "a", &[]).await.report().cloned().unwrap();

    assert_eq!(host.stop_order(), vec!["c", "b", "a"]);
    assert_eq!(host.start_order(), vec!["a", "b", "c"]);
    assert_eq!(report.restarted, vec!["b", "c"]);
    assert!(host.is_started("c"));
}

#[tokio::test]
async fn test_stopped_dependents_are_left_alone() {
    let host = MockHost::new()
        .with_plugin(plugin("x", &[], true))
        .with_plugin(plugin("y", &["x"], false))
        .into_arc();
    let reloader = orchestrator(&host, &ReloaderConfig::new());

    let report = install(&reloader, "x", &[]).await.report().cloned().unwrap();

    assert!(report.stopped.is_empty());
    assert_eq!(host.stop_order(), vec!["x"]);
    assert_eq!(host.start_order(), vec!["x"]);
    assert!(!host.is_started("y"));
}

#[tokio::test]
async fn test_host_cascade_results_are_restarted() {
    let host = MockHost::new()
        .with_plugin(plugin("x", &[], true))
        .with_plugin(plugin("y", &["x"], true))
        .with_plugin(plugin("q", &["y"], true))
        .into_arc();
    host.cascade_stop("x", &["y", "q"]);
    let reloader = orchestrator(&host, &ReloaderConfig::new());

    let report = install(&reloader, "x", &[]).await.report().cloned().unwrap();

    // y was already stopped explicitly; only q is new.
    assert_eq!(report.stopped, vec!["y", "q"]);
    assert_eq!(report.restarted, vec!["y", "q"]);
    assert_eq!(host.start_order(), vec!["x", "y", "q"]);
    assert!(host.calls().contains(&HostCall::StopModule("q".into())));
    assert!(host.is_started("q"));
}

#[tokio::test]
async fn test_first_install_has_nothing_to_stop() {
    let host = MockHost::new().into_arc();
    let reloader = orchestrator(&host, &ReloaderConfig::new());

    let report = install(&reloader, "fresh", &[]).await.report().cloned().unwrap();

    assert!(!report.replaced);
    assert!(host.stop_order().is_empty());
    assert_eq!(host.start_order(), vec!["fresh"]);
    assert_eq!(report.package.path, std::path::Path::new(hotswap_testing::MOCK_PLUGIN_DIR).join("fresh.pkg"));
    assert_eq!(report.package.digest.len(), 64);
    assert_refreshed!(host, 0);
}

#[tokio::test]
async fn test_reinstalling_same_package_is_idempotent() {
    let host = two_plugin_host();
    let reloader = orchestrator(&host, &ReloaderConfig::new());
    let bytes = package_bytes("x", "2.0.0", &[]).unwrap();

    let first = reloader.install(bytes.as_slice(), "x.pkg").await;
    let first_calls = host.calls();
    host.clear_calls();
    let second = reloader.install(bytes.as_slice(), "x.pkg").await;

    assert!(first.is_installed());
    assert!(second.is_installed());
    assert_eq!(host.calls(), first_calls);
    assert!(host.is_started("x"));
    assert!(host.is_started("y"));
    assert_eq!(
        first.report().unwrap().package.digest,
        second.report().unwrap().package.digest
    );
}

#[tokio::test]
async fn test_single_refresh_for_many_dependents() {
    let host = MockHost::new()
        .with_plugin(plugin("core", &[], true))
        .with_plugin(plugin("d1", &["core"], true))
        .with_plugin(plugin("d2", &["core"], true))
        .with_plugin(plugin("d3", &["core"], true))
        .into_arc();
    for id in ["core", "d1", "d2", "d3"] {
        host.request_refresh(id);
    }
    let reloader = orchestrator(&host, &ReloaderConfig::new());

    install(&reloader, "core", &[]).await;

    assert_refreshed!(host, 1);
    assert_eq!(host.start_order().len(), 4);
}

#[tokio::test]
async fn test_refresh_only_when_requested() {
    let host = two_plugin_host();
    let reloader = orchestrator(&host, &ReloaderConfig::new());

    let report = install(&reloader, "x", &[]).await.report().cloned().unwrap();

    assert_refreshed!(host, 0);
    assert!(report.context_refresh.is_none());
    // Servlets and filters are bound regardless.
    assert!(host.calls().contains(&HostCall::LoadServlets("x".into())));
    assert!(host.calls().contains(&HostCall::LoadFilters("y".into())));
}

#[tokio::test]
async fn test_web_resources_bound_after_refresh() {
    let host = two_plugin_host();
    host.request_refresh("y");
    let reloader = orchestrator(&host, &ReloaderConfig::new());

    install(&reloader, "x", &[]).await;

    let calls = host.calls();
    let refresh = calls.iter().position(|c| *c == HostCall::Refresh).unwrap();
    let servlets: Vec<usize> = calls
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, HostCall::LoadServlets(_) | HostCall::LoadFilters(_)))
        .map(|(i, _)| i)
        .collect();

    assert_eq!(servlets.len(), 4);
    assert!(servlets.iter().all(|i| *i > refresh));
}

#[tokio::test]
async fn test_compat_refresh_signature_looked_up_once() {
    let host = MockHost::new()
        .with_signature(RefreshSignature::Compat)
        .with_plugin(plugin("x", &[], true))
        .into_arc();
    host.request_refresh("x");
    let reloader = orchestrator(&host, &ReloaderConfig::new());

    let first = install(&reloader, "x", &[]).await;
    let second = install(&reloader, "x", &[]).await;

    assert_eq!(
        first.report().unwrap().context_refresh,
        Some(RefreshSignature::Compat)
    );
    assert!(second.is_installed());
    assert_refreshed!(host, 2);
    assert!(!host.calls().contains(&HostCall::Refresh));
    assert_eq!(host.signature_lookups(), 1);
}

#[tokio::test]
async fn test_start_failure_is_runtime_failure_and_releases_privileges() {
    let host = two_plugin_host();
    host.fail_start("x");
    let reloader = orchestrator(&host, &ReloaderConfig::new());

    let outcome = install(&reloader, "x", &[]).await;

    match outcome {
        InstallOutcome::RuntimeFailed(msg) => assert!(msg.contains("x")),
        other => panic!("expected runtime failure, got {other:?}"),
    }
    // No rollback: the dependent stays down.
    assert!(!host.is_started("x"));
    assert!(!host.is_started("y"));
    assert_eq!(host.start_order(), vec!["x"]);
    assert!(host.held_privileges().is_empty());
    assert!(!host.session_open());
}

#[tokio::test]
async fn test_target_that_does_not_start_leaves_dependents_stopped() {
    let host = two_plugin_host();
    host.decline_start("x");
    let reloader = orchestrator(&host, &ReloaderConfig::new());

    let report = install(&reloader, "x", &[]).await.report().cloned().unwrap();

    assert!(!report.started);
    assert_eq!(report.stopped, vec!["y"]);
    assert!(report.restarted.is_empty());
    assert!(!host.is_started("y"));
    // Bindings still run for the new plugin.
    assert!(host.calls().contains(&HostCall::LoadServlets("x".into())));
    assert!(!host.calls().contains(&HostCall::LoadServlets("y".into())));
}

#[tokio::test]
async fn test_declined_load_is_runtime_failure() {
    let host = two_plugin_host();
    host.decline_load();
    let reloader = orchestrator(&host, &ReloaderConfig::new());

    let outcome = install(&reloader, "x", &[]).await;

    match outcome {
        InstallOutcome::RuntimeFailed(msg) => assert!(msg.contains("x.pkg")),
        other => panic!("expected runtime failure, got {other:?}"),
    }
    assert!(host.plugin("x").is_none());
    assert_eq!(host.stored_packages().len(), 1);
}

#[tokio::test]
async fn test_stop_failure_aborts_before_store() {
    let host = two_plugin_host();
    host.fail_stop("y");
    let reloader = orchestrator(&host, &ReloaderConfig::new());

    let outcome = install(&reloader, "x", &[]).await;

    assert!(matches!(outcome, InstallOutcome::RuntimeFailed(_)));
    assert!(host.stored_packages().is_empty());
    assert!(host.is_started("x"));
}

#[tokio::test]
async fn test_session_is_authenticated_and_privileged() {
    let host = two_plugin_host();
    let config = ReloaderConfig::new().with_credentials("admin", "secret");
    let reloader = orchestrator(&host, &config);

    install(&reloader, "x", &[]).await;

    let calls = host.calls();
    assert_eq!(calls[0], HostCall::OpenSession);
    assert_eq!(calls[1], HostCall::Authenticate("admin".into()));
    assert_eq!(calls[2], HostCall::Grant(Privilege::ManageGlobalProperties));
    assert_eq!(calls[3], HostCall::Grant(Privilege::ManageScheduler));
    assert_eq!(calls[calls.len() - 1], HostCall::CloseSession);
    assert!(calls.contains(&HostCall::Revoke(Privilege::ManageScheduler)));
}

#[tokio::test]
async fn test_rejected_credentials_abort_install() {
    let host = two_plugin_host();
    host.reject_auth();
    let config = ReloaderConfig::new().with_credentials("admin", "wrong");
    let reloader = orchestrator(&host, &config);

    let outcome = install(&reloader, "x", &[]).await;

    assert!(matches!(outcome, InstallOutcome::RuntimeFailed(_)));
    assert!(host.stop_order().is_empty());
    assert!(host.held_privileges().is_empty());
    assert!(!host.session_open());
}

#[tokio::test]
async fn test_cycle_events() {
    let host = two_plugin_host();
    host.request_refresh("x");
    let reloader = orchestrator(&host, &ReloaderConfig::new());
    let mut events = reloader.subscribe();

    install(&reloader, "x", &[]).await;

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }

    assert!(matches!(
        received.first(),
        Some(ReloadEvent::ReloadStarted { filename }) if filename == "x.pkg"
    ));
    assert!(received.iter().any(|e| matches!(
        e,
        ReloadEvent::ContextRefreshed { signature: RefreshSignature::Standard }
    )));
    match received.last() {
        Some(ReloadEvent::ReloadCompleted { plugin_id, restarted, .. }) => {
            assert_eq!(plugin_id, "x");
            assert_eq!(restarted, &vec!["y".to_string()]);
        }
        other => panic!("expected completion event, got {other:?}"),
    }
}

#[tokio::test]
async fn test_failure_event() {
    let host = two_plugin_host();
    let reloader = orchestrator(&host, &ReloaderConfig::new());
    let mut events = reloader.subscribe();

    reloader.install(b"garbage".as_slice(), "x.pkg").await;

    let mut last = None;
    while let Ok(event) = events.try_recv() {
        last = Some(event);
    }
    assert!(matches!(
        last,
        Some(ReloadEvent::ReloadFailed { filename, .. }) if filename == "x.pkg"
    ));
}
