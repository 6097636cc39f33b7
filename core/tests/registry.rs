mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{account, output, CallLog, NullSession, ScriptedPlugin};
use famp_core::api::{ErrorKind, HealthStatus, Plugin, PluginDependency, PluginRegistry, RetryPolicy};
use pretty_assertions::assert_eq;
use serde_json::json;

fn registry_with(plugins: Vec<ScriptedPlugin>) -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    for plugin in plugins {
        let name = plugin.name().to_string();
        registry.register(&name, Arc::new(plugin));
    }
    registry
}

#[tokio::test]
async fn dependencies_run_before_dependent() {
    let log = CallLog::default();
    let mut registry = registry_with(vec![
        ScriptedPlugin::new("login", &log).returns(json!({"logged_in": true})),
        ScriptedPlugin::new("feed", &log)
            .requires(PluginDependency::required("login"))
            .returns(json!({"posts": 3})),
    ]);

    let result = registry
        .run("feed", &mut NullSession::default(), &account(), None, None)
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(log.calls(), vec!["login", "feed"]);
    assert_eq!(result.field("posts"), Some(json!(3)));
    assert_eq!(result.dependencies["login"].field("logged_in"), Some(json!(true)));
}

#[tokio::test]
async fn diamond_dependency_runs_and_is_not_a_cycle() {
    let log = CallLog::default();
    let mut registry = registry_with(vec![
        ScriptedPlugin::new("a", &log)
            .requires(PluginDependency::required("b"))
            .requires(PluginDependency::required("c")),
        ScriptedPlugin::new("b", &log).requires(PluginDependency::required("d")),
        ScriptedPlugin::new("c", &log).requires(PluginDependency::required("d")),
        ScriptedPlugin::new("d", &log),
    ]);

    assert!(registry.detect_cycles("a").is_ok());
    let result = registry
        .run("a", &mut NullSession::default(), &account(), None, None)
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(log.calls(), vec!["d", "b", "d", "c", "a"]);
    assert_eq!(registry.resolution_order("a").unwrap(), log.calls());
}

#[tokio::test]
async fn cycle_is_fatal_before_any_body_runs() {
    let log = CallLog::default();
    let mut registry = registry_with(vec![
        ScriptedPlugin::new("a", &log).requires(PluginDependency::required("b")),
        ScriptedPlugin::new("b", &log).requires(PluginDependency::required("c")),
        ScriptedPlugin::new("c", &log).requires(PluginDependency::required("a")),
    ]);

    let err = registry
        .run("a", &mut NullSession::default(), &account(), None, None)
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Dependency);
    assert_eq!(err.context["dependency_cycle"], json!(["a", "b", "c", "a"]));
    assert!(log.calls().is_empty());
}

#[tokio::test]
async fn unknown_plugin_and_missing_required_dependency_are_errors() {
    let log = CallLog::default();
    let mut registry = registry_with(vec![
        ScriptedPlugin::new("top", &log).requires(PluginDependency::required("middle")),
        ScriptedPlugin::new("middle", &log).requires(PluginDependency::required("absent")),
    ]);

    let err = registry
        .run("nope", &mut NullSession::default(), &account(), None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Dependency);

    let err = registry
        .run("top", &mut NullSession::default(), &account(), None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Dependency);
    assert_eq!(err.context["missing_dependency"], "absent");
    assert!(log.calls().is_empty());
}

#[tokio::test]
async fn optional_dependency_failure_is_swallowed() {
    let log = CallLog::default();
    let mut registry = registry_with(vec![
        ScriptedPlugin::new("enrich", &log).fails(ErrorKind::Execution, "no data"),
        ScriptedPlugin::new("main", &log)
            .requires(PluginDependency::optional("enrich"))
            .requires(PluginDependency::optional("not_installed"))
            .returns(json!({"done": true})),
    ]);

    let result = registry
        .run("main", &mut NullSession::default(), &account(), None, None)
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(log.calls(), vec!["enrich", "main"]);
    assert!(result.dependencies.is_empty());
}

#[tokio::test]
async fn required_dependency_failure_surfaces_its_error() {
    let log = CallLog::default();
    let mut registry = registry_with(vec![
        ScriptedPlugin::new("login", &log).fails(ErrorKind::Authentication, "bad password"),
        ScriptedPlugin::new("post", &log).requires(PluginDependency::required("login")),
    ]);

    let result = registry
        .run("post", &mut NullSession::default(), &account(), None, None)
        .await
        .unwrap();

    assert!(!result.success);
    let error = result.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Authentication);
    assert_eq!(error.plugin_name, "login");
    assert_eq!(error.context["required_by"], "post");
    assert_eq!(log.calls(), vec!["login"]);
}

#[tokio::test(start_paused = true)]
async fn retryable_error_succeeds_after_backoff() {
    let log = CallLog::default();
    let mut registry = registry_with(vec![ScriptedPlugin::new("flaky", &log)
        .fails(ErrorKind::Network, "reset")
        .fails(ErrorKind::Timeout, "slow")
        .returns(json!({"ok": true}))]);
    let policy = RetryPolicy::new(5, 1.0, 30.0);

    let started = tokio::time::Instant::now();
    let result = registry
        .run("flaky", &mut NullSession::default(), &account(), None, Some(&policy))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(log.count("flaky"), 3);
    // 1s before attempt 2, 2s before attempt 3.
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_report_attempts_and_last_error() {
    let log = CallLog::default();
    let mut registry = registry_with(vec![
        ScriptedPlugin::new("down", &log).fails(ErrorKind::Resource, "browser crashed")
    ]);
    let policy = RetryPolicy::new(3, 1.0, 30.0);

    let result = registry
        .run("down", &mut NullSession::default(), &account(), None, Some(&policy))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(log.count("down"), 3);
    let error = result.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Execution);
    assert_eq!(error.context["attempts"], json!(3));
    assert_eq!(error.context["last_error"]["kind"], "RESOURCE_ERROR");
}

#[tokio::test(start_paused = true)]
async fn unbounded_backoff_still_ends_in_a_failed_result() {
    let log = CallLog::default();
    let mut registry = registry_with(vec![
        ScriptedPlugin::new("flaky", &log).fails(ErrorKind::Network, "connection reset")
    ]);
    let policy = RetryPolicy::new(2, 1e20, f64::INFINITY);

    let result = registry
        .run("flaky", &mut NullSession::default(), &account(), None, Some(&policy))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(log.count("flaky"), 2);
    assert_eq!(result.error.unwrap().context["attempts"], json!(2));
}

#[tokio::test(start_paused = true)]
async fn non_retryable_error_is_not_retried() {
    let log = CallLog::default();
    let mut registry = registry_with(vec![
        ScriptedPlugin::new("auth", &log).fails(ErrorKind::Authentication, "checkpoint")
    ]);
    let policy = RetryPolicy::default();

    let result = registry
        .run("auth", &mut NullSession::default(), &account(), None, Some(&policy))
        .await
        .unwrap();

    assert_eq!(log.count("auth"), 1);
    assert_eq!(result.error.unwrap().kind, ErrorKind::Authentication);
}

#[tokio::test]
async fn no_policy_means_single_attempt() {
    let log = CallLog::default();
    let mut registry = registry_with(vec![
        ScriptedPlugin::new("flaky", &log).fails(ErrorKind::Network, "reset")
    ]);

    let result = registry
        .run("flaky", &mut NullSession::default(), &account(), None, None)
        .await
        .unwrap();

    assert_eq!(log.count("flaky"), 1);
    assert_eq!(result.error.unwrap().kind, ErrorKind::Network);
}

#[tokio::test]
async fn run_config_overlays_defaults_and_rejections_become_results() {
    let log = CallLog::default();
    let plugin = ScriptedPlugin::new("cfg", &log).arc();
    let mut registry = PluginRegistry::new();
    registry.register("cfg", plugin.clone());

    let config = output(json!({"scroll_count": 2}));
    let result = registry
        .run("cfg", &mut NullSession::default(), &account(), Some(config.clone()), None)
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(plugin.seen_configs(), vec![config.clone()]);
    assert_eq!(registry.config("cfg"), Some(&config));

    let result = registry
        .run("cfg", &mut NullSession::default(), &account(), Some(output(json!({"invalid": 1}))), None)
        .await
        .unwrap();
    assert!(!result.success);
    let error = result.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Config);
    assert_eq!(error.context["config"], json!({"invalid": 1}));
    assert_eq!(registry.config("cfg"), Some(&config));
}

#[tokio::test]
async fn register_overwrites_and_unregister_removes() {
    let log = CallLog::default();
    let mut registry = registry_with(vec![ScriptedPlugin::new("p", &log).returns(json!({"v": 1}))]);
    registry.register("p", Arc::new(ScriptedPlugin::new("p", &log).returns(json!({"v": 2}))));
    assert_eq!(registry.len(), 1);

    let result = registry
        .run("p", &mut NullSession::default(), &account(), None, None)
        .await
        .unwrap();
    assert_eq!(result.field("v"), Some(json!(2)));

    assert!(registry.unregister("p"));
    assert!(!registry.unregister("p"));
    assert!(registry.get("p").is_none());
}

#[tokio::test]
async fn health_check_updates_metadata() {
    let log = CallLog::default();
    let mut registry = registry_with(vec![ScriptedPlugin::new("p", &log)]);
    assert_eq!(registry.metadata("p").unwrap().health_status, HealthStatus::Unknown);

    let report = registry.check_health("p").await.unwrap();
    assert_eq!(report.status, HealthStatus::Healthy);
    assert_eq!(registry.metadata("p").unwrap().health_status, HealthStatus::Healthy);

    assert_eq!(registry.check_health("missing").await.unwrap_err().kind, ErrorKind::Dependency);
}

#[test]
fn search_filters_by_query() {
    let log = CallLog::default();
    let registry = registry_with(vec![
        ScriptedPlugin::new("feed_scroller", &log),
        ScriptedPlugin::new("post_publisher", &log),
    ]);

    let names: Vec<String> = registry
        .search(Some("FEED"), &[], &[])
        .into_iter()
        .map(|m| m.name)
        .collect();
    assert_eq!(names, vec!["feed_scroller"]);
    assert_eq!(registry.search(None, &[], &[]).len(), 2);
    assert!(registry
        .search(None, &["scraping".to_string()], &[])
        .is_empty());
    assert_eq!(registry.list_all()[0].name, "feed_scroller");
}
