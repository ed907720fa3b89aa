//! Health check and reconnection tests
//!
//! Covers the per-call freshness check, the one-shot reconnection cycle and
//! the collaborator-driven health sweep.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use serde_json::json;
use tests::{fast_settings, probing_settings, MockServer, PoolHarness};
use toolmux_core::{ConnectionError, McpError, ToolError};
use toolmux_pool::HealthCheckReport;

// ============================================================================
// Per-call health
// ============================================================================

#[tokio::test]
async fn test_fresh_connection_skips_probe() {
    let harness = PoolHarness::new(fast_settings());
    let a = harness.add(MockServer::new("a", &["x"]));
    harness.manager.initialize(vec![a.config()]).await.unwrap();

    for _ in 0..3 {
        assert!(harness.manager.call_tool("a:x", json!({})).await.success);
    }
    assert_eq!(a.probe_count(), 0);
}

#[tokio::test]
async fn test_stale_connection_is_probed() {
    let harness = PoolHarness::new(probing_settings());
    let a = harness.add(MockServer::new("a", &["x"]));
    harness.manager.initialize(vec![a.config()]).await.unwrap();

    assert!(harness.manager.call_tool("a:x", json!({})).await.success);
    assert!(harness.manager.call_tool("a:x", json!({})).await.success);
    assert_eq!(a.probe_count(), 2);
    assert_eq!(a.connect_count(), 1);
}

#[tokio::test]
async fn test_degraded_connection_reconnects_once_and_uses_new_connection() {
    let harness = PoolHarness::new(probing_settings());
    let a = harness.add(MockServer::new("a", &["x"]));
    harness.manager.initialize(vec![a.config()]).await.unwrap();
    let before = harness.manager.get_connection("a").unwrap();

    a.break_sessions();
    let result = harness.manager.call_tool("a:x", json!({"n": 1})).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(a.connect_count(), 2);
    assert_eq!(a.close_count(), 1);

    let after = harness.manager.get_connection("a").unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert!(after.is_connected());
    assert!(!before.is_connected());
    assert_eq!(after.connection_attempts(), 0);
}

#[tokio::test]
async fn test_transport_failure_marks_connection_for_reprobe() {
    // Default TTL: the first call trusts the fresh connection and fails.
    let harness = PoolHarness::new(fast_settings());
    let a = harness.add(MockServer::new("a", &["x"]));
    harness.manager.initialize(vec![a.config()]).await.unwrap();

    a.break_sessions();
    let first = harness.manager.call_tool("a:x", json!({})).await;
    assert!(matches!(
        first.error,
        Some(McpError::Tool(ToolError::CallFailed { .. }))
    ));
    assert_eq!(a.connect_count(), 1);

    let second = harness.manager.call_tool("a:x", json!({})).await;
    assert!(second.success, "{:?}", second.error);
    assert_eq!(a.connect_count(), 2);
}

#[tokio::test]
async fn test_failed_reconnect_removes_server() {
    let harness = PoolHarness::new(probing_settings());
    let a = harness.add(MockServer::new("a", &["x"]));
    let b = harness.add(MockServer::new("b", &["y"]));
    harness
        .manager
        .initialize(PoolHarness::configs(&[&a, &b]))
        .await
        .unwrap();

    a.set_reachable(false);
    let result = harness.manager.call_tool("a:x", json!({})).await;

    assert!(matches!(
        result.error,
        Some(McpError::Connection(ConnectionError::Unavailable { ref server, .. })) if server == "a"
    ));
    assert!(harness.manager.get_connection("a").is_none());
    assert!(!harness.manager.get_status()["a"].connected);
    assert!(harness.manager.get_status()["b"].connected);

    let tools: Vec<String> = harness.manager.get_all_tools().into_keys().collect();
    assert_eq!(tools, vec!["b:y"]);

    let again = harness.manager.call_tool("a:x", json!({})).await;
    assert!(matches!(
        again.error,
        Some(McpError::Tool(ToolError::NotFound { .. }))
    ));
}

// ============================================================================
// Health sweep
// ============================================================================

#[tokio::test]
async fn test_health_sweep_repairs_and_drops() {
    let harness = PoolHarness::new(fast_settings());
    let ok = harness.add(MockServer::new("ok", &["x"]));
    let broken = harness.add(MockServer::new("broken", &["x"]));
    let gone = harness.add(MockServer::new("gone", &["x"]));
    harness
        .manager
        .initialize(PoolHarness::configs(&[&ok, &broken, &gone]))
        .await
        .unwrap();

    broken.break_sessions();
    gone.set_reachable(false);

    let report = harness.manager.perform_health_checks().await;

    assert_eq!(
        report,
        HealthCheckReport {
            healthy: vec!["ok".to_string()],
            reconnected: vec!["broken".to_string()],
            dropped: vec!["gone".to_string()],
        }
    );

    let status = harness.manager.get_status();
    assert!(status["ok"].connected);
    assert!(status["broken"].connected);
    assert!(!status["gone"].connected);
    assert!(harness.manager.call_tool("broken:x", json!({})).await.success);
}

#[tokio::test]
async fn test_health_sweep_ignores_freshness() {
    let harness = PoolHarness::new(fast_settings());
    let a = harness.add(MockServer::new("a", &["x"]));
    harness.manager.initialize(vec![a.config()]).await.unwrap();

    harness.manager.perform_health_checks().await;
    harness.manager.perform_health_checks().await;

    assert_eq!(a.probe_count(), 2);
}

#[tokio::test]
async fn test_unhealthy_endpoint_triggers_reconnect() {
    let harness = PoolHarness::new(fast_settings());
    let a = harness.add(MockServer::new("a", &["x"]));
    harness.manager.initialize(vec![a.config()]).await.unwrap();

    a.set_healthy(false);
    let report = harness.manager.perform_health_checks().await;

    // The handshake itself still works, so the server comes back.
    assert_eq!(report.reconnected, vec!["a".to_string()]);
    assert_eq!(a.connect_count(), 2);
}

#[tokio::test]
async fn test_last_check_advances_only_on_success() {
    let harness = PoolHarness::new(fast_settings());
    let a = harness.add(MockServer::new("a", &["x"]));
    harness.manager.initialize(vec![a.config()]).await.unwrap();
    let conn = harness.manager.get_connection("a").unwrap();

    harness.manager.perform_health_checks().await;
    let checked = conn.status().last_check;
    assert!(checked.is_some());

    a.set_reachable(false);
    harness.manager.perform_health_checks().await;

    assert_eq!(conn.status().last_check, checked);
    assert_eq!(conn.status().error_count, 1);
    assert!(!conn.is_connected());
}

#[tokio::test]
async fn test_hung_probe_does_not_stall_sweep() {
    let harness = PoolHarness::new(fast_settings());
    let a = harness.add(MockServer::new("a", &["x"]));
    let b = harness.add(MockServer::new("b", &["x"]));
    let hung = harness.add(MockServer::new("hung", &["x"]));
    harness
        .manager
        .initialize(PoolHarness::configs(&[&a, &b, &hung]))
        .await
        .unwrap();
    let hung_before = harness.manager.get_connection("hung").unwrap();

    hung.set_probe_delay(Duration::from_secs(30));
    let started = Instant::now();
    let report = harness.manager.perform_health_checks().await;
    let elapsed = started.elapsed();

    // probe_timeout is 500ms in fast_settings
    assert!(elapsed < Duration::from_millis(1_500), "{:?}", elapsed);
    assert_eq!(report.healthy, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(report.reconnected, vec!["hung".to_string()]);
    assert_eq!(hung_before.connection_attempts(), 1);
    assert!(!hung_before.is_connected());
    assert_eq!(hung.connect_count(), 2);
}
