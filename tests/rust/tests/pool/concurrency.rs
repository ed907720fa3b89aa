//! Concurrency tests
//!
//! Calls on different servers must not wait on each other, and concurrent
//! callers hitting the same degraded server must share one reconnection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde_json::json;
use tests::{fast_settings, probing_settings, MockServer, PoolHarness, RESTRICTED};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_server_does_not_block_fast_server() {
    let mut settings = fast_settings();
    settings.tool_call_timeout_ms = 5_000;
    let harness = PoolHarness::new(settings);
    let slow = harness.add(MockServer::new("slow", &["think"]).with_call_delay(Duration::from_millis(800)));
    let fast = harness.add(MockServer::new("fast", &["ping"]));
    harness
        .manager
        .initialize(PoolHarness::configs(&[&slow, &fast]))
        .await
        .unwrap();

    let started = Instant::now();
    let (slow_result, fast_result) = tokio::join!(
        harness.manager.call_tool("slow:think", json!({})),
        async {
            // Let the slow call get in flight first.
            tokio::time::sleep(Duration::from_millis(20)).await;
            let result = harness.manager.call_tool("fast:ping", json!({})).await;
            (result, started.elapsed())
        }
    );

    let (fast_result, fast_done_at) = fast_result;
    assert!(fast_result.success);
    assert!(slow_result.success);
    assert!(fast_done_at < Duration::from_millis(800));
    assert!(slow_result.execution_time >= Duration::from_millis(800));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_reconnect() {
    let harness = Arc::new(PoolHarness::new(probing_settings()));
    let a = harness.add(MockServer::new("a", &["x"]));
    harness.manager.initialize(vec![a.config()]).await.unwrap();

    a.break_sessions();

    let calls = (0..8).map(|i| {
        let harness = Arc::clone(&harness);
        tokio::spawn(async move { harness.manager.call_tool("a:x", json!({ "i": i })).await })
    });
    let results = join_all(calls).await;

    for result in results {
        let result = result.expect("task panicked");
        assert!(result.success, "{:?}", result.error);
    }
    assert_eq!(a.connect_count(), 2);
    assert_eq!(a.close_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_calls_during_token_update_keep_working() {
    let harness = Arc::new(PoolHarness::with_restricted(fast_settings()));
    let browser = harness.add(MockServer::new("browser", &["open_tab"]));
    harness.add(MockServer::new(RESTRICTED, &["search"]).with_connect_delay(Duration::from_millis(200)));
    harness.manager.initialize(vec![browser.config()]).await.unwrap();

    let updater = {
        let harness = Arc::clone(&harness);
        tokio::spawn(async move {
            harness.manager.update_auth_token(Some("t1".to_string())).await;
        })
    };

    let started = Instant::now();
    let result = harness.manager.call_tool("browser:open_tab", json!({})).await;
    assert!(result.success);
    assert!(started.elapsed() < Duration::from_millis(200));

    updater.await.unwrap();
    assert!(harness.manager.get_all_tools().contains_key("rag:search"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_health_sweep_runs_servers_in_parallel() {
    let mut settings = fast_settings();
    settings.connect_timeout_ms = 2_000;
    let harness = PoolHarness::new(settings);
    let servers: Vec<_> = (0..4)
        .map(|i| harness.add(MockServer::new(&format!("s{}", i), &["x"])))
        .collect();
    harness
        .manager
        .initialize(servers.iter().map(|s| s.config()).collect())
        .await
        .unwrap();

    // Kill every session and swap in replacements whose handshake takes 300ms.
    for server in &servers {
        server.break_sessions();
    }
    let replacements: Vec<_> = (0..4)
        .map(|i| {
            harness.add(
                MockServer::new(&format!("s{}", i), &["x"])
                    .with_connect_delay(Duration::from_millis(300)),
            )
        })
        .collect();

    let started = Instant::now();
    let report = harness.manager.perform_health_checks().await;

    assert_eq!(report.reconnected.len(), 4);
    assert!(started.elapsed() < Duration::from_millis(1_000));
    assert!(replacements.iter().all(|s| s.connect_count() == 1));
}
