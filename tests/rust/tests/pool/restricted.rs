//! Restricted server tests
//!
//! The authorization-gated server joins and leaves the pool as the session
//! token is set and cleared; nothing else in the pool is disturbed.

use std::collections::BTreeMap;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use tests::{fast_settings, MockServer, MockTransport, PoolHarness, PASSTHROUGH_ENV, RESTRICTED};
use toolmux_core::{ConfigurationError, McpError, RestrictedServerSpec, ServerConfig};
use toolmux_pool::McpManager;

fn tool_names(harness: &PoolHarness) -> Vec<String> {
    harness.manager.get_all_tools().into_keys().collect()
}

#[tokio::test]
async fn test_token_adds_and_removes_restricted_server() {
    let harness = PoolHarness::with_restricted(fast_settings());
    let browser = harness.add(MockServer::new("browser", &["open_tab"]));
    let rag = harness.add(MockServer::new(RESTRICTED, &["search", "ingest"]));
    harness.manager.initialize(vec![browser.config()]).await.unwrap();

    let tools_before = tool_names(&harness);
    let status_before: BTreeMap<_, _> = harness
        .manager
        .get_status()
        .into_iter()
        .map(|(name, s)| (name, s.connected))
        .collect();
    let browser_conn = harness.manager.get_connection("browser").unwrap();

    harness.manager.update_auth_token(Some("t1".to_string())).await;

    assert!(harness.manager.has_auth_token());
    assert_eq!(
        tool_names(&harness),
        vec!["browser:open_tab", "rag:ingest", "rag:search"]
    );
    assert!(harness.manager.get_status()[RESTRICTED].connected);
    assert!(harness.manager.call_tool("rag:search", json!({})).await.success);

    harness.manager.update_auth_token(None).await;

    assert!(!harness.manager.has_auth_token());
    assert_eq!(tool_names(&harness), tools_before);
    let status_after: BTreeMap<_, _> = harness
        .manager
        .get_status()
        .into_iter()
        .map(|(name, s)| (name, s.connected))
        .collect();
    assert_eq!(status_after, status_before);
    assert_eq!(rag.close_count(), 1);

    // The other servers were never touched.
    let browser_after = harness.manager.get_connection("browser").unwrap();
    assert!(Arc::ptr_eq(&browser_conn, &browser_after));
    assert_eq!(browser.connect_count(), 1);
}

#[tokio::test]
async fn test_token_travels_as_bearer_header() {
    let harness = PoolHarness::with_restricted(fast_settings());
    let browser = harness.add(MockServer::new("browser", &["open_tab"]));
    let rag = harness.add(MockServer::new(RESTRICTED, &["search"]));
    harness.manager.initialize(vec![browser.config()]).await.unwrap();

    harness.manager.update_auth_token(Some("s3cret".to_string())).await;

    assert_eq!(
        rag.last_headers().get("Authorization").map(String::as_str),
        Some("Bearer s3cret")
    );
    let conn = harness.manager.get_connection(RESTRICTED).unwrap();
    assert_eq!(conn.config().env.get("AUTH_TOKEN").map(String::as_str), Some("s3cret"));
    assert_eq!(
        conn.config().env.get(PASSTHROUGH_ENV).map(String::as_str),
        Some(env!("CARGO_PKG_NAME"))
    );
}

#[tokio::test]
async fn test_same_token_is_noop() {
    let harness = PoolHarness::with_restricted(fast_settings());
    let browser = harness.add(MockServer::new("browser", &["open_tab"]));
    let rag = harness.add(MockServer::new(RESTRICTED, &["search"]));
    harness.manager.initialize(vec![browser.config()]).await.unwrap();

    harness.manager.update_auth_token(Some("t1".to_string())).await;
    harness.manager.update_auth_token(Some("t1".to_string())).await;

    assert_eq!(rag.connect_count(), 1);
    assert_eq!(rag.close_count(), 0);
}

#[tokio::test]
async fn test_new_token_replaces_session() {
    let harness = PoolHarness::with_restricted(fast_settings());
    let browser = harness.add(MockServer::new("browser", &["open_tab"]));
    let rag = harness.add(MockServer::new(RESTRICTED, &["search"]));
    harness.manager.initialize(vec![browser.config()]).await.unwrap();

    harness.manager.update_auth_token(Some("t1".to_string())).await;
    harness.manager.update_auth_token(Some("t2".to_string())).await;

    assert_eq!(rag.connect_count(), 2);
    assert_eq!(rag.close_count(), 1);
    assert_eq!(
        rag.last_headers().get("Authorization").map(String::as_str),
        Some("Bearer t2")
    );
    assert!(harness.manager.get_status()[RESTRICTED].connected);
}

#[tokio::test]
async fn test_unreachable_restricted_server_is_reported_not_raised() {
    let harness = PoolHarness::with_restricted(fast_settings());
    let browser = harness.add(MockServer::new("browser", &["open_tab"]));
    harness.add(MockServer::new(RESTRICTED, &["search"]).unreachable());
    harness.manager.initialize(vec![browser.config()]).await.unwrap();

    harness.manager.update_auth_token(Some("t1".to_string())).await;

    assert!(harness.manager.has_auth_token());
    assert!(harness.manager.get_connection(RESTRICTED).is_none());
    let status = harness.manager.get_status();
    assert!(!status[RESTRICTED].connected);
    assert!(status["browser"].connected);
    assert_eq!(tool_names(&harness), vec!["browser:open_tab"]);

    // Clearing the token forgets the server entirely.
    harness.manager.update_auth_token(None).await;
    assert!(!harness.manager.get_status().contains_key(RESTRICTED));
}

#[tokio::test]
async fn test_token_before_initialize_joins_startup() {
    let harness = PoolHarness::with_restricted(fast_settings());
    let browser = harness.add(MockServer::new("browser", &["open_tab"]));
    let rag = harness.add(MockServer::new(RESTRICTED, &["search"]));

    harness.manager.update_auth_token(Some("t1".to_string())).await;
    assert_eq!(rag.connect_count(), 0);

    let report = harness.manager.initialize(vec![browser.config()]).await.unwrap();

    assert_eq!(report.connected.len(), 2);
    assert!(report.connected.contains(&RESTRICTED.to_string()));
    assert!(harness.manager.get_all_tools().contains_key("rag:search"));
}

#[tokio::test]
async fn test_token_without_restricted_spec_is_only_stored() {
    let harness = PoolHarness::new(fast_settings());
    let browser = harness.add(MockServer::new("browser", &["open_tab"]));
    let rag = harness.add(MockServer::new(RESTRICTED, &["search"]));
    harness.manager.initialize(vec![browser.config()]).await.unwrap();

    harness.manager.update_auth_token(Some("t1".to_string())).await;

    assert!(harness.manager.has_auth_token());
    assert_eq!(rag.connect_count(), 0);
    assert_eq!(tool_names(&harness), vec!["browser:open_tab"]);
}

#[tokio::test]
async fn test_blank_token_clears() {
    let harness = PoolHarness::with_restricted(fast_settings());
    let browser = harness.add(MockServer::new("browser", &["open_tab"]));
    harness.add(MockServer::new(RESTRICTED, &["search"]));
    harness.manager.initialize(vec![browser.config()]).await.unwrap();

    harness.manager.update_auth_token(Some("t1".to_string())).await;
    harness.manager.update_auth_token(Some("  ".to_string())).await;

    assert!(!harness.manager.has_auth_token());
    assert!(harness.manager.get_connection(RESTRICTED).is_none());
}

#[tokio::test]
async fn test_static_config_may_not_claim_restricted_name() {
    let harness = PoolHarness::with_restricted(fast_settings());
    let err = harness
        .manager
        .initialize(vec![ServerConfig::new(RESTRICTED, "http://localhost", 8001)])
        .await
        .unwrap_err();

    assert_eq!(
        err,
        McpError::Configuration(ConfigurationError::ReservedName {
            name: RESTRICTED.to_string()
        })
    );
}

#[tokio::test]
async fn test_restricted_name_with_separator_is_rejected() {
    let transport = Arc::new(MockTransport::new());
    let browser = transport.add(MockServer::new("browser", &["open_tab"]));
    let rag = transport.add(MockServer::new("rag:v2", &["search"]));
    let manager = McpManager::new(
        fast_settings(),
        Some(RestrictedServerSpec::new("rag:v2", "http://localhost", 8001)),
        transport.clone(),
    );

    manager.update_auth_token(Some("t1".to_string())).await;
    let err = manager.initialize(vec![browser.config()]).await.unwrap_err();

    assert!(matches!(
        err,
        McpError::Configuration(ConfigurationError::InvalidName { ref name, .. }) if name == "rag:v2"
    ));
    assert!(!manager.is_initialized());
    assert!(manager.get_all_tools().is_empty());
    assert_eq!(browser.connect_count(), 0);
    assert_eq!(rag.connect_count(), 0);
}
