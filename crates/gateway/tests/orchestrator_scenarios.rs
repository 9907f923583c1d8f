//! End-to-end coverage of the query orchestrator's stage pipeline, driven
//! directly (bypassing the HTTP auth layer, which needs a signed JWT and a
//! reachable JWKS endpoint neither of which this crate's test tooling
//! fabricates) against `wiremock` tool servers and the LLM client's mock
//! provider.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gateway::app::AppState;
use gateway::orchestrator::{self, Emitted, OrchestratorEvent};
use gateway_core::config::{
    AuthConfig, ConfirmationConfig, GatewayConfig, LifecycleConfig, LlmConfig, PaginationConfig,
    RateLimitConfig, ServerConfig, TimeoutConfig, ToolServerConfig,
};
use gateway_core::CallerContext;
use gateway_llm::MOCK_CREDENTIAL_PREFIX;

fn caller(roles: &[&str]) -> CallerContext {
    CallerContext {
        user_id: "u1".to_string(),
        username: "alice".to_string(),
        email: "alice@example.com".to_string(),
        roles: roles.iter().map(|r| r.to_string()).collect(),
        groups: vec![],
        department_code: None,
        token_id: None,
    }
}

fn config(tool_servers: Vec<ToolServerConfig>) -> GatewayConfig {
    GatewayConfig {
        server: ServerConfig { heartbeat_ms: 0, ..Default::default() },
        auth: AuthConfig {
            jwks_url: "http://127.0.0.1:0/jwks".to_string(),
            issuer: "https://idp.example.com".to_string(),
            extra_issuers: vec![],
            client_id: "gateway".to_string(),
            jwks_cache_secs: 300,
            revocation_ttl_secs: 86_400,
        },
        llm: LlmConfig {
            credential: format!("{MOCK_CREDENTIAL_PREFIX}test"),
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-sonnet-4-6".to_string(),
            max_tokens: 1024,
        },
        tool_servers,
        timeouts: TimeoutConfig {
            read_ms: 500,
            write_ms: 500,
            llm_ms: 5_000,
            total_budget_ms: 10_000,
        },
        rate_limit: RateLimitConfig::default(),
        pagination: PaginationConfig { max_pages: 5 },
        confirmation: ConfirmationConfig::default(),
        lifecycle: LifecycleConfig::default(),
    }
}

async fn drain(mut rx: mpsc::Receiver<Emitted>) -> (String, Vec<OrchestratorEvent>) {
    let mut text = String::new();
    let mut events = Vec::new();
    while let Some(emitted) = rx.recv().await {
        if let Emitted::Event(event) = emitted {
            if let OrchestratorEvent::Text { text: chunk } = &event {
                text.push_str(chunk);
            }
            events.push(event);
        }
    }
    (text, events)
}

#[tokio::test]
async fn successful_query_consults_accessible_servers_and_streams_text() {
    let billing = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "ok",
            "data": {"openInvoices": 2},
        })))
        .mount(&billing)
        .await;

    let cfg = config(vec![ToolServerConfig {
        name: "billing".to_string(),
        endpoint: billing.uri(),
        required_roles: HashSet::from(["finance".to_string()]),
        description: String::new(),
    }]);

    let state = Arc::new(AppState::new(cfg));
    let (tx, rx) = mpsc::channel(64);
    let outcome = orchestrator::run(
        Arc::clone(&state),
        caller(&["finance"]),
        "how many open invoices do we have".to_string(),
        None,
        CancellationToken::new(),
        tx,
        "req-1".to_string(),
    )
    .await;

    assert_eq!(outcome.servers_consulted, vec!["billing"]);
    assert!(outcome.servers_failed.is_empty());
    assert!(outcome.success);

    let (text, _) = drain(rx).await;
    assert!(text.contains("alice"));
    assert!(text.contains("billing"));
}

#[tokio::test]
async fn caller_without_matching_role_sees_empty_fan_out() {
    let billing = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "ok",
            "data": {},
        })))
        .mount(&billing)
        .await;

    let cfg = config(vec![ToolServerConfig {
        name: "billing".to_string(),
        endpoint: billing.uri(),
        required_roles: HashSet::from(["finance".to_string()]),
        description: String::new(),
    }]);

    let state = Arc::new(AppState::new(cfg));
    let (tx, rx) = mpsc::channel(64);
    let outcome = orchestrator::run(
        Arc::clone(&state),
        caller(&["sales"]),
        "how many open invoices do we have".to_string(),
        None,
        CancellationToken::new(),
        tx,
        "req-1".to_string(),
    )
    .await;

    assert!(outcome.servers_consulted.is_empty());
    assert_eq!(outcome.servers_denied, vec!["billing"]);
    drain(rx).await;
}

#[tokio::test]
async fn one_server_timing_out_still_streams_a_partial_answer() {
    let billing = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "ok",
            "data": {"openInvoices": 1},
        })))
        .mount(&billing)
        .await;

    let hr = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(800)))
        .mount(&hr)
        .await;

    let cfg = config(vec![
        ToolServerConfig {
            name: "billing".to_string(),
            endpoint: billing.uri(),
            required_roles: HashSet::from(["finance".to_string()]),
            description: String::new(),
        },
        ToolServerConfig {
            name: "hr".to_string(),
            endpoint: hr.uri(),
            required_roles: HashSet::from(["finance".to_string()]),
            description: String::new(),
        },
    ]);

    let state = Arc::new(AppState::new(cfg));
    let (tx, rx) = mpsc::channel(64);
    let outcome = orchestrator::run(
        Arc::clone(&state),
        caller(&["finance"]),
        "summarise this quarter".to_string(),
        None,
        CancellationToken::new(),
        tx,
        "req-1".to_string(),
    )
    .await;

    assert_eq!(outcome.servers_failed, vec!["hr"]);
    let (text, events) = drain(rx).await;
    assert!(events.iter().any(|e| matches!(e, OrchestratorEvent::ServiceUnavailable { .. })));
    assert!(!text.is_empty());
}

#[tokio::test]
async fn pending_confirmation_short_circuits_before_the_llm_is_invoked() {
    let billing = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "pendingConfirmation",
            "confirmationId": "c-1",
            "message": "Confirm write-off of invoice 42?",
            "action": "write_off_invoice",
            "data": {"invoiceId": 42},
        })))
        .mount(&billing)
        .await;

    let cfg = config(vec![ToolServerConfig {
        name: "billing".to_string(),
        endpoint: billing.uri(),
        required_roles: HashSet::from(["finance".to_string()]),
        description: String::new(),
    }]);

    let state = Arc::new(AppState::new(cfg));
    let (tx, mut rx) = mpsc::channel(64);
    let outcome = orchestrator::run(
        Arc::clone(&state),
        caller(&["finance"]),
        "write off invoice 42".to_string(),
        None,
        CancellationToken::new(),
        tx,
        "req-1".to_string(),
    )
    .await;

    assert!(outcome.success);

    let mut saw_pending = false;
    while let Some(emitted) = rx.recv().await {
        match emitted {
            Emitted::PendingConfirmation(p) => {
                assert_eq!(p.confirmation_id, "c-1");
                saw_pending = true;
            }
            Emitted::Event(OrchestratorEvent::Text { .. }) => {
                panic!("LLM must not be invoked once a pending confirmation is emitted");
            }
            _ => {}
        }
    }
    assert!(saw_pending);
    assert!(state.confirmations.take_once("c-1").is_some());
}

#[tokio::test]
async fn results_are_assembled_in_declaration_order_regardless_of_completion_order() {
    let slow = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(150)).set_body_json(
            serde_json::json!({"status": "ok", "data": {"server": "slow"}}),
        ))
        .mount(&slow)
        .await;

    let fast = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "ok",
            "data": {"server": "fast"},
        })))
        .mount(&fast)
        .await;

    let cfg = config(vec![
        ToolServerConfig {
            name: "slow".to_string(),
            endpoint: slow.uri(),
            required_roles: HashSet::from(["finance".to_string()]),
            description: String::new(),
        },
        ToolServerConfig {
            name: "fast".to_string(),
            endpoint: fast.uri(),
            required_roles: HashSet::from(["finance".to_string()]),
            description: String::new(),
        },
    ]);

    let state = Arc::new(AppState::new(cfg));
    let (tx, rx) = mpsc::channel(64);
    let outcome = orchestrator::run(
        Arc::clone(&state),
        caller(&["finance"]),
        "status report".to_string(),
        None,
        CancellationToken::new(),
        tx,
        "req-1".to_string(),
    )
    .await;

    // `slow` was declared first, so even though `fast` answers first, the
    // data block built from `results` keeps `slow` before `fast`.
    assert_eq!(outcome.servers_consulted, vec!["slow", "fast"]);
    drain(rx).await;
}
