use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use gateway_auth::{JwksCache, RevocationStore, TokenVerifier};
use gateway_confirm::ConfirmationStore;
use gateway_core::{GatewayConfig, ToolServer};
use gateway_llm::LlmClient;
use gateway_promptdefense::DelimiterCache;
use gateway_ratelimit::RateLimiter;
use gateway_toolclient::{ToolClient, ToolClientConfig};

use crate::audit::{AuditSink, TracingAuditSink};
use crate::lifecycle::Lifecycle;

/// Central shared state, passed as `Arc<AppState>` to every Axum handler.
pub struct AppState {
    pub config: GatewayConfig,
    pub verifier: TokenVerifier,
    pub revocation: RevocationStore,
    pub tool_servers: Vec<ToolServer>,
    pub tool_client: ToolClient,
    pub rate_limiter: RateLimiter,
    pub confirmations: ConfirmationStore,
    pub delimiters: DelimiterCache,
    pub llm: LlmClient,
    pub lifecycle: Lifecycle,
    pub audit: Box<dyn AuditSink>,
    /// Used for the confirmation dispatch and the raw tool proxy route, which
    /// both talk to a tool server directly rather than through `ToolClient`'s
    /// query/pagination contract.
    pub http: reqwest::Client,
    pub started_at: std::time::Instant,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Self {
        let jwks = JwksCache::new(config.auth.jwks_url.clone(), config.auth.jwks_cache_secs);
        let verifier = TokenVerifier::new(
            jwks,
            config.auth.issuer.clone(),
            config.auth.extra_issuers.clone(),
            config.auth.client_id.clone(),
        );
        let revocation = RevocationStore::new(config.auth.revocation_ttl_secs);

        let tool_servers: Vec<ToolServer> = config
            .tool_servers
            .iter()
            .map(|s| ToolServer {
                name: s.name.clone(),
                endpoint: s.endpoint.clone(),
                required_roles: s.required_roles.clone(),
                description: s.description.clone(),
            })
            .collect();

        let tool_client = ToolClient::new(ToolClientConfig {
            read_timeout: std::time::Duration::from_millis(config.timeouts.read_ms),
            write_timeout: std::time::Duration::from_millis(config.timeouts.write_ms),
            max_pages: config.pagination.max_pages,
        });

        let rate_limiter = RateLimiter::new(
            config.rate_limit.general_per_min,
            config.rate_limit.query_per_min,
        );

        let llm = LlmClient::new(
            config.llm.credential.clone(),
            Some(config.llm.base_url.clone()),
            config.llm.model.clone(),
            config.llm.max_tokens,
        );

        let lifecycle = Lifecycle::new(config.lifecycle.drain_timeout_secs);

        Self {
            verifier,
            revocation,
            tool_servers,
            tool_client,
            rate_limiter,
            confirmations: ConfirmationStore::new(),
            delimiters: DelimiterCache::new(),
            llm,
            lifecycle,
            audit: Box::new(TracingAuditSink),
            http: reqwest::Client::new(),
            started_at: std::time::Instant::now(),
            config,
        }
    }
}

/// Assemble the full Axum router (§6 — everything lives under `/api`).
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(crate::http::health::health_handler))
        .route(
            "/api/query",
            post(crate::http::query::query_post).get(crate::http::query::query_get),
        )
        .route("/api/ai/query", post(crate::http::query::ai_query))
        .route(
            "/api/confirm/{confirmation_id}",
            post(crate::http::confirm::confirm_handler),
        )
        .route(
            "/api/mcp/{server_name}/{tool_name}",
            get(crate::http::mcp_proxy::mcp_proxy).post(crate::http::mcp_proxy::mcp_proxy),
        )
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            crate::middleware::general_rate_limit,
        ))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
