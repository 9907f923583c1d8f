//! `GET/POST /api/mcp/{serverName}/{toolName}` — a thin, role-checked proxy
//! straight through to a tool server's own tool surface, for clients that
//! want to call a specific tool directly instead of going through the
//! orchestrator's natural-language fan-out.

use std::sync::{Arc, LazyLock};

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use regex::Regex;
use serde_json::Value;
use uuid::Uuid;

use gateway_core::GatewayError;

use crate::app::AppState;
use crate::auth::AuthenticatedCaller;
use crate::error::ApiError;

static TOOL_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").unwrap());

pub async fn mcp_proxy(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path((server_name, tool_name)): Path<(String, String)>,
    body: Option<Json<Value>>,
) -> Response {
    if !TOOL_NAME.is_match(&tool_name) {
        return ApiError(GatewayError::Validation(format!("invalid tool name {tool_name}"))).into_response();
    }

    let server = match state.tool_servers.iter().find(|s| s.name == server_name) {
        Some(server) => server,
        None => return ApiError(GatewayError::Validation(format!("unknown tool server {server_name}"))).into_response(),
    };

    if !caller.has_any_role(&server.required_roles) {
        return ApiError(GatewayError::Unauthorised { server: server_name }).into_response();
    }

    let roles: Vec<&str> = caller.roles.iter().map(|s| s.as_str()).collect();
    let request_id = Uuid::new_v4().to_string();
    let mut req = state
        .http
        .post(format!(
            "{}/tools/{}",
            server.endpoint.trim_end_matches('/'),
            tool_name
        ))
        .timeout(std::time::Duration::from_millis(state.config.timeouts.read_ms))
        .header("X-User-ID", &caller.user_id)
        .header("X-User-Roles", roles.join(","))
        .header("X-Request-ID", &request_id);

    if let Some(Json(payload)) = body {
        req = req.json(&payload);
    }

    match req.send().await {
        Ok(resp) => {
            let status = resp.status();
            match resp.json::<Value>().await {
                Ok(payload) => (status, Json(payload)).into_response(),
                Err(_) => ApiError(GatewayError::UpstreamError(format!(
                    "{server_name} returned a non-JSON response"
                )))
                .into_response(),
            }
        }
        Err(e) if e.is_timeout() => ApiError(GatewayError::UpstreamTimeout(server_name)).into_response(),
        Err(e) => ApiError(GatewayError::UpstreamError(e.to_string())).into_response(),
    }
}
