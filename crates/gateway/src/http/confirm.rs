//! 4.K Confirmation Endpoint — the commit half of a two-phase write. A
//! client that received a `pending_confirmation` envelope posts back here
//! with the caller's decision.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use gateway_core::GatewayError;

use crate::app::AppState;
use crate::auth::AuthenticatedCaller;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ConfirmBody {
    pub approved: bool,
}

pub async fn confirm_handler(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(confirmation_id): Path<String>,
    Json(body): Json<ConfirmBody>,
) -> Response {
    let envelope = match state.confirmations.take_once(&confirmation_id) {
        Some(envelope) => envelope,
        None => return ApiError(GatewayError::ConfirmationExpired).into_response(),
    };

    if envelope.user_id != caller.user_id {
        warn!(
            confirmation_id = %confirmation_id,
            owner = %envelope.user_id,
            caller = %caller.user_id,
            "confirmation owner mismatch"
        );
        return ApiError(GatewayError::ConfirmationOwnerMismatch).into_response();
    }

    if !body.approved {
        return Json(json!({ "status": "cancelled", "confirmationId": confirmation_id })).into_response();
    }

    let server = match state.tool_servers.iter().find(|s| s.name == envelope.mcp_server) {
        Some(server) => server,
        None => {
            return ApiError(GatewayError::Internal(format!(
                "confirmation references unknown tool server {}",
                envelope.mcp_server
            )))
            .into_response()
        }
    };

    let roles: Vec<&str> = caller.roles.iter().map(|s| s.as_str()).collect();
    let request_id = Uuid::new_v4().to_string();
    let resp = state
        .http
        .post(format!("{}/execute", server.endpoint.trim_end_matches('/')))
        .timeout(std::time::Duration::from_millis(state.config.timeouts.write_ms))
        .header("X-User-ID", &caller.user_id)
        .header("X-User-Roles", roles.join(","))
        .header("X-Request-ID", &request_id)
        .json(&json!({
            "action": envelope.action,
            "data": envelope,
            "userContext": {
                "userId": caller.user_id,
                "username": caller.username,
                "email": caller.email,
                "roles": roles,
            },
        }))
        .send()
        .await;

    match resp {
        Ok(resp) => {
            let status = resp.status();
            match resp.json::<serde_json::Value>().await {
                Ok(body) => (status, Json(body)).into_response(),
                Err(_) => ApiError(GatewayError::UpstreamError(format!(
                    "{} returned a non-JSON execute response",
                    envelope.mcp_server
                )))
                .into_response(),
            }
        }
        Err(e) if e.is_timeout() => ApiError(GatewayError::UpstreamTimeout(envelope.mcp_server)).into_response(),
        Err(e) => ApiError(GatewayError::UpstreamError(e.to_string())).into_response(),
    }
}
