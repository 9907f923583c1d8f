//! `POST/GET /api/query` (streaming) and `POST /api/ai/query` (non-streaming).
//! Both drive the same [`orchestrator::run`]; they differ only in how they
//! consume its [`Emitted`] channel.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use gateway_core::CallerContext;
use gateway_promptdefense::sanitise_input;
use gateway_ratelimit::RateLimitBucket;

use crate::app::AppState;
use crate::audit::AuditRecord;
use crate::auth::AuthenticatedCaller;
use crate::error::{too_many_requests, ApiError};
use crate::orchestrator::{self, Emitted, OrchestratorEvent, PendingConfirmationEvent, RunOutcome};

#[derive(Debug, Deserialize)]
pub struct QueryBody {
    pub query: String,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    pub q: String,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AiQueryBody {
    pub query: String,
    #[serde(default, rename = "conversationId")]
    #[allow(dead_code)]
    pub conversation_id: Option<String>,
}

pub async fn query_post(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Json(body): Json<QueryBody>,
) -> Response {
    stream_query(state, caller, body.query, body.cursor).await
}

pub async fn query_get(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Query(params): Query<QueryParams>,
) -> Response {
    stream_query(state, caller, params.q, params.cursor).await
}

async fn stream_query(
    state: Arc<AppState>,
    caller: CallerContext,
    query_text: String,
    cursor: Option<String>,
) -> Response {
    if !state.rate_limiter.check(RateLimitBucket::Query, &caller.user_id) {
        return too_many_requests();
    }

    if let Err(rejection) = sanitise_input(&query_text) {
        return ApiError::from(rejection).into_response();
    }

    let request_id = Uuid::new_v4().to_string();
    let cancel = CancellationToken::new();
    state.lifecycle.register_stream(request_id.clone(), cancel.clone());

    let (tx, mut rx) = mpsc::channel(64);
    let started = Instant::now();
    let redacted_query = redact_for_audit(&query_text);

    let run_state = Arc::clone(&state);
    let run_caller = caller.clone();
    let run_request_id = request_id.clone();
    let guard_cancel = cancel.clone();
    tokio::spawn(async move {
        let outcome = orchestrator::run(
            Arc::clone(&run_state),
            run_caller.clone(),
            query_text,
            cursor,
            cancel,
            tx,
            run_request_id.clone(),
        )
        .await;

        run_state.lifecycle.unregister_stream(&run_request_id);
        emit_audit(&run_state, &run_request_id, &run_caller, &redacted_query, &outcome, started.elapsed());
    });

    // §5's client-disconnect trigger: axum/hyper drop this generator's future
    // when the response body is dropped, which runs `_guard`'s `Drop` and
    // cancels the same token the timeout and shutdown-drain triggers share.
    let body = async_stream::stream! {
        let _guard = CancelOnDrop(guard_cancel);
        while let Some(emitted) = rx.recv().await {
            yield emitted_to_sse_event(emitted);
        }
        yield Ok(Event::default().data("[DONE]"));
    };

    let heartbeat_ms = state.config.server.heartbeat_ms;
    let mut sse = Sse::new(body);
    if heartbeat_ms > 0 {
        sse = sse.keep_alive(KeepAlive::new().interval(Duration::from_millis(heartbeat_ms)).text("heartbeat"));
    }

    let mut response = sse.into_response();
    response
        .headers_mut()
        .insert(axum::http::header::CACHE_CONTROL, "no-cache".parse().unwrap());
    response
}

/// Cancels its token when dropped, whether that's because the caller
/// disconnected and the SSE body stream was torn down, or because the
/// stream simply ran to completion.
struct CancelOnDrop(CancellationToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

fn emitted_to_sse_event(emitted: Emitted) -> Result<Event, Infallible> {
    let event = match emitted {
        Emitted::Event(e) => Event::default().json_data(e),
        Emitted::PendingConfirmation(e) => Event::default().json_data(e),
    };
    Ok(event.unwrap_or_else(|_| Event::default().data("{\"type\":\"error\",\"message\":\"encoding failure\"}")))
}

pub async fn ai_query(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Json(body): Json<AiQueryBody>,
) -> Response {
    if !state.rate_limiter.check(RateLimitBucket::Query, &caller.user_id) {
        return too_many_requests();
    }

    if let Err(rejection) = sanitise_input(&body.query) {
        return ApiError::from(rejection).into_response();
    }

    let request_id = Uuid::new_v4().to_string();
    let cancel = CancellationToken::new();
    state.lifecycle.register_stream(request_id.clone(), cancel.clone());

    let (tx, mut rx) = mpsc::channel(64);
    let started = Instant::now();
    let redacted_query = redact_for_audit(&body.query);

    let run_state = Arc::clone(&state);
    let run_caller = caller.clone();
    let handle = tokio::spawn(orchestrator::run(
        Arc::clone(&run_state),
        run_caller.clone(),
        body.query,
        None,
        cancel,
        tx,
        request_id.clone(),
    ));

    let mut response_text = String::new();
    let mut pending: Option<PendingConfirmationEvent> = None;
    while let Some(emitted) = rx.recv().await {
        match emitted {
            Emitted::Event(OrchestratorEvent::Text { text }) => response_text.push_str(&text),
            Emitted::PendingConfirmation(p) => pending = Some(p),
            _ => {}
        }
    }

    let outcome = match handle.await {
        Ok(outcome) => outcome,
        Err(_) => {
            state.lifecycle.unregister_stream(&request_id);
            return ApiError(gateway_core::GatewayError::Internal(
                "orchestrator task panicked".to_string(),
            ))
            .into_response();
        }
    };
    state.lifecycle.unregister_stream(&request_id);

    emit_audit(&state, &request_id, &caller, &redacted_query, &outcome, started.elapsed());

    if let Some(p) = pending {
        return Json(json!({
            "requestId": request_id,
            "status": p.status,
            "confirmationId": p.confirmation_id,
            "message": p.message,
            "action": p.action,
            "data": p.data,
        }))
        .into_response();
    }

    let status = if outcome.cancelled {
        "cancelled"
    } else if !outcome.success {
        "error"
    } else if !outcome.servers_failed.is_empty() {
        "partial"
    } else {
        "success"
    };

    let mut body = json!({
        "requestId": request_id,
        "response": response_text,
        "status": status,
        "metadata": {
            "dataSourcesQueried": outcome.servers_consulted,
            "dataSourcesFailed": outcome.servers_failed,
            "processingTimeMs": started.elapsed().as_millis() as u64,
        },
    });
    if !outcome.servers_failed.is_empty() {
        body["warnings"] = json!(outcome
            .servers_failed
            .iter()
            .map(|s| format!("{s} did not respond in time or returned an error"))
            .collect::<Vec<_>>());
    }

    Json(body).into_response()
}

/// PII-redacted, truncated to 100 chars — the only form of the query text
/// the audit trail is allowed to retain.
fn redact_for_audit(query: &str) -> String {
    gateway_promptdefense::redact_pii(query)
        .redacted_text
        .chars()
        .take(100)
        .collect()
}

fn emit_audit(
    state: &AppState,
    request_id: &str,
    caller: &CallerContext,
    redacted_query: &str,
    outcome: &RunOutcome,
    elapsed: Duration,
) {
    let mut roles: Vec<String> = caller.roles.iter().cloned().collect();
    roles.sort();

    let record = AuditRecord {
        timestamp: chrono::Utc::now().to_rfc3339(),
        request_id: request_id.to_string(),
        user_id: caller.user_id.clone(),
        username: caller.username.clone(),
        roles,
        query_redacted_to_first_100: redacted_query.to_string(),
        servers_consulted: outcome.servers_consulted.clone(),
        servers_denied: outcome.servers_denied.clone(),
        success: outcome.success,
        duration_ms: elapsed.as_millis() as u64,
        warnings: if outcome.servers_failed.is_empty() {
            None
        } else {
            Some(outcome.servers_failed.clone())
        },
    };
    state.audit.emit(&record);
}
