//! 4.J Query Orchestrator — the heart. Both the streaming and non-streaming
//! HTTP entry points drive this same stage pipeline; they differ only in how
//! they consume the [`Emitted`] channel this module produces.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use gateway_core::{CallerContext, ConfirmationEnvelope, ToolResponse, ToolResult, ToolStatus};
use gateway_llm::StreamEvent;
use gateway_promptdefense::OutputPolicyMode;
use gateway_prompt::PromptBuilder;

use crate::app::AppState;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    Text {
        text: String,
    },
    ServiceUnavailable {
        warnings: Vec<ServerWarning>,
        #[serde(rename = "successfulServers")]
        successful_servers: Vec<String>,
        #[serde(rename = "failedServers")]
        failed_servers: Vec<String>,
    },
    Pagination {
        #[serde(rename = "hasMore")]
        has_more: bool,
        cursors: Vec<ServerCursor>,
        hint: String,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerWarning {
    pub server: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerCursor {
    pub server: String,
    pub cursor: String,
}

/// A pending-confirmation envelope forwarded to the client verbatim. Its
/// wire shape keys on `status`, not `type`, so it is not a member of
/// [`OrchestratorEvent`]'s tagged union (see §6).
#[derive(Debug, Clone, Serialize)]
pub struct PendingConfirmationEvent {
    pub status: &'static str,
    #[serde(rename = "confirmationId")]
    pub confirmation_id: String,
    pub message: String,
    pub action: String,
    pub data: serde_json::Value,
}

pub enum Emitted {
    Event(OrchestratorEvent),
    PendingConfirmation(PendingConfirmationEvent),
}

/// What the handlers need out of a completed run to build the audit record
/// and, in the non-streaming case, the response envelope's `metadata` block.
pub struct RunOutcome {
    pub servers_consulted: Vec<String>,
    pub servers_denied: Vec<String>,
    pub servers_failed: Vec<String>,
    pub success: bool,
    pub cancelled: bool,
}

/// Runs Stages 2–7, bounded by `totalBudgetMs` (§5's timeout cancellation
/// trigger; the other two — client disconnect and shutdown drain — cancel
/// the same token from `http/query.rs` and `lifecycle.rs` respectively).
/// Stage 1 (sanitise) happens in the HTTP handler before this is ever
/// called, since a rejection must short-circuit before any fan-out and
/// before the request shows up in the audit trail's `serversConsulted`
/// field (see the prompt-injection scenario in §8).
#[instrument(skip(state, tx, cancel), fields(user_id = %caller.user_id))]
pub async fn run(
    state: Arc<AppState>,
    caller: CallerContext,
    query_text: String,
    cursor: Option<String>,
    cancel: CancellationToken,
    tx: mpsc::Sender<Emitted>,
    request_id: String,
) -> RunOutcome {
    let budget = Duration::from_millis(state.config.timeouts.total_budget_ms);
    let deadline_cancel = cancel.clone();

    tokio::select! {
        outcome = run_stages(state, caller, query_text, cursor, cancel, tx, request_id) => outcome,
        _ = tokio::time::sleep(budget) => {
            deadline_cancel.cancel();
            RunOutcome {
                servers_consulted: Vec::new(),
                servers_denied: Vec::new(),
                servers_failed: Vec::new(),
                success: false,
                cancelled: true,
            }
        }
    }
}

async fn run_stages(
    state: Arc<AppState>,
    caller: CallerContext,
    query_text: String,
    cursor: Option<String>,
    cancel: CancellationToken,
    tx: mpsc::Sender<Emitted>,
    request_id: String,
) -> RunOutcome {
    // Stage 2 — authorise for data.
    let accessible = gateway_router::accessible(&state.tool_servers, &caller.roles);
    let denied = gateway_router::denied(&state.tool_servers, &caller.roles);
    let servers_consulted: Vec<String> = accessible.iter().map(|s| s.name.clone()).collect();
    let servers_denied: Vec<String> = denied.iter().map(|s| s.name.clone()).collect();

    // Stage 3 — fan out, launched in declaration order, joined before
    // proceeding. Ordering of `results` matches `accessible`'s order
    // regardless of completion order.
    let mut handles = Vec::with_capacity(accessible.len());
    for server in &accessible {
        let server = (*server).clone();
        let state = Arc::clone(&state);
        let caller = caller.clone();
        let cursor = cursor.clone();
        let cancel = cancel.clone();
        let request_id = request_id.clone();
        handles.push(tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => ToolResult {
                    server: server.name.clone(),
                    status: ToolStatus::Error,
                    payload: None,
                    error: Some("request cancelled".to_string()),
                    duration_ms: 0,
                },
                result = state.tool_client.query(&server, &query_text, &caller, cursor.clone(), true, false, &request_id) => result,
            }
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (idx, handle) in handles.into_iter().enumerate() {
        let server_name = accessible[idx].name.clone();
        let result = handle.await.unwrap_or_else(|_| ToolResult {
            server: server_name,
            status: ToolStatus::Error,
            payload: None,
            error: Some("tool call task panicked".to_string()),
            duration_ms: 0,
        });
        results.push(result);
    }

    if cancel.is_cancelled() {
        return RunOutcome {
            servers_consulted,
            servers_denied,
            servers_failed: Vec::new(),
            success: false,
            cancelled: true,
        };
    }

    // Stage 4 — classify; pending confirmation short-circuits everything
    // downstream of it.
    for result in &results {
        if let Some(ToolResponse::PendingConfirmation {
            confirmation_id,
            message,
            action,
            data,
        }) = &result.payload
        {
            let envelope = ConfirmationEnvelope {
                confirmation_id: confirmation_id.clone(),
                action: action.clone(),
                mcp_server: result.server.clone(),
                user_id: caller.user_id.clone(),
                created_at: chrono::Utc::now().timestamp(),
                extra: data.clone(),
            };
            state
                .confirmations
                .put(envelope, Some(state.config.confirmation.ttl_secs));

            let _ = tx
                .send(Emitted::PendingConfirmation(PendingConfirmationEvent {
                    status: "pending_confirmation",
                    confirmation_id: confirmation_id.clone(),
                    message: message.clone(),
                    action: action.clone(),
                    data: data.clone(),
                }))
                .await;

            return RunOutcome {
                servers_consulted,
                servers_denied,
                servers_failed: Vec::new(),
                success: true,
                cancelled: false,
            };
        }
    }

    let failed: Vec<&ToolResult> = results.iter().filter(|r| r.status != ToolStatus::Ok).collect();
    let servers_failed: Vec<String> = failed.iter().map(|r| r.server.clone()).collect();

    // Stage 5 — partial-failure notice.
    if !failed.is_empty() {
        let warnings = failed
            .iter()
            .map(|r| ServerWarning {
                server: r.server.clone(),
                code: if r.status == ToolStatus::Timeout { "TIMEOUT" } else { "ERROR" }.to_string(),
                message: r.error.clone().unwrap_or_default(),
            })
            .collect();
        let successful_servers: Vec<String> = results
            .iter()
            .filter(|r| r.status == ToolStatus::Ok)
            .map(|r| r.server.clone())
            .collect();

        let _ = tx
            .send(Emitted::Event(OrchestratorEvent::ServiceUnavailable {
                warnings,
                successful_servers,
                failed_servers: servers_failed.clone(),
            }))
            .await;
    }

    // Stage 6 — prompt and stream. Layer 3 wraps the query in a per-session
    // delimiter pair before it ever crosses the provider boundary, and
    // Layer 5c's PII redaction runs on it pre-LLM as well as post-LLM below.
    let delimiters = state.delimiters.get_or_create(caller.token_id.as_deref());
    let pre_llm_query = gateway_promptdefense::redact_pii(&query_text).redacted_text;
    let wrapped_query = format!("{}{}{}", delimiters.open, pre_llm_query, delimiters.close);

    let prompt = PromptBuilder::build(&caller, &results, &delimiters.open, &delimiters.close);
    let mut stream = state.llm.stream(prompt, &caller, &servers_consulted, &wrapped_query).await;

    let mut cancelled = false;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                cancelled = true;
                break;
            }
            next = stream.next() => {
                match next {
                    Some(StreamEvent::TextDelta { text }) => {
                        let scanned = gateway_promptdefense::scan_leaks(&text, OutputPolicyMode::Redact)
                            .unwrap_or(text);
                        let redacted = gateway_promptdefense::redact_pii(&scanned).redacted_text;
                        let _ = tx.send(Emitted::Event(OrchestratorEvent::Text { text: redacted })).await;
                    }
                    Some(StreamEvent::Done { .. }) | None => break,
                    Some(StreamEvent::Error { message }) => {
                        let _ = tx.send(Emitted::Event(OrchestratorEvent::Error { message })).await;
                        break;
                    }
                }
            }
        }
    }

    if cancelled {
        return RunOutcome {
            servers_consulted,
            servers_denied,
            servers_failed,
            success: false,
            cancelled: true,
        };
    }

    // Stage 7 — trailing pagination metadata.
    let cursors: Vec<ServerCursor> = results
        .iter()
        .filter_map(|r| match &r.payload {
            Some(ToolResponse::Ok { metadata: Some(m), .. }) if m.has_more == Some(true) => {
                m.next_cursor.clone().map(|cursor| ServerCursor { server: r.server.clone(), cursor })
            }
            _ => None,
        })
        .collect();

    if !cursors.is_empty() {
        let _ = tx
            .send(Emitted::Event(OrchestratorEvent::Pagination {
                has_more: true,
                cursors,
                hint: "More results are available; ask to continue for further pages.".to_string(),
            }))
            .await;
    }

    RunOutcome {
        servers_consulted,
        servers_denied,
        servers_failed,
        success: true,
        cancelled: false,
    }
}
