use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// GET /api/health — liveness probe. Deliberately minimal: no downstream
/// calls, so it stays answerable even while tool servers or the LLM provider
/// are unreachable.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": if state.lifecycle.is_draining() { "draining" } else { "ok" },
        "version": VERSION,
        "uptimeSecs": state.started_at.elapsed().as_secs(),
    }))
}
