use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Authenticated caller identity, produced by the token verifier and
/// consumed everywhere downstream. Immutable for the lifetime of a request.
#[derive(Debug, Clone, Serialize)]
pub struct CallerContext {
    /// Stable opaque id (the token's `sub` claim).
    pub user_id: String,
    pub username: String,
    /// Empty string, never absent — callers can match on `.is_empty()`.
    pub email: String,
    /// Deduplicated union of realm-scoped and client-scoped roles.
    pub roles: HashSet<String>,
    /// Ordered as presented by the token; order carries no policy meaning.
    pub groups: Vec<String>,
    pub department_code: Option<String>,
    /// The token's unique identifier (`jti`), when present. Tokens without
    /// one skip the revocation check — see RevocationStore.
    pub token_id: Option<String>,
}

impl CallerContext {
    pub fn has_any_role(&self, required: &HashSet<String>) -> bool {
        self.roles.intersection(required).next().is_some()
    }
}

/// Static, read-only tool-server configuration entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServer {
    pub name: String,
    pub endpoint: String,
    pub required_roles: HashSet<String>,
    #[serde(default)]
    pub description: String,
}

/// Per-server envelope returned by the tool client.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub server: String,
    pub status: ToolStatus,
    pub payload: Option<ToolResponse>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Ok,
    Timeout,
    Error,
}

/// The payload shape a tool server returns, discriminated by `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ToolResponse {
    #[serde(rename = "ok")]
    Ok {
        data: serde_json::Value,
        #[serde(default)]
        metadata: Option<ToolMetadata>,
    },
    #[serde(rename = "error")]
    Error {
        code: String,
        message: String,
        #[serde(default)]
        suggested_action: Option<String>,
    },
    #[serde(rename = "pendingConfirmation")]
    PendingConfirmation {
        confirmation_id: String,
        message: String,
        action: String,
        data: serde_json::Value,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMetadata {
    #[serde(default)]
    pub has_more: Option<bool>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub truncated: Option<bool>,
    #[serde(default)]
    pub returned_count: Option<u64>,
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub pages_retrieved: Option<u32>,
}

/// A pending write, cached by the confirmation store between propose and commit.
/// `extra` carries action-specific fields that are opaque to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationEnvelope {
    pub confirmation_id: String,
    pub action: String,
    pub mcp_server: String,
    pub user_id: String,
    pub created_at: i64,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}
