use serde::Serialize;
use tracing::info;

/// One audit record per completed request (§4.J). Persistence is delegated —
/// this crate only defines the shape and an in-process sink; a deployment
/// wanting durable audit storage swaps in its own `AuditSink`.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub timestamp: String,
    pub request_id: String,
    pub user_id: String,
    pub username: String,
    pub roles: Vec<String>,
    pub query_redacted_to_first_100: String,
    pub servers_consulted: Vec<String>,
    pub servers_denied: Vec<String>,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, record: &AuditRecord);
}

/// Default sink: structured `tracing` event at info level. Good enough for a
/// deployment shipping logs to a collector; nothing here assumes a database.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, record: &AuditRecord) {
        info!(
            request_id = %record.request_id,
            user_id = %record.user_id,
            username = %record.username,
            roles = ?record.roles,
            servers_consulted = ?record.servers_consulted,
            servers_denied = ?record.servers_denied,
            success = record.success,
            duration_ms = record.duration_ms,
            "query audit record"
        );
    }
}
