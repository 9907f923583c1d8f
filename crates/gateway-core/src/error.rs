use thiserror::Error;

/// The error kinds named in the request-handling design (§7). Every
/// transport layer maps these to its own status codes; this enum carries no
/// knowledge of HTTP itself.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("no bearer token presented")]
    Unauthenticated,

    #[error("caller lacks a required role for {server}")]
    Unauthorised { server: String },

    #[error("token has been revoked")]
    RevokedToken,

    #[error("prompt rejected by {layer}: {reason}")]
    PromptRejected { layer: String, reason: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("confirmation not found or expired")]
    ConfirmationExpired,

    #[error("confirmation owner mismatch")]
    ConfirmationOwnerMismatch,

    #[error("tool server timeout: {0}")]
    UpstreamTimeout(String),

    #[error("tool server error: {0}")]
    UpstreamError(String),

    #[error("LLM provider error: {0}")]
    ProviderError(String),

    #[error("output policy violation: {0}")]
    OutputPolicy(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Short machine-readable code, mirrored into JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Config(_) => "CONFIG_ERROR",
            GatewayError::Unauthenticated => "UNAUTHENTICATED",
            GatewayError::Unauthorised { .. } => "UNAUTHORISED",
            GatewayError::RevokedToken => "REVOKED_TOKEN",
            GatewayError::PromptRejected { .. } => "PROMPT_REJECTED",
            GatewayError::Validation(_) => "VALIDATION_ERROR",
            GatewayError::ConfirmationExpired => "CONFIRMATION_EXPIRED",
            GatewayError::ConfirmationOwnerMismatch => "CONFIRMATION_OWNER_MISMATCH",
            GatewayError::UpstreamTimeout(_) => "UPSTREAM_TIMEOUT",
            GatewayError::UpstreamError(_) => "UPSTREAM_ERROR",
            GatewayError::ProviderError(_) => "PROVIDER_ERROR",
            GatewayError::OutputPolicy(_) => "OUTPUT_POLICY",
            GatewayError::Serialization(_) => "SERIALIZATION_ERROR",
            GatewayError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
