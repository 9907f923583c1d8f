use thiserror::Error;

/// Failure modes of [`crate::verifier::TokenVerifier::verify`]. Kept separate
/// from `GatewayError` so the gateway binary maps each variant to its own
/// response shape instead of collapsing them into one generic 401.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed token")]
    Malformed,

    #[error("signature verification failed")]
    BadSignature,

    #[error("token expired")]
    Expired,

    #[error("issuer not in accepted set")]
    IssuerMismatch,

    #[error("audience not accepted")]
    AudienceMismatch,

    #[error("signing key not found for kid {0}")]
    KeyNotFound(String),

    #[error("jwks fetch failed: {0}")]
    JwksFetch(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;
