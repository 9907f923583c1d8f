use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use gateway_auth::AuthError;
use gateway_core::GatewayError;
use gateway_promptdefense::PromptRejection;

/// Top-level error wrapper so every handler can `?`-propagate straight to the
/// status codes in the error handling design, instead of matching
/// `GatewayError` at every call site.
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        ApiError(e)
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        let mapped = match e {
            AuthError::Malformed | AuthError::BadSignature | AuthError::AudienceMismatch
            | AuthError::IssuerMismatch | AuthError::KeyNotFound(_) | AuthError::JwksFetch(_) => {
                GatewayError::Unauthenticated
            }
            AuthError::Expired => GatewayError::Unauthenticated,
        };
        ApiError(mapped)
    }
}

impl From<PromptRejection> for ApiError {
    fn from(r: PromptRejection) -> Self {
        ApiError(GatewayError::PromptRejected {
            layer: r.layer.to_string(),
            reason: r.reason,
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GatewayError::Unauthenticated | GatewayError::RevokedToken => StatusCode::UNAUTHORIZED,
            GatewayError::Unauthorised { .. } => StatusCode::FORBIDDEN,
            GatewayError::PromptRejected { .. } | GatewayError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::ConfirmationExpired => StatusCode::NOT_FOUND,
            GatewayError::ConfirmationOwnerMismatch => StatusCode::FORBIDDEN,
            GatewayError::Config(_)
            | GatewayError::UpstreamTimeout(_)
            | GatewayError::UpstreamError(_)
            | GatewayError::ProviderError(_)
            | GatewayError::OutputPolicy(_)
            | GatewayError::Serialization(_)
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, code = self.0.code(), "internal error");
            return (
                status,
                axum::Json(json!({ "error": "internal error", "code": "INTERNAL_ERROR" })),
            )
                .into_response();
        }

        let body = match &self.0 {
            GatewayError::PromptRejected { layer, reason } => json!({
                "error": self.0.to_string(),
                "code": self.0.code(),
                "layer": layer,
                "reason": reason,
            }),
            _ => json!({ "error": self.0.to_string(), "code": self.0.code() }),
        };

        (status, axum::Json(body)).into_response()
    }
}

/// 4.M Rate Limiter rejection. Not a `GatewayError` variant — rate limiting
/// is enforced ahead of any handler logic, and 429 has no other callers.
pub fn too_many_requests() -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        axum::Json(json!({ "error": "rate limit exceeded", "code": "RATE_LIMITED" })),
    )
        .into_response()
}
