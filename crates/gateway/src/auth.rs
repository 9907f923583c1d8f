//! 4.C Auth Gate. Resolves a `CallerContext` from the request's bearer token
//! (or, deprecated, a `token` query parameter), checking revocation before
//! the caller context is trusted by anything downstream.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use std::sync::Arc;
use tracing::warn;

use gateway_core::{CallerContext, GatewayError};

use crate::app::AppState;
use crate::error::ApiError;

pub struct AuthenticatedCaller(pub CallerContext);

impl<S> FromRequestParts<S> for AuthenticatedCaller
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = Arc::<AppState>::from_ref(state);
        let token = extract_token(parts)?;
        let caller = app.verifier.verify(&token).await?;

        if let Some(token_id) = &caller.token_id {
            if app.revocation.is_revoked(token_id) {
                return Err(ApiError(GatewayError::RevokedToken));
            }
        }

        Ok(AuthenticatedCaller(caller))
    }
}

/// `first-present(Authorization bearer, ?token=)`. Never logs the token
/// value itself — only that the deprecated path was used.
fn extract_token(parts: &Parts) -> Result<String, ApiError> {
    if let Some(header) = parts.headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(value) = header.to_str() {
            if let Some(bearer) = value.strip_prefix("Bearer ") {
                return Ok(bearer.to_string());
            }
        }
    }

    if let Some(query) = parts.uri.query() {
        for pair in query.split('&') {
            if let Some(value) = pair.strip_prefix("token=") {
                warn!("token supplied via deprecated query parameter");
                return Ok(value.to_string());
            }
        }
    }

    Err(ApiError(GatewayError::Unauthenticated))
}
