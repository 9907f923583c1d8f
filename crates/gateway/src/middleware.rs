//! General rate-limit layer (4.M). Runs ahead of authentication, so it keys
//! on the connecting IP rather than `caller.userId` — the per-caller query
//! bucket is enforced separately, inside the query handlers, once identity
//! is known.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use gateway_ratelimit::RateLimitBucket;

use crate::app::AppState;
use crate::error::too_many_requests;

pub async fn general_rate_limit(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if !state.rate_limiter.check(RateLimitBucket::General, &addr.ip().to_string()) {
        return too_many_requests();
    }
    next.run(request).await
}
