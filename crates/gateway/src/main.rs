use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info, warn};

use gateway::{app, lifecycle};
use gateway_core::GatewayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gateway=info,tower_http=info".into()),
        )
        .init();

    let config_path = std::env::var("GATEWAY_CONFIG").ok();
    let config = match GatewayConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("configuration load failed: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = validate_startup(&config).await {
        error!("startup validation failed: {e}");
        std::process::exit(1);
    }

    let bind = config.server.bind.clone();
    let port = config.server.port;

    let state = Arc::new(app::AppState::new(config));
    let router = app::build_router(Arc::clone(&state));

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("gateway listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(Arc::clone(&state)))
    .await?;

    Ok(())
}

/// Validates the JWKS endpoint is reachable and the tool-server list is
/// non-empty before ever binding the listener, in any non-mock deployment.
/// Mock mode (used by tests and local development) skips both checks since
/// neither a real identity provider nor real tool servers are expected to
/// exist.
async fn validate_startup(config: &GatewayConfig) -> anyhow::Result<()> {
    if config.is_mock_mode() {
        warn!("LLM credential has the mock-mode prefix; skipping startup reachability checks");
        return Ok(());
    }

    if config.tool_servers.is_empty() {
        anyhow::bail!("no tool servers configured");
    }

    let jwks = gateway_auth::JwksCache::new(config.auth.jwks_url.clone(), config.auth.jwks_cache_secs);
    jwks.get().await.map_err(|e| anyhow::anyhow!("jwks endpoint unreachable: {e}"))?;

    Ok(())
}

/// Waits for a termination signal, then drains in-flight streams (bounded by
/// `lifecycle.drain_timeout_secs`) before `axum::serve` returns. A drain
/// timeout still lets shutdown proceed — the connections are simply cut —
/// but it is logged loudly since that is a client-visible broken stream.
async fn shutdown_signal(state: Arc<app::AppState>) {
    lifecycle::wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining in-flight streams");

    if !state.lifecycle.drain().await {
        error!("drain timeout exceeded, forcing shutdown with streams still active");
    }
}
