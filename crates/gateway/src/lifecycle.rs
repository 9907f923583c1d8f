//! 4.L Lifecycle Manager — tracks in-flight streams so shutdown can drain
//! them instead of cutting connections mid-response.
//!
//! Grounded on the teacher's `/stop` emergency-stop sequence: a registry of
//! cancellation tokens keyed by an id, cancelled and cleared on signal. Here
//! the registry is driven by process shutdown rather than a user command, and
//! draining waits (bounded) instead of firing and forgetting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct Lifecycle {
    active_streams: DashMap<String, CancellationToken>,
    draining: AtomicBool,
    drain_timeout: Duration,
}

impl Lifecycle {
    pub fn new(drain_timeout_secs: u64) -> Self {
        Self {
            active_streams: DashMap::new(),
            draining: AtomicBool::new(false),
            drain_timeout: Duration::from_secs(drain_timeout_secs),
        }
    }

    /// `true` once drain has begun; new requests should be rejected.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    pub fn register_stream(&self, request_id: String, token: CancellationToken) {
        self.active_streams.insert(request_id, token);
    }

    pub fn unregister_stream(&self, request_id: &str) {
        self.active_streams.remove(request_id);
    }

    /// Cancel every registered stream's token and wait (bounded) for the
    /// registry to drain as each stream notices cancellation and deregisters
    /// itself. Returns `true` if draining completed cleanly, `false` if the
    /// timeout fired first (caller should force-exit).
    pub async fn drain(&self) -> bool {
        self.draining.store(true, Ordering::Release);

        let ids: Vec<String> = self
            .active_streams
            .iter()
            .map(|e| e.key().clone())
            .collect();
        info!(count = ids.len(), "lifecycle drain: cancelling active streams");
        for entry in self.active_streams.iter() {
            entry.value().cancel();
        }

        let deadline = tokio::time::Instant::now() + self.drain_timeout;
        while !self.active_streams.is_empty() {
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    remaining = self.active_streams.len(),
                    "drain timeout exceeded, forcing exit"
                );
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        info!("drain complete, all streams closed");
        true
    }
}

/// Resolves when the process receives a termination signal (SIGINT on all
/// platforms; SIGTERM too on unix).
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
