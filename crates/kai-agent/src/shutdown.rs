// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Graceful shutdown coordination with signal handling.
//!
//! Installs handlers for SIGTERM and SIGINT (Ctrl+C), triggering a
//! [`CancellationToken`] that the server monitors. Live response handlers
//! are drained before the process exits.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::stop::StopRegistry;

/// Polling interval while draining handlers.
const DRAIN_POLL: Duration = Duration::from_millis(50);

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] that is cancelled when either signal is received.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {
                            info!("received SIGINT (Ctrl+C), initiating shutdown");
                        }
                        _ = sigterm.recv() => {
                            info!("received SIGTERM, initiating shutdown");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "cannot install SIGTERM handler, waiting for Ctrl+C only");
                    let _ = ctrl_c.await;
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

/// Waits up to `timeout` for every live handler to finish.
///
/// Returns the number of handlers still running when the wait ended.
pub async fn drain_handlers(stops: &StopRegistry, timeout: Duration) -> usize {
    let live = stops.live();
    if live == 0 {
        info!("no active handlers to drain");
        return 0;
    }
    info!(count = live, "waiting for active handlers to complete");

    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if stops.live() == 0 {
            info!("all handlers drained");
            return 0;
        }
        tokio::time::sleep(DRAIN_POLL).await;
    }

    let remaining = stops.live();
    if remaining > 0 {
        warn!(remaining, "timeout reached, cancelling remaining handlers");
        stops.cancel_all();
    }
    remaining
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn install_signal_handler_returns_token() {
        let token = install_signal_handler();
        assert!(!token.is_cancelled());
        token.cancel();
    }

    #[tokio::test]
    async fn drain_without_handlers_returns_immediately() {
        let stops = StopRegistry::new();
        assert_eq!(drain_handlers(&stops, Duration::from_secs(30)).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_waits_for_guards_to_drop() {
        let stops = StopRegistry::new();
        let guard = stops.register("kai-u1");
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            drop(guard);
        });
        assert_eq!(drain_handlers(&stops, Duration::from_secs(5)).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_timeout_cancels_stragglers() {
        let stops = StopRegistry::new();
        let guard = stops.register("kai-u1");
        assert_eq!(drain_handlers(&stops, Duration::from_millis(200)).await, 1);
        assert!(guard.token().is_cancelled());
    }
}
