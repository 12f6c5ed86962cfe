// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};
use kai_agent::Agent;
use kai_core::KaiError;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthConfig, MAX_BODY_BYTES, auth_middleware};
use crate::handlers;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub agent: Arc<Agent>,
    /// Background message handlers spawned by the webhook.
    pub tasks: TaskTracker,
    pub auth: AuthConfig,
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
}

impl GatewayState {
    pub fn new(agent: Arc<Agent>, auth: AuthConfig) -> Self {
        Self {
            agent,
            tasks: TaskTracker::new(),
            auth,
            start_time: std::time::Instant::now(),
        }
    }
}

/// Gateway server configuration (mirrors GatewayConfig from kai-config).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// How long shutdown waits for in-flight message handlers.
    pub drain_timeout: Duration,
}

/// Builds the router:
/// - GET /health (public)
/// - POST /v1/webhook (with auth)
/// - POST /v1/commands (with auth)
pub fn router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/webhook", post(handlers::post_webhook))
        .route("/v1/commands", post(handlers::post_command))
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serves the gateway until `shutdown` is cancelled, then waits up to
/// `drain_timeout` for spawned handlers.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), KaiError> {
    let tasks = state.tasks.clone();
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| KaiError::Transport {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("Gateway server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| KaiError::Transport {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    tasks.close();
    if tokio::time::timeout(config.drain_timeout, tasks.wait())
        .await
        .is_err()
    {
        tracing::warn!(remaining = tasks.len(), "message handlers still running at shutdown");
    }
    tracing::info!("gateway stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_debug() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            drain_timeout: Duration::from_secs(30),
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("127.0.0.1"));
    }
}
