//! HTTP exchange gateway.
//!
//! Serves the stateless exchange protocol on top of the session registry:
//! one POST per utterance, one bounded JSON reply.

pub mod api;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::signal;
use tower_http::limit::RequestBodyLimitLayer;

use crate::components::ComponentRegistry;
use crate::config::Config;
use crate::exchange::{ExchangeService, ExchangeSettings};

pub use api::GatewayError;

#[derive(Clone)]
pub struct AppState {
    pub exchange: ExchangeService,
}

pub fn create_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route(
            "/api/exchange/{component_id}/{session_id}",
            post(api::handle_exchange),
        )
        .route(
            "/exchange/{component_id}/{session_id}",
            post(api::handle_exchange),
        )
        .route("/api/config/{component_id}", get(api::handle_config))
        .route("/config/{component_id}", get(api::handle_config))
        .route("/health", get(api::handle_health))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .with_state(state)
}

/// Bind and serve until Ctrl+C or SIGTERM.
pub async fn run_gateway(config: &Config, components: Arc<ComponentRegistry>) -> Result<()> {
    let settings = ExchangeSettings::from(&config.exchange);
    let state = AppState {
        exchange: ExchangeService::new(components.clone(), settings),
    };
    let app = create_router(state, config.gateway.max_body_bytes);

    let ip: IpAddr = config
        .gateway
        .host
        .parse()
        .with_context(|| format!("Invalid gateway host: {}", config.gateway.host))?;
    let addr = SocketAddr::new(ip, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind gateway on {addr}"))?;

    tracing::info!(
        %addr,
        components = components.len(),
        turn_timeout = ?settings.turn_timeout,
        "exchange gateway listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("exchange gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
