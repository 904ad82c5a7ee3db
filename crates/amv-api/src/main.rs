mod config;
mod dto;
mod error;
mod request_log;
mod routes;
mod shutdown;
mod state;

use std::sync::Arc;

use amv_core::config::AmvConfig;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::routes::api_router;
use crate::shutdown::ShutdownContext;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    let amv = AmvConfig::from_env().expect("invalid AMV configuration");

    let coordinator = Arc::new(amv_core::build_coordinator(&amv));
    if coordinator.is_panel_reachable().await {
        tracing::info!(panel = %amv.panel.url, "panel reachable");
    } else {
        tracing::warn!(panel = %amv.panel.url, "panel not reachable at startup");
    }

    let cleanup = ShutdownContext::new(coordinator.clone());
    let state = AppState { coordinator };

    let app = api_router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .expect("failed to bind listener");

    tracing::info!(addr = %config.listen_addr, "starting AMV API");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::signal())
        .await
        .expect("server error");

    cleanup.run().await;
}
