//! Gesture Scoreboard Server - scoreboard with thumbs-up scoring
//!
//! This is the main entry point for the server. It handles:
//! - WebSocket connections for score buttons, gestures and pose frames
//! - HTTP endpoints for creating sessions and applying events
//! - Serving the scoreboard page

mod app;
mod config;
mod http;
mod scoring;
mod util;
mod ws;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::http::build_router;
use crate::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Gesture Scoreboard Server");
    log_scoring_config(&config);

    let state = AppState::new(config.clone());
    let sessions = state.sessions.clone();
    let router = build_router(state);

    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Scoreboard page: http://{}/", addr);
    info!("New scoreboard: ws://{}/ws", addr);
    info!("Join scoreboard: ws://{}/ws?session_id=<id>", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(
        open_sessions = sessions.active_sessions(),
        connected_clients = sessions.total_connections(),
        "Server shutdown complete"
    );
    Ok(())
}

/// Report the scoring knobs and whether the page can be served
fn log_scoring_config(config: &Config) {
    info!(
        cooldown_ms = config.gesture_cooldown_ms,
        input_rate_limit = config.input_rate_limit,
        max_sessions = config.max_sessions,
        session_idle_secs = config.session_idle_timeout.as_secs(),
        "Scoring configuration"
    );

    if config.static_dir.is_dir() {
        info!(static_dir = %config.static_dir.display(), "Serving scoreboard page");
    } else {
        warn!(
            static_dir = %config.static_dir.display(),
            "Static directory missing, only the API and WebSocket are served"
        );
    }
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Resolve on Ctrl+C or SIGTERM so open scoreboards can say goodbye
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting graceful shutdown"),
        _ = terminate => info!("Received terminate signal, starting graceful shutdown"),
    }
}
