//! Audio Extraction Server
//!
//! An HTTP service that takes an uploaded media file, or a server-side
//! default when none is uploaded, runs ffmpeg over it and streams back the
//! audio track as an MP3 download. Every request works in its own scratch
//! files, which are removed however the request ends.

mod config;
mod error;
mod http;
#[cfg(test)]
mod integration;
mod naming;
mod scratch;
mod state;
mod transcode;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::http::{create_router, serve, HEADER_READ_TIMEOUT};
use crate::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "audio-extract-server";

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration: defaults, then the optional file, then the environment
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let (config, config_error) = if Path::new(&config_path).exists() {
        match ServerConfig::from_file(&config_path) {
            Ok(cf) => (cf, None),
            Err(e) => (ServerConfig::default(), Some(e.to_string())),
        }
    } else {
        (ServerConfig::default(), None)
    };
    let config = config.with_env();

    // Initialize logging
    init_logging(&config.log_format);

    if let Some(e) = config_error {
        tracing::warn!(
            "Failed to load config file {}: {}. Using defaults.",
            config_path,
            e
        );
    }

    tracing::info!("{} v{} starting", APP_NAME, VERSION);
    tracing::info!("Configuration loaded: {:?}", config);

    match transcode::probe_version(&config.ffmpeg_path).await {
        Some(version) => tracing::info!("FFmpeg version: {}", version),
        None => tracing::warn!(
            ffmpeg = %config.ffmpeg_path.display(),
            "ffmpeg is not runnable; conversions will fail until it is installed"
        ),
    }

    // Create application state
    let state = Arc::new(AppState::new(config.clone()));
    state.scratch.ensure()?;
    tracing::info!(dir = %state.scratch.root().display(), "scratch directory ready");

    // Build router
    let app = create_router(state.clone());

    // Start server
    let addr: SocketAddr = config
        .socket_addr()
        .parse()
        .map_err(|e| ServerError::Config(format!("invalid listen address {:?}: {}", config.listen_addr, e)))?;
    tracing::info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tokio::spawn(shutdown_signal(state.shutdown.clone()));
    serve(listener, app, HEADER_READ_TIMEOUT, state.shutdown.clone()).await;

    tracing::info!("server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM and cancels every running conversion
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown requested, stopping running conversions");
    token.cancel();
}

/// Initialize logging with tracing
fn init_logging(format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "audio_extract_server=debug,tower_http=debug".into());

    if format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
