//! Application state
//!
//! Everything here is built before the router starts and never mutated
//! afterwards; requests only read it.

use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::scratch::ScratchDir;
use crate::transcode::Transcoder;

/// Application state shared across all handlers
pub struct AppState {
    /// Scratch directory for uploads and outputs
    pub scratch: ScratchDir,

    /// ffmpeg runner with the active encoding profile
    pub transcoder: Transcoder,

    /// Cancelled on server shutdown; each conversion runs under a child token
    pub shutdown: CancellationToken,

    /// Server configuration
    pub config: ServerConfig,
}

impl AppState {
    /// Create a new AppState with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self {
            scratch: ScratchDir::new(config.scratch_dir.clone()),
            transcoder: Transcoder::from_config(&config),
            shutdown: CancellationToken::new(),
            config,
        }
    }

    /// Create AppState with default configuration
    #[cfg(test)]
    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }
}
