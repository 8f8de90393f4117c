//! Audio transcoding module
//!
//! Audio extraction is delegated to an external ffmpeg process:
//! - Command line construction from the encoding profile
//! - Process supervision with a deadline and cancellation
//! - Capture of ffmpeg's console output for error reporting

pub mod command;
pub mod runner;

use std::io;
use std::time::Duration;
use thiserror::Error;

pub use runner::{probe_version, Transcoder};

/// Outcome of a failed ffmpeg run
#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("cancelled")]
    Cancelled,

    /// ffmpeg exited non-zero; `detail` is its trimmed console output
    #[error("{detail}")]
    Failed { detail: String },

    #[error("wait failed: {0}")]
    Wait(#[source] io::Error),
}

impl TranscodeError {
    /// True when ffmpeg was stopped by us rather than failing on its own
    pub fn is_interrupted(&self) -> bool {
        matches!(self, TranscodeError::TimedOut(_) | TranscodeError::Cancelled)
    }
}
