//! Server configuration
//!
//! Built once at startup from defaults, an optional TOML file and the
//! process environment, then shared read-only by every request.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// MP3 encoding profile applied to every conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioProfile {
    /// Target bitrate, passed to the encoder verbatim (e.g. "96k")
    pub bitrate: String,

    /// Output sample rate in Hz
    pub sample_rate: u32,

    /// Output channel count, forced regardless of the source layout
    pub channels: u32,
}

impl Default for AudioProfile {
    fn default() -> Self {
        Self {
            bitrate: "96k".to_string(),
            sample_rate: 44100,
            channels: 2,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address; a bare ":port" binds all interfaces
    pub listen_addr: String,

    /// Maximum request body size in megabytes
    pub max_upload_mb: u64,

    /// Wall-clock limit for a single ffmpeg run in seconds
    pub timeout_secs: u64,

    /// Directory for per-request upload and output files
    pub scratch_dir: PathBuf,

    /// ffmpeg executable (looked up in PATH when not absolute)
    pub ffmpeg_path: PathBuf,

    /// Media file converted when a request carries no upload
    pub default_media_path: PathBuf,

    /// Log output format (pretty, json)
    pub log_format: String,

    /// Encoding profile
    pub audio: AudioProfile,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: ":3003".to_string(),
            max_upload_mb: 2048,
            timeout_secs: 1800, // 30 minutes
            scratch_dir: std::env::temp_dir(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            default_media_path: PathBuf::from("/opt/video-audio/default.mp4"),
            log_format: "pretty".to_string(),
            audio: AudioProfile::default(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        if self.listen_addr.starts_with(':') {
            format!("0.0.0.0{}", self.listen_addr)
        } else {
            self.listen_addr.clone()
        }
    }

    /// Get maximum upload size in bytes
    pub fn max_upload_bytes(&self) -> usize {
        (self.max_upload_mb as usize).saturating_mul(1024 * 1024)
    }

    pub fn transcode_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ServerConfig = toml::from_str(&content)?;
        Ok(config.normalized())
    }

    /// Apply environment overrides on top of `self`
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`. Empty, unparsable or non-positive
    /// values leave the current setting untouched.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = text("ADDR") {
            self.listen_addr = v;
        }
        if let Some(v) = positive(text("MAX_UPLOAD_MB")) {
            self.max_upload_mb = v;
        }
        if let Some(v) = positive(text("FFMPEG_TIMEOUT_SEC")) {
            self.timeout_secs = v;
        }
        if let Some(v) = text("TMP_DIR") {
            self.scratch_dir = PathBuf::from(v);
        }
        if let Some(v) = text("FFMPEG_PATH") {
            self.ffmpeg_path = PathBuf::from(v);
        }
        if let Some(v) = text("MP3_BITRATE") {
            self.audio.bitrate = v;
        }
        if let Some(v) = positive(text("MP3_SAMPLE_RATE")) {
            self.audio.sample_rate = v;
        }
        if let Some(v) = positive(text("MP3_CHANNELS")) {
            self.audio.channels = v;
        }
        if let Some(v) = text("DEFAULT_VIDEO_PATH") {
            self.default_media_path = PathBuf::from(v);
        }
        if let Some(v) = text("LOG_FORMAT") {
            self.log_format = v.to_ascii_lowercase();
        }

        self
    }

    /// Replace zero or blank values (e.g. from a config file) with defaults
    fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if self.listen_addr.trim().is_empty() {
            self.listen_addr = defaults.listen_addr;
        }
        if self.max_upload_mb == 0 {
            self.max_upload_mb = defaults.max_upload_mb;
        }
        if self.timeout_secs == 0 {
            self.timeout_secs = defaults.timeout_secs;
        }
        if self.audio.bitrate.trim().is_empty() {
            self.audio.bitrate = defaults.audio.bitrate;
        }
        if self.audio.sample_rate == 0 {
            self.audio.sample_rate = defaults.audio.sample_rate;
        }
        if self.audio.channels == 0 {
            self.audio.channels = defaults.audio.channels;
        }
        self
    }
}

fn positive<T: TryFrom<i64>>(value: Option<String>) -> Option<T> {
    value?
        .parse::<i64>()
        .ok()
        .filter(|n| *n > 0)
        .and_then(|n| T::try_from(n).ok())
}
