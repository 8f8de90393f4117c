//! ffmpeg process supervision
//!
//! One child process per conversion. The child is killed when the deadline
//! passes, when the cancellation token fires, or when the awaiting future is
//! dropped (client went away), so no ffmpeg outlives its request.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use futures_util::stream::{self, StreamExt};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::command::mp3_args;
use super::TranscodeError;
use crate::config::{AudioProfile, ServerConfig};

/// Only the tail of ffmpeg's console output is kept for error reports
const MAX_CONSOLE_BYTES: usize = 64 * 1024;

/// Limit for the startup `-version` probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

enum Waited {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Runs ffmpeg with a fixed encoding profile and deadline
#[derive(Debug, Clone)]
pub struct Transcoder {
    ffmpeg_path: PathBuf,
    profile: AudioProfile,
    timeout: Duration,
}

impl Transcoder {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, profile: AudioProfile, timeout: Duration) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            profile,
            timeout,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.ffmpeg_path.clone(),
            config.audio.clone(),
            config.transcode_timeout(),
        )
    }

    pub fn profile(&self) -> &AudioProfile {
        &self.profile
    }

    #[cfg(test)]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Extract the audio of `source` into `output` as MP3.
    ///
    /// Returns once ffmpeg has exited or has been killed and reaped.
    pub async fn extract_mp3(
        &self,
        source: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), TranscodeError> {
        let start = Instant::now();

        let mut child = Command::new(&self.ffmpeg_path)
            .args(mp3_args(source, output, &self.profile))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TranscodeError::Spawn {
                program: self.ffmpeg_path.display().to_string(),
                source,
            })?;

        debug!(
            pid = child.id(),
            source = %source.display(),
            output = %output.display(),
            "ffmpeg started"
        );

        let stdout = child.stdout.take().map(ReaderStream::new);
        let stderr = child.stderr.take().map(ReaderStream::new);
        let console = tokio::spawn(collect_console(stdout, stderr));

        let waited = tokio::select! {
            status = child.wait() => Waited::Exited(status),
            _ = tokio::time::sleep(self.timeout) => Waited::TimedOut,
            _ = cancel.cancelled() => Waited::Cancelled,
        };

        match waited {
            Waited::Exited(Ok(status)) => {
                let output = console.await.unwrap_or_default();
                let elapsed = start.elapsed();
                if status.success() {
                    debug!(elapsed_ms = elapsed.as_millis() as u64, "ffmpeg finished");
                    Ok(())
                } else {
                    let detail = failure_detail(&output, status);
                    warn!(%status, elapsed_ms = elapsed.as_millis() as u64, "ffmpeg failed");
                    Err(TranscodeError::Failed { detail })
                }
            }
            Waited::Exited(Err(e)) => {
                terminate(&mut child).await;
                console.abort();
                Err(TranscodeError::Wait(e))
            }
            Waited::TimedOut => {
                terminate(&mut child).await;
                console.abort();
                warn!(timeout_secs = self.timeout.as_secs(), "ffmpeg timed out, killed");
                Err(TranscodeError::TimedOut(self.timeout))
            }
            Waited::Cancelled => {
                terminate(&mut child).await;
                console.abort();
                debug!("ffmpeg cancelled, killed");
                Err(TranscodeError::Cancelled)
            }
        }
    }
}

/// Kill and reap the child
async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!(error = %e, "failed to kill ffmpeg");
    }
}

/// Interleave stdout and stderr in arrival order, keeping the last
/// `MAX_CONSOLE_BYTES`.
async fn collect_console(
    stdout: Option<ReaderStream<ChildStdout>>,
    stderr: Option<ReaderStream<ChildStderr>>,
) -> Vec<u8> {
    let merged = stream::select(
        stream::iter(stdout).flatten(),
        stream::iter(stderr).flatten(),
    );
    tokio::pin!(merged);

    let mut buf = Vec::new();
    while let Some(chunk) = merged.next().await {
        match chunk {
            Ok(bytes) => {
                buf.extend_from_slice(&bytes);
                if buf.len() > MAX_CONSOLE_BYTES {
                    let excess = buf.len() - MAX_CONSOLE_BYTES;
                    buf.drain(..excess);
                }
            }
            Err(e) => {
                debug!(error = %e, "ffmpeg console read failed");
                break;
            }
        }
    }
    buf
}

fn failure_detail(console: &[u8], status: ExitStatus) -> String {
    let text = String::from_utf8_lossy(console);
    let text = text.trim();
    if text.is_empty() {
        status.to_string()
    } else {
        text.to_string()
    }
}

/// First line of `ffmpeg -version`, or `None` if it cannot be run
pub async fn probe_version(ffmpeg_path: &Path) -> Option<String> {
    let output = tokio::time::timeout(
        PROBE_TIMEOUT,
        Command::new(ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .ok()?
    .ok()?;

    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|line| line.trim().to_string())
}
