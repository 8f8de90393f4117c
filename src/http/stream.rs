//! MP3 response streaming
//!
//! The output artifact guard is moved into the response body, so the file
//! is removed once the body has been sent or dropped by a disconnecting
//! client.

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::Stream;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::config::AudioProfile;
use crate::error::{Result, ServerError};
use crate::naming::content_disposition;
use crate::scratch::TempArtifact;

pub const X_AUDIO_BITRATE: HeaderName = HeaderName::from_static("x-audio-bitrate");
pub const X_AUDIO_SAMPLE_RATE: HeaderName = HeaderName::from_static("x-audio-sample-rate");
pub const X_AUDIO_CHANNELS: HeaderName = HeaderName::from_static("x-audio-channels");

/// Body stream over a scratch file that owns the file's guard
pub struct ArtifactStream {
    inner: ReaderStream<File>,
    _artifact: TempArtifact,
    request_id: String,
    expected: u64,
    sent: u64,
    done: bool,
}

impl ArtifactStream {
    pub fn new(file: File, artifact: TempArtifact, expected: u64, request_id: String) -> Self {
        Self {
            inner: ReaderStream::new(file),
            _artifact: artifact,
            request_id,
            expected,
            sent: 0,
            done: false,
        }
    }
}

impl ArtifactStream {
    fn finish(&mut self) {
        if !self.done {
            self.done = true;
            debug!(request_id = %self.request_id, bytes = self.sent, "audio response sent");
        }
    }

    /// True when the body is dropped before all of the file went out
    fn interrupted(&self) -> bool {
        !self.done && self.sent < self.expected
    }
}

impl Stream for ArtifactStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.sent += chunk.len() as u64;
                // hyper stops polling once Content-Length bytes are out
                if this.sent >= this.expected {
                    this.finish();
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.done = true;
                warn!(
                    request_id = %this.request_id,
                    sent = this.sent,
                    error = %e,
                    "reading audio output failed mid-response"
                );
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ArtifactStream {
    fn drop(&mut self) {
        if self.interrupted() {
            info!(
                request_id = %self.request_id,
                sent = self.sent,
                expected = self.expected,
                "client went away before the audio was fully sent"
            );
        }
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ServerError::Internal(format!("invalid header value {:?}: {}", value, e)))
}

/// Build the `200 audio/mpeg` download response for a finished conversion
pub async fn audio_response(
    output: TempArtifact,
    display_name: &str,
    profile: &AudioProfile,
    request_id: &str,
) -> Result<Response> {
    let file = File::open(output.path())
        .await
        .map_err(ServerError::OpenOutput)?;
    let len = file.metadata().await.map_err(ServerError::OpenOutput)?.len();

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("audio/mpeg"));
    headers.insert(X_AUDIO_BITRATE, header_value(profile.bitrate.trim())?);
    headers.insert(X_AUDIO_SAMPLE_RATE, HeaderValue::from(profile.sample_rate));
    headers.insert(X_AUDIO_CHANNELS, HeaderValue::from(profile.channels));
    headers.insert(
        header::CONTENT_DISPOSITION,
        header_value(&content_disposition(display_name))?,
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));

    let body = Body::from_stream(ArtifactStream::new(
        file,
        output,
        len,
        request_id.to_string(),
    ));

    Ok((StatusCode::OK, headers, body).into_response())
}
