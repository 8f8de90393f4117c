//! HTTP request handlers
//!
//! Implements the health check and the audio extraction endpoint.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::Method;
use axum::response::Response;
use tracing::{error, info, info_span, warn, Instrument};

use super::input::resolve_source;
use super::stream::audio_response;
use crate::error::{Result, ServerError};
use crate::scratch::{new_request_id, ArtifactKind};
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Audio extraction endpoint
/// POST /extract-audio
///
/// Responds 405 to any other method before touching the scratch directory.
pub async fn extract_audio(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response> {
    if request.method() != Method::POST {
        return Err(ServerError::MethodNotAllowed);
    }

    let request_id = new_request_id();
    let span = info_span!("extract_audio", request_id = %request_id);
    let result = convert(&state, &request_id, request).instrument(span).await;

    if let Err(e) = &result {
        if e.status().is_server_error() {
            error!(request_id = %request_id, error = %e, "conversion failed");
        } else {
            warn!(request_id = %request_id, error = %e, "conversion rejected");
        }
    }
    result
}

/// One conversion, from request body to streaming response.
///
/// Every scratch file is owned by a guard created before the file is, so
/// each `?` below leaves nothing behind. The output guard is handed to the
/// response body; the upload guard is dropped when this returns.
async fn convert(state: &AppState, request_id: &str, request: Request) -> Result<Response> {
    let resolved = resolve_source(state, request_id, request).await?;

    let output = state
        .scratch
        .allocate(ArtifactKind::Audio, request_id, None);

    let cancel = state.shutdown.child_token();
    let started = Instant::now();
    if let Err(e) = state
        .transcoder
        .extract_mp3(resolved.source.path(), output.path(), &cancel)
        .await
    {
        if e.is_interrupted() {
            warn!(error = %e, "ffmpeg stopped before finishing");
        }
        return Err(e.into());
    }

    info!(
        source = %resolved.source.path().display(),
        uploaded = resolved.source.is_upload(),
        download_name = %resolved.display_name,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "audio extracted"
    );

    audio_response(
        output,
        &resolved.display_name,
        state.transcoder.profile(),
        request_id,
    )
    .await
}
