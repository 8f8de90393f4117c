//! Source resolution
//!
//! Decides where the audio comes from for one request: a multipart upload
//! written to the scratch directory, or the server's default media file.

use std::path::{Path, PathBuf};

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{Result, ServerError};
use crate::naming::display_name;
use crate::scratch::{ArtifactKind, TempArtifact};
use crate::state::AppState;

/// Where the audio for a request is read from
#[derive(Debug)]
pub enum SourceRef {
    /// Uploaded file in the scratch directory, deleted with the guard
    Upload(TempArtifact),
    /// Shared default media file, never deleted
    Default(PathBuf),
}

impl SourceRef {
    pub fn path(&self) -> &Path {
        match self {
            SourceRef::Upload(artifact) => artifact.path(),
            SourceRef::Default(path) => path,
        }
    }

    pub fn is_upload(&self) -> bool {
        matches!(self, SourceRef::Upload(_))
    }
}

/// Resolved input plus the name offered for download
#[derive(Debug)]
pub struct ResolvedSource {
    pub source: SourceRef,
    pub display_name: String,
}

struct Upload {
    artifact: TempArtifact,
    original_name: String,
}

/// Resolve the audio source for `request`.
///
/// A multipart body without a `file` part is not an error: the request
/// falls back to the default media file, like a request with no body.
pub async fn resolve_source(
    state: &AppState,
    request_id: &str,
    request: Request,
) -> Result<ResolvedSource> {
    let limit = state.config.max_upload_bytes();
    check_declared_length(request.headers(), limit)?;

    let query_hint = name_from_query(request.uri());
    let content_type = content_type(request.headers());

    let (upload, form_hint) = if content_type.starts_with("multipart/form-data") {
        read_multipart(state, request_id, request).await?
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        (None, name_from_form(request, limit).await)
    } else {
        (None, None)
    };

    let hint = query_hint.or(form_hint);
    let default_media = &state.config.default_media_path;

    match upload {
        Some(upload) => {
            let display_name = display_name(
                hint.as_deref(),
                Some(&upload.original_name),
                default_media,
            );
            Ok(ResolvedSource {
                source: SourceRef::Upload(upload.artifact),
                display_name,
            })
        }
        None => {
            ensure_default_media(default_media).await?;
            debug!(path = %default_media.display(), "no upload, using default media");
            Ok(ResolvedSource {
                source: SourceRef::Default(default_media.clone()),
                display_name: display_name(hint.as_deref(), None, default_media),
            })
        }
    }
}

fn content_type(headers: &HeaderMap) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Reject bodies whose declared length is over the limit before anything
/// is written to disk
fn check_declared_length(headers: &HeaderMap, limit: usize) -> Result<()> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    match declared {
        Some(len) if len > limit as u64 => Err(ServerError::PayloadTooLarge { limit }),
        _ => Ok(()),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn first_name_pair(pairs: Vec<(String, String)>) -> Option<String> {
    pairs
        .into_iter()
        .find(|(key, _)| key == "name")
        .and_then(|(_, value)| non_empty(&value))
}

fn name_from_query(uri: &Uri) -> Option<String> {
    let pairs = serde_urlencoded::from_str::<Vec<(String, String)>>(uri.query()?).ok()?;
    first_name_pair(pairs)
}

/// `name` from a urlencoded body. Unreadable bodies are ignored.
async fn name_from_form(request: Request, limit: usize) -> Option<String> {
    let bytes = match axum::body::to_bytes(request.into_body(), limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "ignoring unreadable form body");
            return None;
        }
    };
    let pairs = serde_urlencoded::from_bytes::<Vec<(String, String)>>(&bytes).ok()?;
    first_name_pair(pairs)
}

fn multipart_error(err: MultipartError, limit: usize) -> ServerError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ServerError::PayloadTooLarge { limit };
    }
    ServerError::Multipart(err.body_text())
}

async fn read_multipart(
    state: &AppState,
    request_id: &str,
    request: Request,
) -> Result<(Option<Upload>, Option<String>)> {
    let limit = state.config.max_upload_bytes();
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| ServerError::Multipart(e.body_text()))?;

    let mut upload: Option<Upload> = None;
    let mut name_hint: Option<String> = None;
    let mut name_seen = false;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        let field_name = field.name().map(str::to_owned);
        match field_name.as_deref() {
            Some("file") if upload.is_none() && field.file_name().is_some_and(|n| !n.is_empty()) => {
                let original_name = field.file_name().unwrap_or_default().to_string();
                // Guard first: a failed write below still removes the partial file.
                let artifact =
                    state
                        .scratch
                        .allocate(ArtifactKind::Upload, request_id, Some(&original_name));
                let size = save_field(&mut field, artifact.path(), limit).await?;
                info!(
                    original_name = %original_name,
                    path = %artifact.path().display(),
                    size_bytes = size,
                    "saved upload"
                );
                upload = Some(Upload {
                    artifact,
                    original_name,
                });
            }
            // Only the first `name` counts, even when it is blank
            Some("name") if !name_seen => {
                name_seen = true;
                let text = field.text().await.map_err(|e| multipart_error(e, limit))?;
                name_hint = non_empty(&text);
            }
            _ => {}
        }
    }

    Ok((upload, name_hint))
}

/// Stream one multipart field to `path` without buffering it in memory
async fn save_field(field: &mut Field<'_>, path: &Path, limit: usize) -> Result<u64> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(ServerError::SaveUpload)?;

    let mut written = 0u64;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        file.write_all(&chunk).await.map_err(ServerError::SaveUpload)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(ServerError::SaveUpload)?;

    Ok(written)
}

async fn ensure_default_media(path: &Path) -> Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if !meta.is_dir() => Ok(()),
        _ => Err(ServerError::DefaultMediaNotFound),
    }
}
