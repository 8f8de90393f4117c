//! Scratch directory management
//!
//! Every file a request writes lives directly under the scratch directory,
//! is named after the request id, and is owned by a [`TempArtifact`] guard
//! that deletes it when dropped. Guards are created before the file is, so
//! an early return at any later step still cleans up.

use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::naming::safe_base_name;

/// Generate a request identifier: 122 bits from the OS-seeded CSPRNG, hex encoded.
pub fn new_request_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Purpose of a scratch file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Uploaded source media
    Upload,
    /// Transcoded MP3 output
    Audio,
}

impl ArtifactKind {
    pub fn tag(&self) -> &'static str {
        match self {
            ArtifactKind::Upload => "upload_",
            ArtifactKind::Audio => "audio_",
        }
    }
}

/// Directory holding per-request transient files
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory if it does not exist yet
    pub fn ensure(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }

    /// Compute the path for a scratch file.
    ///
    /// Uploads keep a sanitized copy of the client's file name after the id
    /// so ffmpeg can still sniff the container from the extension.
    pub fn path_for(&self, kind: ArtifactKind, request_id: &str, original: Option<&str>) -> PathBuf {
        let name = match kind {
            ArtifactKind::Upload => format!(
                "{}{}_{}",
                kind.tag(),
                request_id,
                safe_base_name(original.unwrap_or_default())
            ),
            ArtifactKind::Audio => format!("{}{}.mp3", kind.tag(), request_id),
        };
        self.root.join(name)
    }

    /// Reserve a scratch path and return the guard that will release it
    pub fn allocate(
        &self,
        kind: ArtifactKind,
        request_id: &str,
        original: Option<&str>,
    ) -> TempArtifact {
        let path = self.path_for(kind, request_id, original);
        tracing::trace!(path = %path.display(), "allocated scratch path");
        TempArtifact { path }
    }
}

/// Owns a scratch path and deletes it on drop
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
}

impl TempArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        release(&self.path);
    }
}

/// Best-effort delete. A missing file is fine; anything else is logged.
pub fn release(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed scratch file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove scratch file"),
    }
}
