//! Test fixtures for integration tests
//!
//! Fake ffmpeg executables and request builders, so the HTTP flow can be
//! exercised without a real ffmpeg or real media files.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing_subscriber::fmt::MakeWriter;

/// Bytes the fake encoder writes as its "MP3"
pub const FAKE_MP3: &[u8] = b"ID3\x04\x00fake-mp3-frames";

/// Boundary used by [`multipart_body`]
pub const BOUNDARY: &str = "----extract-test-boundary";

/// Writes [`FAKE_MP3`] to the output path (always the last argument)
pub const SCRIPT_SUCCESS: &str = r#"for last; do :; done
printf 'ID3\004\000fake-mp3-frames' > "$last""#;

/// Writes its own argument list to the output path
pub const SCRIPT_ECHO_ARGS: &str = r#"for last; do :; done
echo "$@" > "$last""#;

/// Fails the way ffmpeg does on a corrupt input
pub const SCRIPT_FAIL: &str = r#"echo "Guessed Channel Layout" >&2
echo "$3: Invalid data found when processing input" >&2
exit 1"#;

/// Records its pid next to the output path, then never finishes
pub const SCRIPT_HANG: &str = r#"for last; do :; done
echo $$ > "$last.pid"
exec sleep 30"#;

pub const SCRIPT_VERSION: &str = r#"echo "ffmpeg version 6.1-test Copyright (c) 2000-2023"
echo "built with gcc""#;

/// Write an executable `/bin/sh` script named `ffmpeg` into `dir`
#[cfg(unix)]
pub fn fake_ffmpeg(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("ffmpeg");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Wait for the pid file written by [`SCRIPT_HANG`] for `output`
pub async fn wait_for_pid(output: &Path) -> u32 {
    let pid_file = PathBuf::from(format!("{}.pid", output.display()));
    for _ in 0..200 {
        if let Ok(text) = std::fs::read_to_string(&pid_file) {
            if let Ok(pid) = text.trim().parse() {
                return pid;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("fake ffmpeg never wrote {}", pid_file.display());
}

/// Wait for a [`SCRIPT_HANG`] pid file to show up anywhere in `dir`
pub async fn wait_for_pid_in(dir: &Path) -> (PathBuf, u32) {
    for _ in 0..200 {
        for name in list_files(dir) {
            if !name.ends_with(".pid") {
                continue;
            }
            let path = dir.join(&name);
            if let Ok(pid) = std::fs::read_to_string(&path).unwrap_or_default().trim().parse() {
                return (path, pid);
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("no pid file appeared in {}", dir.display());
}

/// Poll until `pid` is gone; false if it is still around after a few seconds
#[cfg(unix)]
pub async fn wait_for_exit(pid: u32) -> bool {
    for _ in 0..200 {
        if !process_alive(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

/// Whether a process with `pid` still exists
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// One part of a multipart/form-data body
pub enum Part<'a> {
    File { name: &'a str, filename: &'a str, data: &'a [u8] },
    Text { name: &'a str, value: &'a str },
}

/// Encode `parts` as a multipart/form-data body using [`BOUNDARY`]
pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File { name, filename, data } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// `Content-Type` header value matching [`multipart_body`]
pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}

/// Names of the files currently in `dir`
pub fn list_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// In-memory log sink for asserting on what was logged
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Subscriber writing DEBUG and up into this capture
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
