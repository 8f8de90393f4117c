//! Download file naming
//!
//! Turns whatever name the client (or the default media file) provides into
//! the `.mp3` name offered for download, plus the header-safe forms of it.

use std::path::Path;

/// Stem used when a name has nothing left after sanitizing
pub const FALLBACK_STEM: &str = "audio";

/// Fallback for upload file names that reduce to nothing
pub const FALLBACK_UPLOAD_NAME: &str = "upload.bin";

/// Last path component, accepting both `/` and `\` separators
fn base_name(name: &str) -> &str {
    name.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
}

fn strip_control(name: &str) -> String {
    name.chars().filter(|c| !c.is_control()).collect()
}

/// Base name reduced to characters that are safe inside a quoted ASCII
/// header parameter and in a scratch file name.
pub fn safe_base_name(name: &str) -> String {
    let base = base_name(name);
    if base.is_empty() || base == "." || base == ".." {
        return FALLBACK_UPLOAD_NAME.to_string();
    }
    base.chars()
        .map(|c| match c {
            '"' | '\'' | ' ' | '\\' => '_',
            c if c.is_ascii_graphic() => c,
            _ => '_',
        })
        .collect()
}

/// Swap the extension of `input` for `.mp3`, keeping the rest of the name
/// (including non-ASCII characters) intact.
pub fn output_file_name(input: &str) -> String {
    let base = strip_control(base_name(input));
    let stem = match base.rfind('.') {
        Some(i) => &base[..i],
        None => base.as_str(),
    };
    let stem = if stem.is_empty() || stem == "." {
        FALLBACK_STEM
    } else {
        stem
    };
    format!("{}.mp3", stem)
}

/// Pick the download name: explicit hint, then the uploaded file's name,
/// then the default media file's name.
pub fn display_name(hint: Option<&str>, upload_name: Option<&str>, default_media: &Path) -> String {
    if let Some(hint) = hint.filter(|h| !h.is_empty()) {
        return output_file_name(hint);
    }
    if let Some(upload_name) = upload_name {
        return output_file_name(upload_name);
    }
    let default_name = default_media
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    output_file_name(&default_name)
}

/// `Content-Disposition` value with an ASCII fallback `filename` and an
/// RFC 5987 `filename*` carrying the UTF-8 name.
pub fn content_disposition(filename: &str) -> String {
    let fallback = safe_base_name(filename);
    let utf8_name = strip_control(filename);
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(&utf8_name)
    )
}
