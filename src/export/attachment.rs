//! Write attachments and embedded files from a decoded message to disk.

use std::path::{Path, PathBuf};

use crate::model::attachment::EmbeddedFile;
use crate::model::mail::Message;

/// Longest filename written, extension included.
const MAX_FILENAME_LEN: usize = 150;

/// Export every attachment (and, if asked, every embedded file) of `message`
/// into `output_dir`, returning the paths written in message order.
///
/// Existing files are never overwritten; a counter is appended instead.
pub fn export_attachments(
    message: &Message,
    output_dir: &Path,
    include_embedded: bool,
) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)?;
    let mut paths = Vec::new();

    for att in &message.attachments {
        let filename = sanitize_filename(&att.filename, MAX_FILENAME_LEN);
        paths.push(write_unique(&output_dir.join(filename), &att.data)?);
    }

    if include_embedded {
        for file in &message.embedded_files {
            let filename = sanitize_filename(&embedded_filename(file), MAX_FILENAME_LEN);
            paths.push(write_unique(&output_dir.join(filename), &file.data)?);
        }
    }

    tracing::debug!(
        dir = %output_dir.display(),
        count = paths.len(),
        "Exported message files"
    );
    Ok(paths)
}

fn write_unique(path: &Path, data: &[u8]) -> anyhow::Result<PathBuf> {
    let path = unique_path(path);
    std::fs::write(&path, data)?;
    Ok(path)
}

/// Name an embedded file after its Content-ID, with an extension taken from
/// its media type.
fn embedded_filename(file: &EmbeddedFile) -> String {
    let stem = file.cid.split('@').next().unwrap_or_default();
    let stem = if stem.is_empty() { "embedded" } else { stem };
    match extension_for(file.media_type()) {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem.to_string(),
    }
}

fn extension_for(media_type: &str) -> Option<&'static str> {
    let ext = match media_type.to_ascii_lowercase().as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "image/bmp" => "bmp",
        "image/tiff" => "tif",
        "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
        "text/css" => "css",
        "text/calendar" => "ics",
        "application/pdf" => "pdf",
        "application/zip" => "zip",
        "application/octet-stream" => "bin",
        _ => return None,
    };
    Some(ext)
}

/// Make `name` safe to use as a single path component.
///
/// Anything but alphanumerics, `-`, `.`, `_` and `@` becomes `_`, leading
/// dots are dropped, and long names are cut down while keeping the extension.
pub fn sanitize_filename(name: &str, max_len: usize) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '@' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let sanitized = sanitized.trim_start_matches('.');

    if sanitized.is_empty() {
        return "unknown".to_string();
    }
    if sanitized.chars().count() <= max_len {
        return sanitized.to_string();
    }

    match sanitized.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.chars().count() < max_len / 2 => {
            let keep = max_len - ext.chars().count() - 1;
            let stem: String = stem.chars().take(keep).collect();
            format!("{stem}.{ext}")
        }
        _ => sanitized.chars().take(max_len).collect(),
    }
}

/// If `path` already exists, append a counter to make it unique.
pub fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let parent = path.parent().unwrap_or(Path::new("."));

    for i in 1..1000 {
        let candidate = if ext.is_empty() {
            parent.join(format!("{stem}_{i}"))
        } else {
            parent.join(format!("{stem}_{i}.{ext}"))
        };
        if !candidate.exists() {
            return candidate;
        }
    }

    parent.join(format!("{stem}_dup.{ext}"))
}
