// Static media typing — extension to MIME and coarse media-kind mapping.

use std::path::Path;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Other,
}

const VIDEO_EXTS: &[&str] = &["mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "mpg", "mpeg"];
const AUDIO_EXTS: &[&str] = &["mp3", "wav", "flac", "aac", "ogg"];

fn extension(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

impl MediaKind {
    pub fn from_path(path: &str) -> Self {
        match extension(path).as_deref() {
            Some(ext) if VIDEO_EXTS.contains(&ext) => MediaKind::Video,
            Some(ext) if AUDIO_EXTS.contains(&ext) => MediaKind::Audio,
            _ => MediaKind::Other,
        }
    }
}

/// MIME type for a file name; unknown extensions map to a generic binary type.
pub fn content_type_for(path: &str) -> &'static str {
    match extension(path).as_deref() {
        Some("mp4") => "video/mp4",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        Some("mov") => "video/quicktime",
        Some("wmv") => "video/x-ms-wmv",
        Some("flv") => "video/x-flv",
        Some("webm") => "video/webm",
        Some("mpg") | Some("mpeg") => "video/mpeg",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",
        Some("aac") => "audio/aac",
        Some("ogg") => "audio/ogg",
        _ => "application/octet-stream",
    }
}
