//! MIME type guessing from file extensions

use std::path::Path;

/// Fallback for unknown or missing extensions
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Best-effort MIME type for `path`, by extension (case-insensitive).
pub fn guess(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("txt") | Some("log") => "text/plain",
        Some("md") => "text/markdown",
        Some("csv") => "text/csv",
        Some("html") | Some("htm") => "text/html",
        Some("json") => "application/json",
        Some("toml") => "application/toml",
        Some("xml") => "application/xml",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("gz") => "application/gzip",
        Some("tar") => "application/x-tar",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        _ => OCTET_STREAM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions() {
        assert_eq!(guess(Path::new("notes.txt")), "text/plain");
        assert_eq!(guess(Path::new("scan.PDF")), "application/pdf");
        assert_eq!(guess(Path::new("dir/photo.JpEg")), "image/jpeg");
    }

    #[test]
    fn unknown_or_missing_extension() {
        assert_eq!(guess(Path::new("Makefile")), OCTET_STREAM);
        assert_eq!(guess(Path::new("blob.xyz")), OCTET_STREAM);
        assert_eq!(guess(Path::new(".hidden")), OCTET_STREAM);
    }
}
