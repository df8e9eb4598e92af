use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

/// A user-supplied video source, in the order the user arranged it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SourceRef {
    /// Remote video, fetched through the relay.
    Url(String),
    /// Local video file picked by the user.
    File(PathBuf),
}

impl SourceRef {
    pub fn is_valid(&self) -> bool {
        match self {
            SourceRef::Url(raw) => is_valid_video_url(raw),
            SourceRef::File(path) => !path.as_os_str().is_empty(),
        }
    }

    /// Human readable form used in views and log lines.
    pub fn label(&self) -> String {
        match self {
            SourceRef::Url(raw) => raw.clone(),
            SourceRef::File(path) => path.display().to_string(),
        }
    }
}

/// True for well-formed absolute `http`/`https` URLs with a host.
pub fn is_valid_video_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.has_host(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        assert!(is_valid_video_url("https://a/video1.mp4"));
        assert!(is_valid_video_url("http://cdn.example.com/clip.mp4?x=1"));
    }

    #[test]
    fn rejects_relative_and_other_schemes() {
        assert!(!is_valid_video_url("not-a-url"));
        assert!(!is_valid_video_url(""));
        assert!(!is_valid_video_url("ftp://example.com/clip.mp4"));
        assert!(!is_valid_video_url("file:///tmp/clip.mp4"));
        assert!(!is_valid_video_url("/api/proxy-video?url=x"));
    }

    #[test]
    fn empty_file_path_is_invalid() {
        assert!(!SourceRef::File(PathBuf::new()).is_valid());
        assert!(SourceRef::File(PathBuf::from("clips/a.mp4")).is_valid());
    }
}
