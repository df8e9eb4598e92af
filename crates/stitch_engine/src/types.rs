use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;

pub type RunId = u64;

/// Suggested download name of every stitched output.
pub const OUTPUT_FILENAME: &str = "stitched-video.mp4";
pub const OUTPUT_CONTENT_TYPE: &str = "video/mp4";

/// One input of a run, in run order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StitchSource {
    Url(String),
    File(PathBuf),
}

impl fmt::Display for StitchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StitchSource::Url(url) => write!(f, "{url}"),
            StitchSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    Fetching,
    Staging,
    Inspecting,
    WritingManifest,
    Concatenating,
    Materializing,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunProgress {
    pub run_id: RunId,
    pub stage: Stage,
    /// Position of the entry this event is about, for per-entry stages.
    pub index: Option<usize>,
    pub bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Progress(RunProgress),
    /// The engine reported a play length for the staged entry at `index`.
    DurationRead {
        run_id: RunId,
        index: usize,
        duration: Duration,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutput {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FetchError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    Io,
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Io => write!(f, "io error"),
            FailureKind::Network => write!(f, "network error"),
        }
    }
}

/// The stitched video of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputResource {
    pub run_id: RunId,
    pub bytes: Bytes,
    pub content_type: &'static str,
    pub filename: &'static str,
    /// Manifest text the engine was given, kept for diagnostics.
    pub manifest: String,
}

impl OutputResource {
    pub fn byte_len(&self) -> u64 {
        self.bytes.len() as u64
    }
}
