use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use bytes::Bytes;
use stitch_logging::{stitch_debug, stitch_warn};
use tempfile::TempDir;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid file name {0:?}")]
    InvalidName(String),
    #[error("io error on {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to launch media engine: {0}")]
    Spawn(#[source] io::Error),
    #[error("media engine exited with {status}: {diagnostics}")]
    CommandFailed { status: String, diagnostics: String },
}

/// The media engine as the pipeline sees it: a private filesystem addressed by
/// plain file names, and a command runner working against it.
#[async_trait::async_trait]
pub trait MediaEngine: Send + Sync {
    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), EngineError>;
    /// Execute one command line (without the program name) and return the
    /// engine's log output.
    async fn run(&self, args: &[String]) -> Result<String, EngineError>;
    async fn read_file(&self, name: &str) -> Result<Bytes, EngineError>;
    /// Absent files are not an error.
    async fn remove_file(&self, name: &str) -> Result<(), EngineError>;
}

#[derive(Debug, Clone)]
pub struct FfmpegSettings {
    pub program: PathBuf,
    /// Parent for the scratch directory; the system temp dir when `None`.
    pub scratch_root: Option<PathBuf>,
    /// Bytes of stderr kept in a failure message.
    pub diagnostics_limit: usize,
}

impl Default for FfmpegSettings {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            scratch_root: None,
            diagnostics_limit: 4096,
        }
    }
}

/// `ffmpeg` binary run inside a scratch directory that is deleted on drop.
#[derive(Debug)]
pub struct FfmpegEngine {
    program: PathBuf,
    workdir: TempDir,
    diagnostics_limit: usize,
}

impl FfmpegEngine {
    pub fn new(settings: &FfmpegSettings) -> io::Result<Self> {
        let workdir = match &settings.scratch_root {
            Some(root) => tempfile::Builder::new().prefix("stitch-").tempdir_in(root)?,
            None => tempfile::Builder::new().prefix("stitch-").tempdir()?,
        };
        Ok(Self {
            program: settings.program.clone(),
            workdir,
            diagnostics_limit: settings.diagnostics_limit,
        })
    }

    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, EngineError> {
        if !is_plain_name(name) {
            return Err(EngineError::InvalidName(name.to_string()));
        }
        Ok(self.workdir.path().join(name))
    }
}

#[async_trait::async_trait]
impl MediaEngine for FfmpegEngine {
    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), EngineError> {
        let path = self.path_for(name)?;
        tokio::fs::write(&path, data)
            .await
            .map_err(|source| EngineError::Io {
                name: name.to_string(),
                source,
            })
    }

    async fn run(&self, args: &[String]) -> Result<String, EngineError> {
        stitch_debug!("ffmpeg {}", args.join(" "));
        let output = tokio::process::Command::new(&self.program)
            .arg("-nostdin")
            .arg("-hide_banner")
            .args(args)
            .current_dir(self.workdir.path())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(EngineError::Spawn)?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.status.success() {
            return Ok(stderr.into_owned());
        }
        let diagnostics = tail(stderr.trim_end(), self.diagnostics_limit).to_string();
        stitch_warn!("ffmpeg failed status={} stderr={}", output.status, diagnostics);
        Err(EngineError::CommandFailed {
            status: output.status.to_string(),
            diagnostics,
        })
    }

    async fn read_file(&self, name: &str) -> Result<Bytes, EngineError> {
        let path = self.path_for(name)?;
        tokio::fs::read(&path)
            .await
            .map(Bytes::from)
            .map_err(|source| EngineError::Io {
                name: name.to_string(),
                source,
            })
    }

    async fn remove_file(&self, name: &str) -> Result<(), EngineError> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(EngineError::Io {
                name: name.to_string(),
                source,
            }),
        }
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// Last `limit` bytes of `text`, cut on a char boundary.
fn tail(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut start = text.len() - limit;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
