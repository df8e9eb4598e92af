//! Application configuration, read from an optional RON file.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use stitch_engine::{FetchSettings, FfmpegSettings};
use stitch_logging::stitch_info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub ffmpeg_program: PathBuf,
    /// Where engine scratch directories are created; system temp dir if unset.
    pub scratch_root: Option<PathBuf>,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: Option<u64>,
    pub diagnostics_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        let ffmpeg = FfmpegSettings::default();
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            ffmpeg_program: ffmpeg.program,
            scratch_root: ffmpeg.scratch_root,
            connect_timeout_secs: 10,
            request_timeout_secs: None,
            diagnostics_limit: ffmpeg.diagnostics_limit,
        }
    }
}

impl AppConfig {
    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: self.request_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn ffmpeg_settings(&self) -> FfmpegSettings {
        FfmpegSettings {
            program: self.ffmpeg_program.clone(),
            scratch_root: self.scratch_root.clone(),
            diagnostics_limit: self.diagnostics_limit,
        }
    }
}

/// Defaults when `path` is `None`; a given path must exist and parse.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let Some(path) = path else {
        return Ok(AppConfig::default());
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: AppConfig =
        ron::from_str(&content).with_context(|| format!("parsing config {}", path.display()))?;
    stitch_info!("Loaded config from {:?}", path);
    Ok(config)
}
