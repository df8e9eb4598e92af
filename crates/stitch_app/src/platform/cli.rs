use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use stitch_core::SourceRef;

#[derive(Parser, Debug)]
#[command(name = "stitcher", version, about = "Join video clips into one file")]
pub struct Cli {
    /// RON configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Also write logs to this file.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the relay endpoint and the session API.
    Serve(ServeArgs),
    /// Stitch the given sources once and write the result to disk.
    Stitch(StitchArgs),
}

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Listen address; overrides the config file.
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

#[derive(Parser, Debug)]
pub struct StitchArgs {
    /// Sources in playback order: http(s) URLs or paths to local files.
    #[arg(required = true)]
    pub sources: Vec<String>,

    /// Output MP4 path.
    #[arg(long, default_value = stitch_engine::OUTPUT_FILENAME)]
    pub out: PathBuf,

    /// ffmpeg binary; overrides the config file.
    #[arg(long)]
    pub ffmpeg: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

/// Existing paths are local files; anything else is treated as a URL and
/// left for the pipeline to validate.
pub fn parse_source(raw: &str) -> SourceRef {
    if Path::new(raw).exists() {
        SourceRef::File(PathBuf::from(raw))
    } else {
        SourceRef::Url(raw.to_string())
    }
}
