use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::join_all;
use stitch_core::is_valid_video_url;
use stitch_logging::{stitch_debug, stitch_info, stitch_warn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::fetch::Fetcher;
use crate::media::{EngineError, MediaEngine};
use crate::{
    EngineEvent, FailureKind, FetchError, OutputResource, RunId, RunProgress, Stage, StitchSource,
    OUTPUT_CONTENT_TYPE, OUTPUT_FILENAME,
};

pub const MANIFEST_NAME: &str = "filelist.txt";
pub const OUTPUT_NAME: &str = "output.mp4";

/// Name of the staged copy of the entry at `index`.
pub fn staged_name(index: usize) -> String {
    format!("video{index}.mp4")
}

/// Concat-demuxer manifest listing `count` staged files in order.
pub fn build_manifest(count: usize) -> String {
    (0..count)
        .map(|index| format!("file '{}'", staged_name(index)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Stream-copy concatenation of the manifest into [`OUTPUT_NAME`].
/// `-safe 0` is fine here: every path in the manifest is a name we generated.
pub fn concat_args() -> Vec<String> {
    [
        "-f",
        "concat",
        "-safe",
        "0",
        "-i",
        MANIFEST_NAME,
        "-c",
        "copy",
        OUTPUT_NAME,
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect()
}

/// Reads a staged file without writing anything, so ffmpeg reports its input
/// header (including the play length) and exits successfully.
pub fn inspect_args(name: &str) -> Vec<String> {
    ["-i", name, "-c", "copy", "-f", "null", "-"]
        .iter()
        .map(|arg| arg.to_string())
        .collect()
}

/// Play length from the `Duration: HH:MM:SS.ss` line of an engine log.
pub fn parse_duration(log: &str) -> Option<Duration> {
    let rest = log.split("Duration: ").nth(1)?;
    let stamp = rest.split(',').next()?.trim();
    let mut parts = stamp.splitn(3, ':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(Duration::from_secs(hours * 3600 + minutes * 60) + Duration::from_secs_f64(seconds))
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no sources to stitch")]
    Empty,
    #[error("source at position {position} is not a valid video source: {value}")]
    InvalidSource { position: usize, value: String },
}

#[derive(Debug, Error)]
pub enum StitchError {
    #[error("a run is already in progress")]
    Busy,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to fetch source at position {position}: {error}")]
    Fetch {
        position: usize,
        #[source]
        error: FetchError,
    },
    #[error("processing failed at {stage:?}: {error}")]
    Processing {
        stage: Stage,
        #[source]
        error: EngineError,
    },
    #[error("run cancelled")]
    Cancelled,
}

/// Validate, fetch, stage, concatenate. One run at a time.
pub struct StitchPipeline {
    fetcher: Arc<dyn Fetcher>,
    active: AtomicBool,
}

impl StitchPipeline {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            active: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub async fn run(
        &self,
        engine: &dyn MediaEngine,
        run_id: RunId,
        sources: &[StitchSource],
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<OutputResource, StitchError> {
        let _guard = RunGuard::acquire(&self.active).ok_or(StitchError::Busy)?;
        stitch_info!("run {} started with {} sources", run_id, sources.len());

        emit(sink, run_id, Stage::Validating, None, None);
        validate(sources)?;
        check_cancel(cancel)?;

        emit(sink, run_id, Stage::Fetching, None, None);
        let buffers = self.fetch_all(run_id, sources, sink).await?;
        check_cancel(cancel)?;

        let result = process(engine, run_id, &buffers, sink, cancel).await;
        cleanup(engine, buffers.len()).await;

        match &result {
            Ok(output) => stitch_info!("run {} produced {} bytes", run_id, output.byte_len()),
            Err(err) => stitch_warn!("run {} failed: {}", run_id, err),
        }
        result
    }

    /// Fetches every source concurrently and waits for all of them to settle,
    /// even after one has failed. The lowest failing position is reported.
    async fn fetch_all(
        &self,
        run_id: RunId,
        sources: &[StitchSource],
        sink: &dyn ProgressSink,
    ) -> Result<Vec<Bytes>, StitchError> {
        let settled = join_all(sources.iter().map(|source| self.load_source(source))).await;

        let mut buffers = Vec::with_capacity(settled.len());
        let mut first_failure = None;
        for (position, result) in settled.into_iter().enumerate() {
            match result {
                Ok(bytes) => {
                    emit(
                        sink,
                        run_id,
                        Stage::Fetching,
                        Some(position),
                        Some(bytes.len() as u64),
                    );
                    buffers.push(bytes);
                }
                Err(error) => {
                    stitch_warn!("run {} fetch failed position={}: {}", run_id, position, error);
                    if first_failure.is_none() {
                        first_failure = Some(StitchError::Fetch { position, error });
                    }
                }
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(buffers),
        }
    }

    async fn load_source(&self, source: &StitchSource) -> Result<Bytes, FetchError> {
        match source {
            StitchSource::Url(url) => self.fetcher.fetch(url).await.map(|output| output.bytes),
            StitchSource::File(path) => tokio::fs::read(path)
                .await
                .map(Bytes::from)
                .map_err(|err| {
                    FetchError::new(FailureKind::Io, format!("{}: {}", path.display(), err))
                }),
        }
    }
}

async fn process(
    engine: &dyn MediaEngine,
    run_id: RunId,
    buffers: &[Bytes],
    sink: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<OutputResource, StitchError> {
    emit(sink, run_id, Stage::Staging, None, None);
    // A previous run may have left these behind; ffmpeg refuses to overwrite.
    for name in [OUTPUT_NAME, MANIFEST_NAME] {
        engine
            .remove_file(name)
            .await
            .map_err(processing(Stage::Staging))?;
    }
    for (index, bytes) in buffers.iter().enumerate() {
        engine
            .write_file(&staged_name(index), bytes)
            .await
            .map_err(processing(Stage::Staging))?;
    }
    check_cancel(cancel)?;

    emit(sink, run_id, Stage::Inspecting, None, None);
    for index in 0..buffers.len() {
        read_duration(engine, run_id, index, sink).await;
    }
    check_cancel(cancel)?;

    emit(sink, run_id, Stage::WritingManifest, None, None);
    let manifest = build_manifest(buffers.len());
    engine
        .write_file(MANIFEST_NAME, manifest.as_bytes())
        .await
        .map_err(processing(Stage::WritingManifest))?;
    check_cancel(cancel)?;

    emit(sink, run_id, Stage::Concatenating, None, None);
    engine
        .run(&concat_args())
        .await
        .map_err(processing(Stage::Concatenating))?;

    emit(sink, run_id, Stage::Materializing, None, None);
    let bytes = engine
        .read_file(OUTPUT_NAME)
        .await
        .map_err(processing(Stage::Materializing))?;

    emit(sink, run_id, Stage::Done, None, Some(bytes.len() as u64));
    Ok(OutputResource {
        run_id,
        bytes,
        content_type: OUTPUT_CONTENT_TYPE,
        filename: OUTPUT_FILENAME,
        manifest,
    })
}

/// An inspection that fails or reports no length is logged and skipped.
async fn read_duration(
    engine: &dyn MediaEngine,
    run_id: RunId,
    index: usize,
    sink: &dyn ProgressSink,
) {
    let name = staged_name(index);
    match engine.run(&inspect_args(&name)).await {
        Ok(log) => match parse_duration(&log) {
            Some(duration) => sink.emit(EngineEvent::DurationRead {
                run_id,
                index,
                duration,
            }),
            None => stitch_debug!("no duration reported for {}", name),
        },
        Err(err) => stitch_warn!("reading the duration of {} failed: {}", name, err),
    }
}

/// Removes everything a run wrote into the engine filesystem.
async fn cleanup(engine: &dyn MediaEngine, staged: usize) {
    let names = (0..staged)
        .map(staged_name)
        .chain([MANIFEST_NAME.to_string(), OUTPUT_NAME.to_string()]);
    for name in names {
        if let Err(err) = engine.remove_file(&name).await {
            stitch_warn!("cleanup of {} failed: {}", name, err);
        }
    }
}

fn validate(sources: &[StitchSource]) -> Result<(), ValidationError> {
    if sources.is_empty() {
        return Err(ValidationError::Empty);
    }
    for (position, source) in sources.iter().enumerate() {
        let valid = match source {
            StitchSource::Url(raw) => is_valid_video_url(raw),
            StitchSource::File(path) => !path.as_os_str().is_empty(),
        };
        if !valid {
            return Err(ValidationError::InvalidSource {
                position,
                value: source.to_string(),
            });
        }
    }
    Ok(())
}

fn check_cancel(cancel: &CancellationToken) -> Result<(), StitchError> {
    if cancel.is_cancelled() {
        Err(StitchError::Cancelled)
    } else {
        Ok(())
    }
}

fn processing(stage: Stage) -> impl Fn(EngineError) -> StitchError {
    move |error| StitchError::Processing { stage, error }
}

fn emit(
    sink: &dyn ProgressSink,
    run_id: RunId,
    stage: Stage,
    index: Option<usize>,
    bytes: Option<u64>,
) {
    sink.emit(EngineEvent::Progress(RunProgress {
        run_id,
        stage,
        index,
        bytes,
    }));
}

struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
