use std::sync::Arc;

use chrono::Utc;
use stitch_core::{Effect, Msg, OutputSummary, RunId, SourceRef};
use stitch_engine::{
    EngineEvent, EngineLoader, OutputResource, ProgressSink, RunProgress, Stage, StitchPipeline,
    StitchSource,
};
use stitch_logging::{stitch_debug, stitch_info, stitch_warn};
use tokio_util::sync::CancellationToken;

use super::output_store::OutputStore;
use super::session::App;

/// Executes core effects against the engine and feeds the outcome back as messages.
pub struct EffectRunner {
    loader: Arc<EngineLoader>,
    pipeline: Arc<StitchPipeline>,
    outputs: OutputStore,
    cancel: CancellationToken,
}

impl EffectRunner {
    pub fn new(
        loader: Arc<EngineLoader>,
        pipeline: Arc<StitchPipeline>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            loader,
            pipeline,
            outputs: OutputStore::new(),
            cancel,
        }
    }

    pub fn outputs(&self) -> &OutputStore {
        &self.outputs
    }

    pub fn enqueue(&self, app: &Arc<App>, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::LoadEngine => {
                    let loader = self.loader.clone();
                    let app = app.clone();
                    tokio::spawn(async move {
                        let msg = match loader.load().await {
                            Ok(_) => Msg::EngineLoaded,
                            Err(err) => Msg::EngineLoadFailed(err.to_string()),
                        };
                        app.dispatch(msg);
                    });
                }
                Effect::ReleaseOutput { run_id } => {
                    if self.outputs.release(run_id) {
                        stitch_info!("Released output of run {}", run_id);
                    }
                }
                Effect::StartRun { run_id, sources } => {
                    stitch_info!("StartRun run_id={} sources={}", run_id, sources.len());
                    let loader = self.loader.clone();
                    let pipeline = self.pipeline.clone();
                    let cancel = self.cancel.clone();
                    let app = app.clone();
                    tokio::spawn(async move {
                        let msg = execute_run(&app, &loader, &pipeline, run_id, sources, &cancel)
                            .await;
                        app.dispatch(msg);
                    });
                }
            }
        }
    }
}

async fn execute_run(
    app: &Arc<App>,
    loader: &EngineLoader,
    pipeline: &StitchPipeline,
    run_id: RunId,
    sources: Vec<SourceRef>,
    cancel: &CancellationToken,
) -> Msg {
    let engine = match loader.load().await {
        Ok(engine) => engine,
        Err(err) => {
            return Msg::RunFailed {
                run_id,
                message: err.to_string(),
            }
        }
    };

    let sources: Vec<StitchSource> = sources.into_iter().map(map_source).collect();
    let sink = SessionSink {
        app: app.clone(),
        run_id,
    };
    match pipeline
        .run(engine.as_ref(), run_id, &sources, &sink, cancel)
        .await
    {
        Ok(output) => {
            let summary = summarize(&output);
            app.outputs().put(output);
            Msg::RunSucceeded {
                run_id,
                output: summary,
            }
        }
        Err(err) => {
            stitch_warn!("Run {} failed: {}", run_id, err);
            Msg::RunFailed {
                run_id,
                message: err.to_string(),
            }
        }
    }
}

/// Routes per-entry fetch and duration results into the session; other stages
/// are only logged.
struct SessionSink {
    app: Arc<App>,
    run_id: RunId,
}

impl ProgressSink for SessionSink {
    fn emit(&self, event: EngineEvent) {
        match event {
            EngineEvent::Progress(RunProgress {
                stage: Stage::Fetching,
                index: Some(index),
                bytes: Some(byte_len),
                ..
            }) => {
                self.app.dispatch(Msg::EntryResolved {
                    run_id: self.run_id,
                    index,
                    byte_len,
                });
            }
            EngineEvent::Progress(progress) => {
                stitch_debug!("run {} stage {:?}", progress.run_id, progress.stage);
            }
            EngineEvent::DurationRead { index, duration, .. } => {
                self.app.dispatch(Msg::EntryDurationRead {
                    run_id: self.run_id,
                    index,
                    duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                });
            }
        }
    }
}

pub fn map_source(source: SourceRef) -> StitchSource {
    match source {
        SourceRef::Url(url) => StitchSource::Url(url),
        SourceRef::File(path) => StitchSource::File(path),
    }
}

pub fn summarize(output: &OutputResource) -> OutputSummary {
    OutputSummary {
        run_id: output.run_id,
        byte_len: output.byte_len(),
        filename: output.filename.to_string(),
        content_type: output.content_type.to_string(),
        download_path: format!("/api/output/{}", output.run_id),
        completed_utc: Some(Utc::now().to_rfc3339()),
    }
}
