use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use pretty_assertions::assert_eq;
use stitch_engine::{
    concat_args, inspect_args, EngineError, EngineEvent, FailureKind, FetchError, FetchOutput,
    Fetcher, MediaEngine, ProgressSink, RunProgress, Stage, StitchError, StitchPipeline,
    StitchSource, ValidationError, MANIFEST_NAME, OUTPUT_NAME,
};
use tokio_util::sync::CancellationToken;

/// Serves canned bodies; delays let later entries finish first.
#[derive(Default)]
struct FakeFetcher {
    bodies: HashMap<String, Result<Vec<u8>, u16>>,
    delays: HashMap<String, Duration>,
    calls: AtomicUsize,
    completed: Mutex<Vec<String>>,
}

impl FakeFetcher {
    fn ok(mut self, url: &str, body: &[u8]) -> Self {
        self.bodies.insert(url.to_string(), Ok(body.to_vec()));
        self
    }

    fn status(mut self, url: &str, status: u16) -> Self {
        self.bodies.insert(url.to_string(), Err(status));
        self
    }

    fn delay(mut self, url: &str, millis: u64) -> Self {
        self.delays
            .insert(url.to_string(), Duration::from_millis(millis));
        self
    }
}

#[async_trait::async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchOutput, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }
        self.completed.lock().unwrap().push(url.to_string());
        match self.bodies.get(url) {
            Some(Ok(body)) => Ok(FetchOutput {
                bytes: Bytes::from(body.clone()),
                content_type: Some("video/mp4".to_string()),
            }),
            Some(Err(status)) => Err(FetchError::new(
                FailureKind::HttpStatus(*status),
                format!("Failed to fetch: {status}"),
            )),
            None => Err(FetchError::new(FailureKind::Network, "unknown url")),
        }
    }
}

/// In-memory engine whose concat joins the manifest's files byte by byte.
#[derive(Default)]
struct FakeEngine {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    runs: Mutex<Vec<Vec<String>>>,
    manifests: Mutex<Vec<String>>,
    fail_run: bool,
    /// Inspections succeed but print no duration line.
    silent_inspect: bool,
}

#[async_trait::async_trait]
impl MediaEngine for FakeEngine {
    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), EngineError> {
        self.files
            .lock()
            .unwrap()
            .insert(name.to_string(), data.to_vec());
        Ok(())
    }

    async fn run(&self, args: &[String]) -> Result<String, EngineError> {
        self.runs.lock().unwrap().push(args.to_vec());
        if args[0] == "-i" {
            if self.silent_inspect {
                return Ok("Input #0, mov,mp4".to_string());
            }
            // One second of play per staged byte.
            let seconds = self.files.lock().unwrap()[&args[1]].len();
            return Ok(format!(
                "Input #0, mov,mp4\n  Duration: 00:00:{seconds:02}.00, start: 0.000000"
            ));
        }
        if self.fail_run {
            return Err(EngineError::CommandFailed {
                status: "exit status: 1".to_string(),
                diagnostics: "Non-monotonous DTS in output stream".to_string(),
            });
        }
        let mut files = self.files.lock().unwrap();
        if files.contains_key(OUTPUT_NAME) {
            return Err(EngineError::CommandFailed {
                status: "exit status: 1".to_string(),
                diagnostics: "File 'output.mp4' already exists".to_string(),
            });
        }
        let manifest = String::from_utf8(files[MANIFEST_NAME].clone()).unwrap();
        self.manifests.lock().unwrap().push(manifest.clone());
        let mut output = Vec::new();
        for line in manifest.lines() {
            let name = line
                .strip_prefix("file '")
                .and_then(|rest| rest.strip_suffix('\''))
                .unwrap();
            output.extend_from_slice(&files[name]);
        }
        files.insert(OUTPUT_NAME.to_string(), output);
        Ok(String::new())
    }

    async fn read_file(&self, name: &str) -> Result<Bytes, EngineError> {
        self.files
            .lock()
            .unwrap()
            .get(name)
            .map(|data| Bytes::from(data.clone()))
            .ok_or_else(|| EngineError::Io {
                name: name.to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
    }

    async fn remove_file(&self, name: &str) -> Result<(), EngineError> {
        self.files.lock().unwrap().remove(name);
        Ok(())
    }
}

#[derive(Default)]
struct TestSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl TestSink {
    fn stages(&self) -> Vec<Stage> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                EngineEvent::Progress(progress) => Some(progress.stage),
                _ => None,
            })
            .collect()
    }

    fn fetched(&self) -> Vec<(usize, u64)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                EngineEvent::Progress(RunProgress {
                    stage: Stage::Fetching,
                    index: Some(index),
                    bytes: Some(bytes),
                    ..
                }) => Some((*index, *bytes)),
                _ => None,
            })
            .collect()
    }

    fn durations(&self) -> Vec<(usize, Duration)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                EngineEvent::DurationRead { index, duration, .. } => Some((*index, *duration)),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for TestSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn urls(raw: &[&str]) -> Vec<StitchSource> {
    raw.iter()
        .map(|url| StitchSource::Url(url.to_string()))
        .collect()
}

#[tokio::test]
async fn two_clips_are_joined_in_input_order() {
    let fetcher = Arc::new(
        FakeFetcher::default()
            .ok("https://a/video1.mp4", b"clip1")
            .ok("https://b/video2.mp4", b"clip2")
            // The first entry settles last.
            .delay("https://a/video1.mp4", 50),
    );
    let pipeline = StitchPipeline::new(fetcher.clone());
    let engine = FakeEngine::default();
    let sink = TestSink::default();

    let output = pipeline
        .run(
            &engine,
            1,
            &urls(&["https://a/video1.mp4", "https://b/video2.mp4"]),
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        *fetcher.completed.lock().unwrap(),
        vec!["https://b/video2.mp4", "https://a/video1.mp4"]
    );
    assert_eq!(&output.bytes[..], b"clip1clip2");
    assert_eq!(output.manifest, "file 'video0.mp4'\nfile 'video1.mp4'");
    assert_eq!(output.content_type, "video/mp4");
    assert_eq!(output.filename, "stitched-video.mp4");
    assert_eq!(
        *engine.runs.lock().unwrap(),
        vec![
            inspect_args("video0.mp4"),
            inspect_args("video1.mp4"),
            concat_args()
        ]
    );
    assert_eq!(sink.fetched(), vec![(0, 5), (1, 5)]);
    assert_eq!(
        sink.durations(),
        vec![(0, Duration::from_secs(5)), (1, Duration::from_secs(5))]
    );
    assert_eq!(
        sink.stages(),
        vec![
            Stage::Validating,
            Stage::Fetching,
            Stage::Fetching,
            Stage::Fetching,
            Stage::Staging,
            Stage::Inspecting,
            Stage::WritingManifest,
            Stage::Concatenating,
            Stage::Materializing,
            Stage::Done,
        ]
    );
    assert!(engine.files.lock().unwrap().is_empty());
    assert!(!pipeline.is_running());
}

#[tokio::test]
async fn malformed_url_fails_before_any_fetch() {
    let fetcher = Arc::new(FakeFetcher::default().ok("https://a/video1.mp4", b"clip1"));
    let pipeline = StitchPipeline::new(fetcher.clone());
    let engine = FakeEngine::default();

    let err = pipeline
        .run(
            &engine,
            1,
            &urls(&["not-a-url"]),
            &TestSink::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    match err {
        StitchError::Validation(ValidationError::InvalidSource { position, value }) => {
            assert_eq!(position, 0);
            assert_eq!(value, "not-a-url");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);

    let err = pipeline
        .run(
            &engine,
            2,
            &urls(&["https://a/video1.mp4", "mailto:someone@example.com"]),
            &TestSink::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StitchError::Validation(ValidationError::InvalidSource { position: 1, .. })
    ));
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    assert!(engine.runs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn empty_list_is_a_validation_error() {
    let pipeline = StitchPipeline::new(Arc::new(FakeFetcher::default()));
    let err = pipeline
        .run(
            &FakeEngine::default(),
            1,
            &[],
            &TestSink::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StitchError::Validation(ValidationError::Empty)));
}

#[tokio::test]
async fn one_failed_fetch_fails_the_run_after_all_settle() {
    let fetcher = Arc::new(
        FakeFetcher::default()
            .ok("https://a/1.mp4", b"one")
            .status("https://b/2.mp4", 404)
            .ok("https://c/3.mp4", b"three")
            .delay("https://c/3.mp4", 30),
    );
    let pipeline = StitchPipeline::new(fetcher.clone());
    let engine = FakeEngine::default();

    let err = pipeline
        .run(
            &engine,
            1,
            &urls(&["https://a/1.mp4", "https://b/2.mp4", "https://c/3.mp4"]),
            &TestSink::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    match err {
        StitchError::Fetch { position, error } => {
            assert_eq!(position, 1);
            assert_eq!(error.kind, FailureKind::HttpStatus(404));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(fetcher.completed.lock().unwrap().len(), 3);
    assert!(engine.files.lock().unwrap().is_empty());
    assert!(engine.runs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn engine_failure_is_a_processing_error_with_diagnostics() {
    let fetcher = Arc::new(FakeFetcher::default().ok("https://a/1.mp4", b"one"));
    let pipeline = StitchPipeline::new(fetcher);
    let engine = FakeEngine {
        fail_run: true,
        ..FakeEngine::default()
    };

    let err = pipeline
        .run(
            &engine,
            1,
            &urls(&["https://a/1.mp4"]),
            &TestSink::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StitchError::Processing {
            stage: Stage::Concatenating,
            ..
        }
    ));
    assert!(err.to_string().contains("Non-monotonous DTS"));
    assert!(engine.files.lock().unwrap().is_empty());
}

#[tokio::test]
async fn repeated_runs_are_independent() {
    let fetcher = Arc::new(
        FakeFetcher::default()
            .ok("https://a/1.mp4", b"AA")
            .ok("https://b/2.mp4", b"BB"),
    );
    let pipeline = StitchPipeline::new(fetcher);
    let engine = FakeEngine::default();
    let sources = urls(&["https://a/1.mp4", "https://b/2.mp4"]);

    let first = pipeline
        .run(&engine, 1, &sources, &TestSink::default(), &CancellationToken::new())
        .await
        .unwrap();
    let second = pipeline
        .run(&engine, 2, &sources, &TestSink::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(first.run_id, 1);
    assert_eq!(second.run_id, 2);
    assert_eq!(&first.bytes[..], b"AABB");
    assert_eq!(&second.bytes[..], b"AABB");
    assert_eq!(first.manifest, second.manifest);
    assert_eq!(
        *engine.manifests.lock().unwrap(),
        vec![
            "file 'video0.mp4'\nfile 'video1.mp4'".to_string(),
            "file 'video0.mp4'\nfile 'video1.mp4'".to_string(),
        ]
    );
}

#[tokio::test]
async fn stale_output_from_earlier_session_is_cleared() {
    let fetcher = Arc::new(FakeFetcher::default().ok("https://a/1.mp4", b"fresh"));
    let pipeline = StitchPipeline::new(fetcher);
    let engine = FakeEngine::default();
    engine.write_file(OUTPUT_NAME, b"stale").await.unwrap();

    let output = pipeline
        .run(
            &engine,
            1,
            &urls(&["https://a/1.mp4"]),
            &TestSink::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(&output.bytes[..], b"fresh");
}

#[tokio::test]
async fn second_concurrent_run_is_rejected() {
    let fetcher = Arc::new(
        FakeFetcher::default()
            .ok("https://a/1.mp4", b"slow")
            .delay("https://a/1.mp4", 100),
    );
    let pipeline = Arc::new(StitchPipeline::new(fetcher));
    let engine = Arc::new(FakeEngine::default());

    let background = tokio::spawn({
        let pipeline = pipeline.clone();
        let engine = engine.clone();
        async move {
            pipeline
                .run(
                    engine.as_ref(),
                    1,
                    &urls(&["https://a/1.mp4"]),
                    &TestSink::default(),
                    &CancellationToken::new(),
                )
                .await
                .map(|output| output.run_id)
        }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(pipeline.is_running());

    let err = pipeline
        .run(
            engine.as_ref(),
            2,
            &urls(&["https://a/1.mp4"]),
            &TestSink::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StitchError::Busy));

    assert_eq!(background.await.unwrap().unwrap(), 1);
}

#[tokio::test]
async fn cancelled_token_stops_before_fetching() {
    let fetcher = Arc::new(FakeFetcher::default().ok("https://a/1.mp4", b"x"));
    let pipeline = StitchPipeline::new(fetcher.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = pipeline
        .run(
            &FakeEngine::default(),
            1,
            &urls(&["https://a/1.mp4"]),
            &TestSink::default(),
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, StitchError::Cancelled));
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn local_files_are_read_directly() {
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("intro.mp4");
    std::fs::write(&local, b"intro").unwrap();
    let fetcher = Arc::new(FakeFetcher::default().ok("https://a/1.mp4", b"main"));
    let pipeline = StitchPipeline::new(fetcher.clone());

    let output = pipeline
        .run(
            &FakeEngine::default(),
            1,
            &[
                StitchSource::File(local),
                StitchSource::Url("https://a/1.mp4".to_string()),
            ],
            &TestSink::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(&output.bytes[..], b"intromain");
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_local_file_is_a_fetch_error() {
    let pipeline = StitchPipeline::new(Arc::new(FakeFetcher::default()));

    let err = pipeline
        .run(
            &FakeEngine::default(),
            1,
            &[StitchSource::File("/nonexistent/clip.mp4".into())],
            &TestSink::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    match err {
        StitchError::Fetch { position, error } => {
            assert_eq!(position, 0);
            assert_eq!(error.kind, FailureKind::Io);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn missing_duration_does_not_fail_the_run() {
    let fetcher = Arc::new(FakeFetcher::default().ok("https://a/1.mp4", b"one"));
    let pipeline = StitchPipeline::new(fetcher);
    let engine = FakeEngine {
        silent_inspect: true,
        ..FakeEngine::default()
    };
    let sink = TestSink::default();

    let output = pipeline
        .run(
            &engine,
            1,
            &urls(&["https://a/1.mp4"]),
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(&output.bytes[..], b"one");
    assert!(sink.durations().is_empty());
    assert_eq!(engine.runs.lock().unwrap().len(), 2);
}
