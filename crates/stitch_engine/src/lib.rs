//! Stitcher engine: relay, fetching, media engine access and the stitch pipeline.
mod fetch;
mod loader;
mod media;
mod persist;
mod pipeline;
mod relay;
mod types;

pub use fetch::{FetchSettings, Fetcher, RelayFetcher};
pub use loader::{EngineFactory, EngineLoadError, EngineLoader, FfmpegFactory, LoaderStatus};
pub use media::{EngineError, FfmpegEngine, FfmpegSettings, MediaEngine};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use pipeline::{
    build_manifest, concat_args, parse_duration, inspect_args, staged_name, ProgressSink,
    StitchError, StitchPipeline, ValidationError, MANIFEST_NAME, OUTPUT_NAME,
};
pub use relay::{loopback_url, relay_router, RelayError, RelayServer, RelayState, PROXY_PATH};
pub use types::{
    EngineEvent, FailureKind, FetchError, FetchOutput, OutputResource, RunId, RunProgress, Stage,
    StitchSource, OUTPUT_CONTENT_TYPE, OUTPUT_FILENAME,
};
