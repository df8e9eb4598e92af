use std::sync::{Arc, Mutex};

use stitch_logging::{stitch_error, stitch_info};
use thiserror::Error;

use crate::media::{FfmpegEngine, FfmpegSettings, MediaEngine};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineLoadError {
    #[error("media engine not available: {0}")]
    Unavailable(String),
    #[error("could not prepare engine workspace: {0}")]
    Workspace(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderStatus {
    Unloaded,
    Loading,
    Ready,
    Failed(EngineLoadError),
}

/// Creates the engine. Called at most once per loader.
#[async_trait::async_trait]
pub trait EngineFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn MediaEngine>, EngineLoadError>;
}

enum Slot {
    Empty,
    Ready(Arc<dyn MediaEngine>),
    Failed(EngineLoadError),
}

/// Once-per-session engine initialization.
///
/// Concurrent `load` calls wait on the same initialization. Success is cached;
/// failure is cached too and never retried.
pub struct EngineLoader {
    factory: Arc<dyn EngineFactory>,
    slot: tokio::sync::Mutex<Slot>,
    status: Mutex<LoaderStatus>,
}

impl EngineLoader {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            slot: tokio::sync::Mutex::new(Slot::Empty),
            status: Mutex::new(LoaderStatus::Unloaded),
        }
    }

    pub fn status(&self) -> LoaderStatus {
        self.status
            .lock()
            .map(|status| status.clone())
            .unwrap_or(LoaderStatus::Unloaded)
    }

    pub async fn load(&self) -> Result<Arc<dyn MediaEngine>, EngineLoadError> {
        let mut slot = self.slot.lock().await;
        match &*slot {
            Slot::Ready(engine) => return Ok(engine.clone()),
            Slot::Failed(err) => return Err(err.clone()),
            Slot::Empty => {}
        }

        self.set_status(LoaderStatus::Loading);
        match self.factory.create().await {
            Ok(engine) => {
                stitch_info!("media engine ready");
                *slot = Slot::Ready(engine.clone());
                self.set_status(LoaderStatus::Ready);
                Ok(engine)
            }
            Err(err) => {
                stitch_error!("media engine failed to load: {}", err);
                *slot = Slot::Failed(err.clone());
                self.set_status(LoaderStatus::Failed(err.clone()));
                Err(err)
            }
        }
    }

    fn set_status(&self, status: LoaderStatus) {
        if let Ok(mut guard) = self.status.lock() {
            *guard = status;
        }
    }
}

/// Builds an [`FfmpegEngine`] after checking that the binary runs.
#[derive(Debug, Clone, Default)]
pub struct FfmpegFactory {
    settings: FfmpegSettings,
}

impl FfmpegFactory {
    pub fn new(settings: FfmpegSettings) -> Self {
        Self { settings }
    }
}

#[async_trait::async_trait]
impl EngineFactory for FfmpegFactory {
    async fn create(&self) -> Result<Arc<dyn MediaEngine>, EngineLoadError> {
        let program = &self.settings.program;
        let version = tokio::process::Command::new(program)
            .arg("-version")
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|err| {
                EngineLoadError::Unavailable(format!("{}: {}", program.display(), err))
            })?;
        if !version.status.success() {
            return Err(EngineLoadError::Unavailable(format!(
                "{} -version exited with {}",
                program.display(),
                version.status
            )));
        }
        if let Some(first_line) = String::from_utf8_lossy(&version.stdout).lines().next() {
            stitch_info!("using {}", first_line);
        }

        let engine = FfmpegEngine::new(&self.settings)
            .map_err(|err| EngineLoadError::Workspace(err.to_string()))?;
        Ok(Arc::new(engine))
    }
}
