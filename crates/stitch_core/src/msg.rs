#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// Session opened; start loading the media engine.
    LoadEngineRequested,
    /// Engine loader finished successfully.
    EngineLoaded,
    /// Engine loader failed. Terminal for the session.
    EngineLoadFailed(String),
    /// User appended a source.
    EntryAdded(crate::SourceRef),
    /// User edited the source at `index`.
    EntryChanged {
        index: usize,
        source: crate::SourceRef,
    },
    /// User deleted the source at `index`.
    EntryRemoved { index: usize },
    /// User clicked Stitch.
    RunClicked,
    /// Pipeline fetched the entry at `index` for run `run_id`.
    EntryResolved {
        run_id: crate::RunId,
        index: usize,
        byte_len: u64,
    },
    /// Engine reported the play length of the entry at `index` for run `run_id`.
    EntryDurationRead {
        run_id: crate::RunId,
        index: usize,
        duration_ms: u64,
    },
    /// Pipeline produced an output resource.
    RunSucceeded {
        run_id: crate::RunId,
        output: crate::OutputSummary,
    },
    /// Pipeline failed at some stage.
    RunFailed { run_id: crate::RunId, message: String },
    /// User acknowledged the error banner.
    ErrorDismissed,
    /// Fallback for placeholder wiring.
    NoOp,
}
