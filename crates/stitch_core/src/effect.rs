use crate::{RunId, SourceRef};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Initialize the media engine (once per session).
    LoadEngine,
    /// Drop the output resource of an earlier run.
    ReleaseOutput { run_id: RunId },
    /// Run the stitch pipeline over a snapshot of the entries.
    StartRun {
        run_id: RunId,
        sources: Vec<SourceRef>,
    },
}
