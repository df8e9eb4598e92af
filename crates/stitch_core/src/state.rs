use serde::Serialize;

use crate::view_model::{EntryView, SessionViewModel};
use crate::SourceRef;

pub type RunId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceEntry {
    pub source: SourceRef,
    pub valid: bool,
    /// Byte size, known once the entry has been fetched in a run.
    pub byte_len: Option<u64>,
    /// Play length in milliseconds, if the engine reported one.
    pub duration_ms: Option<u64>,
}

impl SourceEntry {
    pub fn new(source: SourceRef) -> Self {
        let valid = source.is_valid();
        Self {
            source,
            valid,
            byte_len: None,
            duration_ms: None,
        }
    }
}

/// What a finished run produced, as far as the session is concerned.
/// The bytes themselves live in the app's output store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputSummary {
    pub run_id: RunId,
    pub byte_len: u64,
    pub filename: String,
    pub content_type: String,
    pub download_path: String,
    pub completed_utc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "phase", rename_all = "kebab-case")]
pub enum Phase {
    #[default]
    Idle,
    EngineLoading,
    EngineFailed {
        message: String,
    },
    Ready,
    Running {
        run_id: RunId,
    },
    Done {
        output: OutputSummary,
    },
    Error {
        message: String,
    },
}

impl Phase {
    /// A new run may start from here.
    pub fn can_run(&self) -> bool {
        matches!(self, Phase::Ready | Phase::Done { .. } | Phase::Error { .. })
    }

    pub fn allows_edits(&self) -> bool {
        !matches!(self, Phase::Running { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::EngineLoading => "engine-loading",
            Phase::EngineFailed { .. } => "engine-failed",
            Phase::Ready => "ready",
            Phase::Running { .. } => "running",
            Phase::Done { .. } => "done",
            Phase::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    entries: Vec<SourceEntry>,
    phase: Phase,
    next_run_id: RunId,
    dirty: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            phase: Phase::Idle,
            next_run_id: 1,
            dirty: false,
        }
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn entries(&self) -> &[SourceEntry] {
        &self.entries
    }

    pub fn view(&self) -> SessionViewModel {
        let entries = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| EntryView {
                position,
                label: entry.source.label(),
                source: entry.source.clone(),
                valid: entry.valid,
                byte_len: entry.byte_len,
                duration_ms: entry.duration_ms,
            })
            .collect();
        SessionViewModel {
            phase: self.phase.clone(),
            entries,
            can_run: self.phase.can_run(),
            can_edit: self.phase.allows_edits(),
            dirty: self.dirty,
        }
    }

    /// Returns whether anything observable changed since the last call.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            self.phase = phase;
            self.dirty = true;
        }
    }

    pub(crate) fn push_entry(&mut self, source: SourceRef) {
        self.entries.push(SourceEntry::new(source));
        self.dirty = true;
    }

    pub(crate) fn replace_entry(&mut self, index: usize, source: SourceRef) -> bool {
        match self.entries.get_mut(index) {
            Some(entry) => {
                *entry = SourceEntry::new(source);
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove_entry(&mut self, index: usize) -> bool {
        if index < self.entries.len() {
            self.entries.remove(index);
            self.dirty = true;
            true
        } else {
            false
        }
    }

    pub(crate) fn set_byte_len(&mut self, index: usize, byte_len: u64) {
        if let Some(entry) = self.entries.get_mut(index) {
            if entry.byte_len != Some(byte_len) {
                entry.byte_len = Some(byte_len);
                self.dirty = true;
            }
        }
    }

    pub(crate) fn set_duration(&mut self, index: usize, duration_ms: u64) {
        if let Some(entry) = self.entries.get_mut(index) {
            if entry.duration_ms != Some(duration_ms) {
                entry.duration_ms = Some(duration_ms);
                self.dirty = true;
            }
        }
    }

    /// Allocates the next run id and snapshots the current entry order.
    pub(crate) fn begin_run(&mut self) -> (RunId, Vec<SourceRef>) {
        let run_id = self.next_run_id;
        self.next_run_id += 1;
        let sources = self.entries.iter().map(|e| e.source.clone()).collect();
        self.set_phase(Phase::Running { run_id });
        (run_id, sources)
    }

    pub(crate) fn active_run(&self) -> Option<RunId> {
        match self.phase {
            Phase::Running { run_id } => Some(run_id),
            _ => None,
        }
    }
}
