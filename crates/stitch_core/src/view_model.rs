use serde::Serialize;

use crate::{Phase, SourceRef};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SessionViewModel {
    pub phase: Phase,
    pub entries: Vec<EntryView>,
    pub can_run: bool,
    pub can_edit: bool,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryView {
    pub position: usize,
    pub label: String,
    pub source: SourceRef,
    pub valid: bool,
    pub byte_len: Option<u64>,
    pub duration_ms: Option<u64>,
}
