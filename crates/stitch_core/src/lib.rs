//! Stitcher core: pure session state machine and view-model helpers.
mod effect;
mod msg;
mod source;
mod state;
mod update;
mod view_model;

pub use effect::Effect;
pub use msg::Msg;
pub use source::{is_valid_video_url, SourceRef};
pub use state::{OutputSummary, Phase, RunId, SessionState, SourceEntry};
pub use update::update;
pub use view_model::{EntryView, SessionViewModel};
