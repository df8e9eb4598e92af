use crate::{Effect, Msg, Phase, SessionState};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: SessionState, msg: Msg) -> (SessionState, Vec<Effect>) {
    let effects = match msg {
        Msg::LoadEngineRequested => {
            if *state.phase() == Phase::Idle {
                state.set_phase(Phase::EngineLoading);
                vec![Effect::LoadEngine]
            } else {
                Vec::new()
            }
        }
        Msg::EngineLoaded => {
            if matches!(state.phase(), Phase::Idle | Phase::EngineLoading) {
                state.set_phase(Phase::Ready);
            }
            Vec::new()
        }
        Msg::EngineLoadFailed(message) => {
            if matches!(state.phase(), Phase::Idle | Phase::EngineLoading) {
                state.set_phase(Phase::EngineFailed { message });
            }
            Vec::new()
        }
        Msg::EntryAdded(source) => {
            if state.phase().allows_edits() {
                state.push_entry(source);
            }
            Vec::new()
        }
        Msg::EntryChanged { index, source } => {
            if state.phase().allows_edits() {
                state.replace_entry(index, source);
            }
            Vec::new()
        }
        Msg::EntryRemoved { index } => {
            if state.phase().allows_edits() {
                state.remove_entry(index);
            }
            Vec::new()
        }
        Msg::RunClicked => {
            if state.phase().can_run() {
                let previous = match state.phase() {
                    Phase::Done { output } => Some(output.run_id),
                    _ => None,
                };
                let (run_id, sources) = state.begin_run();
                let mut effects = Vec::with_capacity(2);
                if let Some(old) = previous {
                    effects.push(Effect::ReleaseOutput { run_id: old });
                }
                effects.push(Effect::StartRun { run_id, sources });
                effects
            } else {
                Vec::new()
            }
        }
        Msg::EntryResolved {
            run_id,
            index,
            byte_len,
        } => {
            if state.active_run() == Some(run_id) {
                state.set_byte_len(index, byte_len);
            }
            Vec::new()
        }
        Msg::EntryDurationRead {
            run_id,
            index,
            duration_ms,
        } => {
            if state.active_run() == Some(run_id) {
                state.set_duration(index, duration_ms);
            }
            Vec::new()
        }
        Msg::RunSucceeded { run_id, output } => {
            if state.active_run() == Some(run_id) {
                state.set_phase(Phase::Done { output });
                Vec::new()
            } else {
                // A result nobody is waiting for; its resource must not leak.
                vec![Effect::ReleaseOutput { run_id }]
            }
        }
        Msg::RunFailed { run_id, message } => {
            if state.active_run() == Some(run_id) {
                state.set_phase(Phase::Error { message });
            }
            Vec::new()
        }
        Msg::ErrorDismissed => {
            if matches!(state.phase(), Phase::Error { .. }) {
                state.set_phase(Phase::Ready);
            }
            Vec::new()
        }
        Msg::NoOp => Vec::new(),
    };

    (state, effects)
}
