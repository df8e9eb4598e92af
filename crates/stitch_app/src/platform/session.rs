use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};

use stitch_core::{update, Effect, Msg, SessionState, SessionViewModel};
use stitch_logging::stitch_debug;

use super::effects::EffectRunner;
use super::output_store::OutputStore;

/// Result of applying one message to the session.
pub struct Dispatched {
    pub view: SessionViewModel,
    pub effects: Vec<Effect>,
    /// Whether the message changed anything observable.
    pub changed: bool,
}

/// Why an entry edit was refused. Carries the view it was checked against.
pub enum EditRejected {
    Locked(SessionViewModel),
    NoSuchEntry(SessionViewModel),
}

/// The single session this process serves: state plus the runner for its effects.
pub struct App {
    session: Mutex<SessionState>,
    runner: EffectRunner,
}

impl App {
    pub fn new(runner: EffectRunner) -> Arc<Self> {
        Arc::new(Self {
            session: Mutex::new(SessionState::new()),
            runner,
        })
    }

    pub fn outputs(&self) -> &OutputStore {
        self.runner.outputs()
    }

    pub fn view(&self) -> SessionViewModel {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .view()
    }

    /// Applies `msg` and hands any resulting effects to the runner.
    pub fn dispatch(self: &Arc<Self>, msg: Msg) -> Dispatched {
        match self.apply(msg, |_| Ok::<(), Infallible>(())) {
            Ok(dispatched) => dispatched,
            Err(never) => match never {},
        }
    }

    /// Applies an entry edit addressed at `index` (none for appends).
    ///
    /// The phase and the index are checked under the same lock as the update,
    /// so a concurrent edit or run cannot slip in between.
    pub fn edit(
        self: &Arc<Self>,
        index: Option<usize>,
        msg: Msg,
    ) -> Result<Dispatched, EditRejected> {
        self.apply(msg, |state| {
            if !state.phase().allows_edits() {
                return Err(EditRejected::Locked(state.view()));
            }
            match index {
                Some(index) if index >= state.entries().len() => {
                    Err(EditRejected::NoSuchEntry(state.view()))
                }
                _ => Ok(()),
            }
        })
    }

    fn apply<E>(
        self: &Arc<Self>,
        msg: Msg,
        check: impl FnOnce(&SessionState) -> Result<(), E>,
    ) -> Result<Dispatched, E> {
        let (view, effects, changed) = {
            let mut guard = self.session.lock().unwrap_or_else(PoisonError::into_inner);
            check(&*guard)?;
            let state = std::mem::take(&mut *guard);
            let (mut state, effects) = update(state, msg);
            let changed = state.consume_dirty();
            let view = state.view();
            *guard = state;
            (view, effects, changed)
        };

        if changed {
            stitch_debug!(
                "session phase={} entries={}",
                view.phase.name(),
                view.entries.len()
            );
        }
        self.runner.enqueue(self, effects.clone());

        Ok(Dispatched {
            view,
            effects,
            changed,
        })
    }
}
