use std::sync::{Mutex, PoisonError};

use stitch_engine::{OutputResource, RunId};

/// Holds the downloadable output of the latest successful run.
#[derive(Default)]
pub struct OutputStore {
    current: Mutex<Option<OutputResource>>,
}

impl OutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces whatever was stored before.
    pub fn put(&self, output: OutputResource) {
        *self.lock() = Some(output);
    }

    pub fn get(&self, run_id: RunId) -> Option<OutputResource> {
        self.lock()
            .as_ref()
            .filter(|output| output.run_id == run_id)
            .cloned()
    }

    /// Returns whether an output for `run_id` was held.
    pub fn release(&self, run_id: RunId) -> bool {
        let mut current = self.lock();
        if current.as_ref().is_some_and(|output| output.run_id == run_id) {
            *current = None;
            true
        } else {
            false
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<OutputResource>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
