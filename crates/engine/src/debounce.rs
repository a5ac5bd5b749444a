// Debounce scheduler.
//
// Each arm bumps a generation counter and replaces the pending timer task.
// A timer that wakes with a stale generation does nothing, so rapid edits
// coalesce into one fire at `last edit + delay`.

use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub(crate) struct Debouncer {
    generation: u64,
    armed: Option<u64>,
    timer: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any pending timer and reserve a generation for a new one.
    pub fn rearm(&mut self) -> u64 {
        self.cancel();
        self.generation += 1;
        self.armed = Some(self.generation);
        self.generation
    }

    pub fn set_timer(&mut self, generation: u64, timer: JoinHandle<()>) {
        if self.armed == Some(generation) {
            self.timer = Some(timer);
        } else {
            timer.abort();
        }
    }

    /// Called by the timer task on wake. True if it is still the live timer.
    /// The handle is released, not aborted: the caller is that task.
    pub fn fire(&mut self, generation: u64) -> bool {
        if self.armed != Some(generation) {
            return false;
        }
        self.armed = None;
        self.timer = None;
        true
    }

    pub fn cancel(&mut self) {
        self.armed = None;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }
}
