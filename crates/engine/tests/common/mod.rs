//! Scripted in-memory store for engine tests. Timing uses tokio's clock,
//! so tests run with `start_paused = true` and are deterministic.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use tablesync_core::{Column, Document, Row, TableLimits};
use tablesync_engine::{EngineConfig, LoadOutcome, RemoteStore, SaveAck, Scope, SyncError};

pub const DEBOUNCE: Duration = Duration::from_millis(300);
pub const GRACE: Duration = Duration::from_millis(20);

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

pub fn scope() -> Scope {
    Scope::with_owner("financial", "dept-7")
}

pub fn config() -> EngineConfig {
    EngineConfig::default()
        .with_debounce(DEBOUNCE)
        .with_load_grace(GRACE)
        .with_limits(TableLimits::new(1, 2))
}

/// Default shape for a financial table.
pub fn defaults() -> Document {
    Document::new(
        vec![
            Column::new("metric", "Metric"),
            Column::new("2023", "2023"),
            Column::new("2024", "2024"),
        ],
        vec![Row::new("revenue").with_cell("metric", "Revenue")],
    )
}

/// What the server has stored.
pub fn remote() -> Document {
    let mut doc = Document::new(
        vec![Column::new("metric", "Metric"), Column::new("2024", "2024")],
        vec![
            Row::new("revenue").with_cell("metric", "Revenue").with_cell("2024", 1200.0),
            Row::new("cogs").with_cell("metric", "COGS").with_cell("2024", 400.0),
        ],
    );
    doc.updated_at = Some("2025-06-15T14:30:00Z".parse().unwrap());
    doc
}

#[derive(Debug, Clone)]
pub struct SaveCall {
    pub doc: Document,
    /// Offset from store creation.
    pub started: Duration,
    pub aborted: bool,
    pub completed: bool,
}

struct ScriptedSave {
    delay: Duration,
    result: Result<(), SyncError>,
    ignore_cancel: bool,
}

pub struct MockStore {
    epoch: Instant,
    loads: Mutex<VecDeque<(Duration, Result<LoadOutcome, SyncError>)>>,
    load_count: AtomicUsize,
    save_delay: Duration,
    script: Mutex<VecDeque<ScriptedSave>>,
    saves: Mutex<Vec<SaveCall>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            loads: Mutex::new(VecDeque::new()),
            load_count: AtomicUsize::new(0),
            save_delay: ms(100),
            script: Mutex::new(VecDeque::new()),
            saves: Mutex::new(Vec::new()),
        }
    }

    /// Next load resolves after `delay`. Unscripted loads return NotFound at once.
    pub fn then_load(self, delay: Duration, result: Result<LoadOutcome, SyncError>) -> Self {
        self.loads.lock().push_back((delay, result));
        self
    }

    pub fn with_save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = delay;
        self
    }

    /// Next save takes `delay` and returns `result`.
    pub fn then_save(self, delay: Duration, result: Result<(), SyncError>) -> Self {
        self.script.lock().push_back(ScriptedSave { delay, result, ignore_cancel: false });
        self
    }

    /// Next save answers after `delay` even if it was cancelled.
    pub fn then_save_ignoring_cancel(self, delay: Duration) -> Self {
        self.script.lock().push_back(ScriptedSave { delay, result: Ok(()), ignore_cancel: true });
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn saves(&self) -> Vec<SaveCall> {
        self.saves.lock().clone()
    }

    /// Offset of "now" from store creation, comparable with `SaveCall::started`.
    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }

    pub fn load_count(&self) -> usize {
        self.load_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStore for MockStore {
    async fn load(&self, _scope: &Scope) -> Result<LoadOutcome, SyncError> {
        self.load_count.fetch_add(1, Ordering::SeqCst);
        let next = self.loads.lock().pop_front();
        let (delay, result) = next.unwrap_or((Duration::ZERO, Ok(LoadOutcome::NotFound)));
        tokio::time::sleep(delay).await;
        result
    }

    async fn save(
        &self,
        _scope: &Scope,
        doc: &Document,
        cancel: &CancellationToken,
    ) -> Result<SaveAck, SyncError> {
        let index = {
            let mut saves = self.saves.lock();
            saves.push(SaveCall {
                doc: doc.clone(),
                started: self.epoch.elapsed(),
                aborted: false,
                completed: false,
            });
            saves.len() - 1
        };
        let next = self.script.lock().pop_front();
        let step = next.unwrap_or(ScriptedSave {
            delay: self.save_delay,
            result: Ok(()),
            ignore_cancel: false,
        });

        if step.ignore_cancel {
            tokio::time::sleep(step.delay).await;
        } else {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.saves.lock()[index].aborted = true;
                    return Err(SyncError::Aborted);
                }
                _ = tokio::time::sleep(step.delay) => {}
            }
        }

        self.saves.lock()[index].completed = true;
        step.result.map(|()| SaveAck { updated_at: Utc::now() })
    }
}
