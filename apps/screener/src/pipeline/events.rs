//! Typed event bus for run observers, plus the channel stages report through.
//!
//! Observers subscribe to one event kind (or all of them) and get a handle
//! back; dispatch is synchronous and in registration order. A failing or
//! panicking handler is logged and skipped.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, warn};
use uuid::Uuid;

use super::run::{PipelineStep, Progress, RunError};

// ────────────────────────────────────────────────────────────────────────────
// Observer events
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StepStarted,
    StepCompleted,
    ProgressUpdated,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineEvent {
    StepStarted { run_id: Uuid, step: PipelineStep },
    StepCompleted { run_id: Uuid, step: PipelineStep },
    ProgressUpdated { run_id: Uuid, progress: Progress },
    Error { run_id: Uuid, error: RunError },
}

impl PipelineEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PipelineEvent::StepStarted { .. } => EventKind::StepStarted,
            PipelineEvent::StepCompleted { .. } => EventKind::StepCompleted,
            PipelineEvent::ProgressUpdated { .. } => EventKind::ProgressUpdated,
            PipelineEvent::Error { .. } => EventKind::Error,
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&PipelineEvent) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    kind: Option<EventKind>,
    handler: EventHandler,
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    entries: Vec<Subscription>,
}

#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Subscribers>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to a single event kind.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&PipelineEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(Some(kind), Arc::new(handler))
    }

    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&PipelineEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(None, Arc::new(handler))
    }

    /// Returns false if the handle was unknown (already removed).
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = lock(&self.subscribers);
        let before = subscribers.entries.len();
        subscribers.entries.retain(|s| s.id != id);
        subscribers.entries.len() != before
    }

    pub fn publish(&self, event: &PipelineEvent) {
        // Snapshot so handlers may (un)subscribe while being called.
        let handlers: Vec<(SubscriptionId, EventHandler)> = lock(&self.subscribers)
            .entries
            .iter()
            .filter(|s| s.kind.map_or(true, |k| k == event.kind()))
            .map(|s| (s.id, s.handler.clone()))
            .collect();

        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Event subscriber {:?} failed on {:?}: {e:#}", id, event.kind()),
                Err(_) => error!("Event subscriber {:?} panicked on {:?}", id, event.kind()),
            }
        }
    }

    fn register(&self, kind: Option<EventKind>, handler: EventHandler) -> SubscriptionId {
        let mut subscribers = lock(&self.subscribers);
        subscribers.next_id += 1;
        let id = SubscriptionId(subscribers.next_id);
        subscribers.entries.push(Subscription { id, kind, handler });
        id
    }
}

fn lock(m: &Mutex<Subscribers>) -> std::sync::MutexGuard<'_, Subscribers> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ────────────────────────────────────────────────────────────────────────────
// Stage → orchestrator reporting
// ────────────────────────────────────────────────────────────────────────────

/// What a stage reports while it works. The orchestrator folds these into
/// the run record; stages never touch the run directly.
#[derive(Debug, Clone)]
pub enum StageEvent {
    CandidateFound {
        candidate_id: Uuid,
        name: String,
        created: bool,
    },
    PageProcessed {
        page: u32,
        extracted: usize,
        failed: usize,
    },
    CandidateAnalyzed {
        candidate_id: Uuid,
        overall_score: f64,
        reused: bool,
    },
    ChunkSynced {
        chunk: usize,
        records: usize,
    },
    ItemFailed {
        step: PipelineStep,
        item: Option<String>,
        message: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct StageReporter {
    tx: Option<mpsc::UnboundedSender<StageEvent>>,
}

impl StageReporter {
    pub fn new(tx: mpsc::UnboundedSender<StageEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A reporter that drops everything.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: StageEvent) {
        if let Some(tx) = &self.tx {
            // Receiver gone means the run is being torn down.
            let _ = tx.send(event);
        }
    }

    pub fn item_failed(&self, step: PipelineStep, item: Option<String>, message: impl Into<String>) {
        self.emit(StageEvent::ItemFailed {
            step,
            item,
            message: message.into(),
        });
    }
}
