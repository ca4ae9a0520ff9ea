//! Pipeline orchestrator: owns the run record and sequences the stages.
//!
//! `start` validates the request, enforces the single-active-run rule and
//! spawns a task that drives Collection → Analysis → Sync. Stages report
//! back over a channel; only the driving task mutates the run. Pause and
//! cancel go through the run's `RunControl`. Every terminal run is copied
//! into history exactly once, by the driving task.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::control::{RunControl, RunSignal};
use super::error::{PipelineError, StageError};
use super::events::{EventBus, PipelineEvent, StageEvent, StageReporter};
use super::history::{PipelineStatistics, RunHistory, DEFAULT_HISTORY_CAPACITY};
use super::report::RunReportArchive;
use super::run::{PipelineRun, PipelineStep, Progress, RunError, RunRequest, RunStatus, RunSummary};
use crate::analysis::AnalysisStage;
use crate::collection::{CollectionHalt, CollectionStage};
use crate::models::job::Job;
use crate::sync::SyncStage;

/// The three stage instances a run is driven through.
pub struct Stages {
    pub collection: CollectionStage,
    pub analysis: AnalysisStage,
    pub sync: SyncStage,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub history_capacity: usize,
    /// Analysis is fatal once failures / candidates reaches this ratio.
    pub max_failure_ratio: f64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_failure_ratio: 1.0,
        }
    }
}

/// Returned by `start`. Awaiting `join` waits for the run to reach a
/// terminal state and land in history.
pub struct RunHandle {
    pub run_id: Uuid,
    pub join: JoinHandle<()>,
}

struct LiveRun {
    run: PipelineRun,
    control: RunControl,
}

struct State {
    /// Most recently started run.
    current: Option<Uuid>,
    /// Runs whose driving task has not finished yet.
    live: HashMap<Uuid, LiveRun>,
    history: RunHistory,
}

struct Inner {
    stages: Stages,
    events: EventBus,
    archive: Option<RunReportArchive>,
    settings: OrchestratorSettings,
    state: Mutex<State>,
}

fn stage_channel() -> (StageReporter, mpsc::UnboundedReceiver<StageEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (StageReporter::new(tx), rx)
}

/// How the driving task ended, before it is folded into a status.
enum Halt {
    Cancelled,
    Fatal(PipelineStep, StageError),
}

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        stages: Stages,
        settings: OrchestratorSettings,
        archive: Option<RunReportArchive>,
    ) -> Self {
        let history = RunHistory::new(settings.history_capacity);
        Self {
            inner: Arc::new(Inner {
                stages,
                events: EventBus::new(),
                archive,
                settings,
                state: Mutex::new(State {
                    current: None,
                    live: HashMap::new(),
                    history,
                }),
            }),
        }
    }

    /// Subscribe here to observe runs.
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn start(&self, job: Job, request: RunRequest) -> Result<RunHandle, PipelineError> {
        if request.max_candidates == 0 {
            return Err(PipelineError::InvalidRequest(
                "max_candidates must be at least 1".to_string(),
            ));
        }
        request
            .weights
            .validate()
            .map_err(PipelineError::InvalidRequest)?;

        let (run_id, signal, progress) = {
            let mut state = self.inner.lock();
            if let Some(active) = state.live.values().find(|l| l.run.status.is_active()) {
                return Err(PipelineError::AlreadyRunning(active.run.id));
            }

            let mut run = PipelineRun::new(job, request);
            run.status = RunStatus::Running;
            run.progress.completed_steps = 1;
            let control = RunControl::new();
            let signal = control.signal();
            let (run_id, progress) = (run.id, run.progress.clone());

            info!(
                "Starting run {} for '{}' (up to {} candidates)",
                run_id,
                run.job.title(),
                run.max_candidates
            );
            state.live.insert(run_id, LiveRun { run, control });
            state.current = Some(run_id);
            (run_id, signal, progress)
        };

        let events = &self.inner.events;
        events.publish(&PipelineEvent::StepStarted {
            run_id,
            step: PipelineStep::Init,
        });
        events.publish(&PipelineEvent::StepCompleted {
            run_id,
            step: PipelineStep::Init,
        });
        events.publish(&PipelineEvent::ProgressUpdated { run_id, progress });

        let join = tokio::spawn(self.inner.clone().drive(run_id, signal));
        Ok(RunHandle { run_id, join })
    }

    /// Snapshot of the most recently started run.
    pub fn status(&self) -> Option<PipelineRun> {
        let state = self.inner.lock();
        let id = state.current?;
        match state.live.get(&id) {
            Some(live) => Some(live.run.clone()),
            None => state.history.get(id).cloned(),
        }
    }

    /// Running → Paused. The stage stops at its next checkpoint.
    pub fn pause(&self) -> bool {
        self.transition(RunStatus::Running, RunStatus::Paused, |c| c.pause())
    }

    /// Paused → Running.
    pub fn resume(&self) -> bool {
        self.transition(RunStatus::Paused, RunStatus::Running, |c| c.resume())
    }

    /// Running or Paused → Cancelled, effective immediately. Partial results
    /// stay on the record; nothing already published is rolled back.
    pub fn cancel(&self) -> bool {
        let mut state = self.inner.lock();
        let Some(id) = state.current else {
            return false;
        };
        let Some(live) = state.live.get_mut(&id) else {
            return false;
        };
        if live.run.status.is_terminal() {
            return false;
        }
        live.run.status = RunStatus::Cancelled;
        live.control.cancel();
        info!("Run {} cancelled", live.run.id);
        true
    }

    pub fn history(&self, limit: usize) -> Vec<RunSummary> {
        self.inner.lock().history.recent(limit)
    }

    pub fn statistics(&self) -> PipelineStatistics {
        self.inner.lock().history.statistics()
    }

    fn transition(&self, from: RunStatus, to: RunStatus, signal: impl FnOnce(&RunControl)) -> bool {
        let mut state = self.inner.lock();
        let Some(id) = state.current else {
            return false;
        };
        let Some(live) = state.live.get_mut(&id) else {
            return false;
        };
        if live.run.status != from {
            return false;
        }
        live.run.status = to;
        signal(&live.control);
        info!("Run {} {:?} → {:?}", live.run.id, from, to);
        true
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Applies `f` to the live run, if it is still live.
    fn with_run<T>(&self, run_id: Uuid, f: impl FnOnce(&mut PipelineRun) -> T) -> Option<T> {
        self.lock().live.get_mut(&run_id).map(|live| f(&mut live.run))
    }

    fn progress(&self, run_id: Uuid) -> Option<Progress> {
        self.with_run(run_id, |run| run.progress.clone())
    }

    fn publish_progress(&self, run_id: Uuid) {
        if let Some(progress) = self.progress(run_id) {
            self.events
                .publish(&PipelineEvent::ProgressUpdated { run_id, progress });
        }
    }

    fn begin_step(&self, run_id: Uuid, step: PipelineStep) {
        self.with_run(run_id, |run| run.current_step = step);
        info!("Run {}: {} started", run_id, step.as_str());
        self.events
            .publish(&PipelineEvent::StepStarted { run_id, step });
    }

    fn complete_step(&self, run_id: Uuid, step: PipelineStep) {
        self.with_run(run_id, |run| run.progress.completed_steps += 1);
        info!("Run {}: {} completed", run_id, step.as_str());
        self.events
            .publish(&PipelineEvent::StepCompleted { run_id, step });
        self.publish_progress(run_id);
    }

    fn record_error(&self, run_id: Uuid, error: RunError) {
        self.with_run(run_id, |run| run.record_error(error.clone()));
        self.events.publish(&PipelineEvent::Error { run_id, error });
    }

    /// Folds one stage report into the run record.
    fn apply(&self, run_id: Uuid, event: StageEvent) {
        match event {
            StageEvent::CandidateFound { name, created, .. } => {
                debug!("Run {}: found {} (new: {})", run_id, name, created);
                self.with_run(run_id, |run| run.progress.collected += 1);
                self.publish_progress(run_id);
            }
            StageEvent::PageProcessed { page, extracted, failed } => {
                debug!("Run {}: page {} gave {} ok / {} failed", run_id, page, extracted, failed);
            }
            StageEvent::CandidateAnalyzed { .. } => {
                self.with_run(run_id, |run| run.progress.analyzed += 1);
                self.publish_progress(run_id);
            }
            StageEvent::ChunkSynced { records, .. } => {
                self.with_run(run_id, |run| run.progress.synced += records);
                self.publish_progress(run_id);
            }
            StageEvent::ItemFailed { step, item, message } => {
                self.record_error(run_id, RunError::isolated(step, item, message));
            }
        }
    }

    /// Runs a stage future while folding its reports into the run, in order.
    async fn pump<T>(
        &self,
        run_id: Uuid,
        mut reports: mpsc::UnboundedReceiver<StageEvent>,
        stage: impl Future<Output = T>,
    ) -> T {
        tokio::pin!(stage);
        loop {
            tokio::select! {
                biased;
                Some(event) = reports.recv() => self.apply(run_id, event),
                output = &mut stage => {
                    while let Ok(event) = reports.try_recv() {
                        self.apply(run_id, event);
                    }
                    return output;
                }
            }
        }
    }

    async fn drive(self: Arc<Self>, run_id: Uuid, signal: RunSignal) {
        let halt = self.execute(run_id, &signal).await.err();
        if matches!(halt, Some(Halt::Fatal(..))) {
            // A paused run fails only after resume; a cancel keeps it Cancelled.
            let _ = signal.checkpoint().await;
        }
        self.finalize(run_id, halt).await;
    }

    async fn execute(&self, run_id: Uuid, signal: &RunSignal) -> Result<(), Halt> {
        let Some((job, search, max, weights, force)) = self.with_run(run_id, |run| {
            (
                run.job.clone(),
                run.search_params.clone(),
                run.max_candidates,
                run.weights.clone(),
                run.force_reanalysis,
            )
        }) else {
            return Err(Halt::Cancelled);
        };

        // ── Collection ───────────────────────────────────────────────────────
        signal.checkpoint().await.map_err(|_| Halt::Cancelled)?;
        self.begin_step(run_id, PipelineStep::Collection);
        let (reporter, reports) = stage_channel();
        let outcome = self
            .pump(
                run_id,
                reports,
                self.stages
                    .collection
                    .collect(&job, &search, max, signal, &reporter),
            )
            .await;

        let candidates = outcome.candidates;
        self.with_run(run_id, |run| {
            run.progress.collected = candidates.len();
            run.collected = candidates.clone();
        });
        match outcome.halt {
            Some(CollectionHalt::Cancelled) => return Err(Halt::Cancelled),
            Some(CollectionHalt::BreakerTripped {
                consecutive_failures,
                last_error,
            }) => {
                if candidates.is_empty() {
                    return Err(Halt::Fatal(
                        PipelineStep::Collection,
                        StageError::BreakerTripped {
                            consecutive_failures,
                            last_error,
                        },
                    ));
                }
                self.record_error(
                    run_id,
                    RunError::isolated(
                        PipelineStep::Collection,
                        None,
                        format!(
                            "stopped after {consecutive_failures} failed pages, keeping {} candidates: {last_error}",
                            candidates.len()
                        ),
                    ),
                );
            }
            None => {}
        }
        self.complete_step(run_id, PipelineStep::Collection);

        // ── Analysis ─────────────────────────────────────────────────────────
        signal.checkpoint().await.map_err(|_| Halt::Cancelled)?;
        self.begin_step(run_id, PipelineStep::Analysis);
        let (reporter, reports) = stage_channel();
        let outcome = self
            .pump(
                run_id,
                reports,
                self.stages
                    .analysis
                    .analyze_batch(&candidates, &job, &weights, force, signal, &reporter),
            )
            .await;

        let results = outcome.results;
        self.with_run(run_id, |run| {
            run.progress.analyzed = results.len();
            run.analyzed = results.clone();
        });
        if outcome.cancelled {
            return Err(Halt::Cancelled);
        }
        let total = candidates.len();
        let failed = outcome.failures.len();
        if total > 0 && failed as f64 / total as f64 >= self.settings.max_failure_ratio {
            return Err(Halt::Fatal(
                PipelineStep::Analysis,
                StageError::AnalysisFailed { failed, total },
            ));
        }
        self.complete_step(run_id, PipelineStep::Analysis);

        // ── Sync ─────────────────────────────────────────────────────────────
        signal.checkpoint().await.map_err(|_| Halt::Cancelled)?;
        self.begin_step(run_id, PipelineStep::Sync);
        let (reporter, reports) = stage_channel();
        let outcome = self
            .pump(
                run_id,
                reports,
                self.stages
                    .sync
                    .publish(&job, &candidates, &results, signal, &reporter),
            )
            .await;

        self.with_run(run_id, |run| {
            run.progress.synced = outcome.record_ids.len();
            run.synced = outcome.record_ids.clone();
        });
        if outcome.cancelled {
            return Err(Halt::Cancelled);
        }
        if outcome.all_failed() {
            let last_error = outcome
                .failures
                .last()
                .map(|f| f.message.clone())
                .unwrap_or_default();
            return Err(Halt::Fatal(
                PipelineStep::Sync,
                StageError::SyncFailed {
                    chunks: outcome.chunks,
                    last_error,
                },
            ));
        }
        self.complete_step(run_id, PipelineStep::Sync);

        signal.checkpoint().await.map_err(|_| Halt::Cancelled)
    }

    async fn finalize(&self, run_id: Uuid, halt: Option<Halt>) {
        if let Some(Halt::Fatal(step, error)) = &halt {
            warn!("Run {} failed during {}: {}", run_id, step.as_str(), error);
            self.record_error(run_id, RunError::fatal(*step, error.to_string()));
        }

        let finished = {
            let mut state = self.lock();
            let Some(LiveRun { mut run, .. }) = state.live.remove(&run_id) else {
                return;
            };
            let status = match halt {
                _ if run.status == RunStatus::Cancelled => RunStatus::Cancelled,
                None => RunStatus::Completed,
                Some(Halt::Cancelled) => RunStatus::Cancelled,
                Some(Halt::Fatal(..)) => RunStatus::Failed,
            };
            run.finish(status);
            state.history.push(run.clone());
            run
        };

        if let Some(summary) = &finished.summary {
            info!(
                "Run {} {:?} in {:.1}s: {} collected, {} analyzed, {} synced, {} errors ({}% success)",
                run_id,
                summary.status,
                summary.duration_secs.unwrap_or_default(),
                summary.collected,
                summary.analyzed,
                summary.synced,
                summary.errors,
                summary.success_rate
            );
        }
        if finished.status == RunStatus::Completed {
            self.events.publish(&PipelineEvent::ProgressUpdated {
                run_id,
                progress: finished.progress.clone(),
            });
        }
        if let Some(archive) = &self.archive {
            archive.archive(&finished).await;
        }
    }
}
