use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collection::SearchParams;
use crate::models::analysis::AnalysisResult;
use crate::models::candidate::CandidateRecord;
use crate::models::job::Job;
use crate::scoring::{round2, ScoreWeights};

/// Init, Collection, Analysis, Sync.
pub const TOTAL_STEPS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    /// Running or Paused: the states that block a new run.
    pub fn is_active(self) -> bool {
        matches!(self, RunStatus::Running | RunStatus::Paused)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Init,
    Collection,
    Analysis,
    Sync,
    Completed,
}

impl PipelineStep {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStep::Init => "init",
            PipelineStep::Collection => "collection",
            PipelineStep::Analysis => "analysis",
            PipelineStep::Sync => "sync",
            PipelineStep::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub collected: usize,
    pub analyzed: usize,
    pub synced: usize,
    pub errors: usize,
    pub completed_steps: u32,
    pub total_steps: u32,
}

impl Progress {
    pub fn new() -> Self {
        Self {
            total_steps: TOTAL_STEPS,
            ..Default::default()
        }
    }

    pub fn percentage(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        round2(self.completed_steps as f64 / self.total_steps as f64 * 100.0)
    }
}

/// One entry in a run's error list. Nothing that goes wrong is dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    pub step: PipelineStep,
    /// Identity of the page, candidate or chunk involved, when there is one.
    pub item: Option<String>,
    pub message: String,
    /// True when the error ended the run.
    pub fatal: bool,
    pub occurred_at: DateTime<Utc>,
}

impl RunError {
    pub fn isolated(step: PipelineStep, item: Option<String>, message: impl Into<String>) -> Self {
        Self {
            step,
            item,
            message: message.into(),
            fatal: false,
            occurred_at: Utc::now(),
        }
    }

    pub fn fatal(step: PipelineStep, message: impl Into<String>) -> Self {
        Self {
            step,
            item: None,
            message: message.into(),
            fatal: true,
            occurred_at: Utc::now(),
        }
    }
}

/// Caller-supplied knobs for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub search_params: SearchParams,
    pub max_candidates: usize,
    #[serde(default)]
    pub weights: ScoreWeights,
    #[serde(default)]
    pub force_reanalysis: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub job_title: String,
    pub status: RunStatus,
    pub current_step: PipelineStep,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<f64>,
    pub collected: usize,
    pub analyzed: usize,
    pub synced: usize,
    pub errors: usize,
    /// Mean of analyzed/collected and synced/analyzed, as a percentage.
    pub success_rate: f64,
}

/// The record of one pipeline run. Mutated only by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub job: Job,
    pub search_params: SearchParams,
    pub max_candidates: usize,
    pub weights: ScoreWeights,
    pub force_reanalysis: bool,
    pub status: RunStatus,
    pub current_step: PipelineStep,
    pub progress: Progress,
    pub collected: Vec<CandidateRecord>,
    pub analyzed: Vec<AnalysisResult>,
    /// External record ids returned by the tabular store.
    pub synced: Vec<String>,
    pub errors: Vec<RunError>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub summary: Option<RunSummary>,
}

impl PipelineRun {
    pub fn new(job: Job, request: RunRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            job,
            search_params: request.search_params,
            max_candidates: request.max_candidates,
            weights: request.weights,
            force_reanalysis: request.force_reanalysis,
            status: RunStatus::Pending,
            current_step: PipelineStep::Init,
            progress: Progress::new(),
            collected: Vec::new(),
            analyzed: Vec::new(),
            synced: Vec::new(),
            errors: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
            summary: None,
        }
    }

    pub fn record_error(&mut self, error: RunError) {
        self.errors.push(error);
        self.progress.errors = self.errors.len();
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds() as f64 / 1000.0)
    }

    pub fn success_rate(&self) -> f64 {
        let collected = self.progress.collected;
        if collected == 0 {
            return 0.0;
        }
        let analysis_rate = self.progress.analyzed as f64 / collected as f64;
        let sync_rate = if self.progress.analyzed == 0 {
            0.0
        } else {
            self.progress.synced as f64 / self.progress.analyzed as f64
        };
        round2((analysis_rate + sync_rate) / 2.0 * 100.0)
    }

    pub fn summarize(&self) -> RunSummary {
        RunSummary {
            run_id: self.id,
            job_title: self.job.title().to_string(),
            status: self.status,
            current_step: self.current_step,
            started_at: self.start_time,
            ended_at: self.end_time,
            duration_secs: self.duration_secs(),
            collected: self.progress.collected,
            analyzed: self.progress.analyzed,
            synced: self.progress.synced,
            errors: self.progress.errors,
            success_rate: self.success_rate(),
        }
    }

    /// Moves to a terminal status, stamps the end time and builds the summary.
    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        if self.end_time.is_none() {
            self.end_time = Some(Utc::now());
        }
        if status == RunStatus::Completed {
            self.current_step = PipelineStep::Completed;
        }
        self.summary = Some(self.summarize());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_job;

    fn run() -> PipelineRun {
        PipelineRun::new(
            sample_job(),
            RunRequest {
                search_params: SearchParams::default(),
                max_candidates: 10,
                weights: ScoreWeights::default(),
                force_reanalysis: false,
            },
        )
    }

    #[test]
    fn test_success_rate_averages_stage_ratios() {
        let mut run = run();
        run.progress.collected = 10;
        run.progress.analyzed = 8;
        run.progress.synced = 6;
        // (0.8 + 0.75) / 2
        assert_eq!(run.success_rate(), 77.5);
    }

    #[test]
    fn test_success_rate_zero_when_nothing_collected() {
        assert_eq!(run().success_rate(), 0.0);
    }

    #[test]
    fn test_finish_sets_summary_and_end_time() {
        let mut run = run();
        run.status = RunStatus::Running;
        run.finish(RunStatus::Completed);

        assert_eq!(run.current_step, PipelineStep::Completed);
        assert!(run.end_time.is_some());
        let summary = run.summary.as_ref().unwrap();
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.job_title, "Backend Engineer");
    }

    #[test]
    fn test_failed_run_keeps_furthest_step() {
        let mut run = run();
        run.current_step = PipelineStep::Analysis;
        run.finish(RunStatus::Failed);
        assert_eq!(run.current_step, PipelineStep::Analysis);
    }

    #[test]
    fn test_run_request_defaults() {
        let request: RunRequest =
            serde_json::from_value(serde_json::json!({"max_candidates": 5})).unwrap();
        assert_eq!(request.weights, ScoreWeights::default());
        assert!(!request.force_reanalysis);
    }

    #[test]
    fn test_progress_percentage() {
        let mut progress = Progress::new();
        progress.completed_steps = 1;
        assert_eq!(progress.percentage(), 25.0);
    }
}
