use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::run::{PipelineRun, RunStatus, RunSummary};
use crate::scoring::round2;

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Aggregates over every retained run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineStatistics {
    pub total_runs: usize,
    pub successful_runs: usize,
    pub failed_runs: usize,
    pub cancelled_runs: usize,
    /// Completed runs as a percentage of all runs.
    pub success_rate: f64,
    /// Mean over runs that have an end time.
    pub average_duration_secs: f64,
    pub total_collected: usize,
    pub total_analyzed: usize,
    pub total_synced: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Finished runs, oldest first. Once full, the oldest run is evicted.
#[derive(Debug)]
pub struct RunHistory {
    runs: VecDeque<PipelineRun>,
    capacity: usize,
}

impl RunHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            runs: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, run: PipelineRun) {
        if self.runs.len() == self.capacity {
            self.runs.pop_front();
        }
        self.runs.push_back(run);
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn get(&self, id: uuid::Uuid) -> Option<&PipelineRun> {
        self.runs.iter().find(|r| r.id == id)
    }

    /// Up to `limit` summaries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<RunSummary> {
        self.runs
            .iter()
            .rev()
            .take(limit)
            .map(|run| run.summary.clone().unwrap_or_else(|| run.summarize()))
            .collect()
    }

    pub fn statistics(&self) -> PipelineStatistics {
        let total_runs = self.runs.len();
        if total_runs == 0 {
            return PipelineStatistics::default();
        }

        let count = |status: RunStatus| self.runs.iter().filter(|r| r.status == status).count();
        let successful_runs = count(RunStatus::Completed);
        let durations: Vec<f64> = self.runs.iter().filter_map(|r| r.duration_secs()).collect();
        let average_duration_secs = if durations.is_empty() {
            0.0
        } else {
            round2(durations.iter().sum::<f64>() / durations.len() as f64)
        };

        PipelineStatistics {
            total_runs,
            successful_runs,
            failed_runs: count(RunStatus::Failed),
            cancelled_runs: count(RunStatus::Cancelled),
            success_rate: round2(successful_runs as f64 / total_runs as f64 * 100.0),
            average_duration_secs,
            total_collected: self.runs.iter().map(|r| r.progress.collected).sum(),
            total_analyzed: self.runs.iter().map(|r| r.progress.analyzed).sum(),
            total_synced: self.runs.iter().map(|r| r.progress.synced).sum(),
            last_updated: self.runs.iter().filter_map(|r| r.end_time).max(),
        }
    }
}
