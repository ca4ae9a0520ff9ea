//! Analysis stage: scores each collected candidate against the job.
//!
//! Work fans out under a semaphore (default 3 in flight). A candidate whose
//! analysis fails is logged, reported and left out; its siblings carry on.
//! Existing results for the (candidate, job) pair are reused unless the run
//! forces re-analysis.

pub mod llm_oracle;
pub mod oracle;
pub mod profile;
pub mod prompts;

use std::sync::Arc;
use std::time::Instant;

use futures::{stream::FuturesUnordered, StreamExt};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::analysis::AnalysisResult;
use crate::models::candidate::CandidateRecord;
use crate::models::job::Job;
use crate::pipeline::control::RunSignal;
use crate::pipeline::events::{StageEvent, StageReporter};
use crate::pipeline::run::PipelineStep;
use crate::scoring::ScoreWeights;
use crate::store::{RecordStore, StoreError};

pub use llm_oracle::LlmScoringOracle;
pub use oracle::{OracleError, OracleResponse, ScoringOracle};

pub const DEFAULT_CONCURRENCY: usize = 3;

#[derive(Debug, Clone)]
pub struct AnalysisFailure {
    pub candidate_id: Uuid,
    pub candidate: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct AnalysisOutcome {
    /// Successful results in completion order.
    pub results: Vec<AnalysisResult>,
    pub failures: Vec<AnalysisFailure>,
    /// How many of `results` were existing results reused as-is.
    pub reused: usize,
    /// Set when cancellation cut the batch short.
    pub cancelled: bool,
}

#[derive(Debug, Error)]
enum UnitError {
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("cancelled")]
    Cancelled,
}

pub struct AnalysisStage {
    oracle: Arc<dyn ScoringOracle>,
    store: Arc<dyn RecordStore>,
    concurrency: usize,
}

impl AnalysisStage {
    pub fn new(
        oracle: Arc<dyn ScoringOracle>,
        store: Arc<dyn RecordStore>,
        concurrency: usize,
    ) -> Self {
        Self {
            oracle,
            store,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn analyze_batch(
        &self,
        candidates: &[CandidateRecord],
        job: &Job,
        weights: &ScoreWeights,
        force_reanalysis: bool,
        signal: &RunSignal,
        reporter: &StageReporter,
    ) -> AnalysisOutcome {
        info!(
            "Analyzing {} candidates for '{}' ({} at a time)",
            candidates.len(),
            job.title(),
            self.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let job_text = profile::render_job(job);
        let mut tasks = FuturesUnordered::new();

        for candidate in candidates {
            let semaphore = semaphore.clone();
            let job_text = job_text.as_str();
            tasks.push(async move {
                let outcome = async {
                    let _permit = semaphore.acquire().await.map_err(|_| UnitError::Cancelled)?;
                    signal.checkpoint().await.map_err(|_| UnitError::Cancelled)?;
                    tokio::select! {
                        _ = signal.cancelled() => Err(UnitError::Cancelled),
                        result = self.analyze_one(candidate, job, job_text, weights, force_reanalysis) => result,
                    }
                }
                .await;
                (candidate, outcome)
            });
        }

        let mut outcome = AnalysisOutcome::default();
        while let Some((candidate, result)) = tasks.next().await {
            match result {
                Ok((analysis, reused)) => {
                    if reused {
                        outcome.reused += 1;
                    }
                    reporter.emit(StageEvent::CandidateAnalyzed {
                        candidate_id: candidate.id,
                        overall_score: analysis.overall_score,
                        reused,
                    });
                    outcome.results.push(analysis);
                }
                Err(UnitError::Cancelled) => outcome.cancelled = true,
                Err(e) => {
                    warn!("Analysis failed for {} ({}): {}", candidate.name(), candidate.id, e);
                    reporter.item_failed(
                        PipelineStep::Analysis,
                        Some(candidate.id.to_string()),
                        e.to_string(),
                    );
                    outcome.failures.push(AnalysisFailure {
                        candidate_id: candidate.id,
                        candidate: candidate.name().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Analysis finished: {} results ({} reused), {} failures{}",
            outcome.results.len(),
            outcome.reused,
            outcome.failures.len(),
            if outcome.cancelled { ", cancelled" } else { "" }
        );
        outcome
    }

    async fn analyze_one(
        &self,
        candidate: &CandidateRecord,
        job: &Job,
        job_text: &str,
        weights: &ScoreWeights,
        force_reanalysis: bool,
    ) -> Result<(AnalysisResult, bool), UnitError> {
        if !force_reanalysis {
            if let Some(existing) = self.store.find_analysis(candidate.id, job.id).await? {
                return Ok((existing, true));
            }
        }

        let started = Instant::now();
        let candidate_text = profile::render_candidate(candidate);
        let response = self.oracle.score(&candidate_text, job_text).await?;
        response.validate()?;

        let result = response.into_result(
            candidate.id,
            job.id,
            weights,
            self.oracle.model(),
            started.elapsed().as_millis() as u64,
        );
        self.store.create_analysis(&result).await?;

        info!(
            "Scored {} for '{}': {:.2} ({})",
            candidate.name(),
            job.title(),
            result.overall_score,
            result.recommendation_level.as_str()
        );
        Ok((result, false))
    }
}
