//! Persistent record store for jobs, candidates and analysis results.
//!
//! The pipeline only talks to `dyn RecordStore`; `PgRecordStore` is wired in
//! at startup and `MemoryRecordStore` stands in for it under test.

pub mod handlers;
#[cfg(test)]
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::models::analysis::AnalysisResult;
use crate::models::candidate::{CandidateRecord, NaturalKey, NewCandidate};
use crate::models::job::{Job, JobPosting};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt stored document: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Create/read/update by key for the three record kinds the pipeline touches.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ── Candidates ──────────────────────────────────────────────────────────

    async fn find_candidate_by_key(
        &self,
        key: &NaturalKey,
    ) -> Result<Option<CandidateRecord>, StoreError>;

    /// Fails with `Conflict` when the natural key is already taken.
    async fn create_candidate(&self, candidate: NewCandidate)
        -> Result<CandidateRecord, StoreError>;

    async fn update_candidate(&self, record: CandidateRecord)
        -> Result<CandidateRecord, StoreError>;

    async fn get_candidate(&self, id: Uuid) -> Result<Option<CandidateRecord>, StoreError>;

    // ── Jobs ────────────────────────────────────────────────────────────────

    async fn create_job(&self, posting: JobPosting) -> Result<Job, StoreError>;

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    // ── Analysis results ────────────────────────────────────────────────────

    /// Most recent result for the (candidate, job) pair, if any.
    async fn find_analysis(
        &self,
        candidate_id: Uuid,
        job_id: Uuid,
    ) -> Result<Option<AnalysisResult>, StoreError>;

    async fn create_analysis(&self, result: &AnalysisResult) -> Result<(), StoreError>;

    async fn get_analysis(&self, id: Uuid) -> Result<Option<AnalysisResult>, StoreError>;

    /// Resolves a harvested profile against its natural key.
    ///
    /// An existing record keeps its id and `created_at`; its profile is
    /// refreshed with the new harvest. Returns the record and whether it was
    /// newly created. A concurrent insert of the same key resolves to the
    /// winner's record.
    async fn get_or_create_candidate(
        &self,
        candidate: NewCandidate,
    ) -> Result<(CandidateRecord, bool), StoreError> {
        let key = candidate.natural_key();
        if let Some(mut existing) = self.find_candidate_by_key(&key).await? {
            debug!("Candidate {} already stored as {}", key, existing.id);
            existing.profile = candidate.profile;
            return Ok((self.update_candidate(existing).await?, false));
        }

        match self.create_candidate(candidate).await {
            Ok(record) => Ok((record, true)),
            Err(StoreError::Conflict(_)) => self
                .find_candidate_by_key(&key)
                .await?
                .map(|record| (record, false))
                .ok_or_else(|| StoreError::NotFound(format!("candidate {key}"))),
            Err(e) => Err(e),
        }
    }
}
