use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use super::{RecordStore, StoreError};
use crate::models::analysis::AnalysisResult;
use crate::models::candidate::{CandidateRecord, NaturalKey, NewCandidate};
use crate::models::job::{Job, JobPosting};

#[derive(Debug, FromRow)]
struct CandidateRow {
    id: Uuid,
    source: String,
    source_id: String,
    profile: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CandidateRow> for CandidateRecord {
    type Error = StoreError;

    fn try_from(row: CandidateRow) -> Result<Self, Self::Error> {
        Ok(CandidateRecord {
            id: row.id,
            source: row.source,
            source_id: row.source_id,
            profile: serde_json::from_value(row.profile)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct JobRow {
    id: Uuid,
    data: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: row.id,
            posting: serde_json::from_value(row.data)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AnalysisRow {
    data: Value,
}

/// `RecordStore` on PostgreSQL. Documents live in JSONB columns next to the
/// keys the pipeline looks them up by.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn find_candidate_by_key(
        &self,
        key: &NaturalKey,
    ) -> Result<Option<CandidateRecord>, StoreError> {
        sqlx::query_as::<_, CandidateRow>(
            "SELECT id, source, source_id, profile, created_at, updated_at \
             FROM candidates WHERE source = $1 AND source_id = $2",
        )
        .bind(&key.source)
        .bind(&key.source_id)
        .fetch_optional(&self.pool)
        .await?
        .map(CandidateRecord::try_from)
        .transpose()
    }

    async fn create_candidate(
        &self,
        candidate: NewCandidate,
    ) -> Result<CandidateRecord, StoreError> {
        let key = candidate.natural_key();
        let record = candidate.into_record(Uuid::new_v4(), Utc::now());
        let profile = serde_json::to_value(&record.profile)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO candidates (id, source, source_id, name, profile, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (source, source_id) DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(&record.source)
        .bind(&record.source_id)
        .bind(record.name())
        .bind(&profile)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(StoreError::Conflict(format!("candidate {key} already exists")));
        }

        info!("Created candidate {} ({})", record.id, key);
        Ok(record)
    }

    async fn update_candidate(
        &self,
        mut record: CandidateRecord,
    ) -> Result<CandidateRecord, StoreError> {
        record.updated_at = Utc::now();
        let profile = serde_json::to_value(&record.profile)?;

        let updated = sqlx::query(
            "UPDATE candidates SET name = $2, profile = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(record.id)
        .bind(record.name())
        .bind(&profile)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(StoreError::NotFound(format!("candidate {}", record.id)));
        }
        Ok(record)
    }

    async fn get_candidate(&self, id: Uuid) -> Result<Option<CandidateRecord>, StoreError> {
        sqlx::query_as::<_, CandidateRow>(
            "SELECT id, source, source_id, profile, created_at, updated_at \
             FROM candidates WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(CandidateRecord::try_from)
        .transpose()
    }

    async fn create_job(&self, posting: JobPosting) -> Result<Job, StoreError> {
        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4(),
            posting,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO jobs (id, title, company, data, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(job.id)
        .bind(&job.posting.title)
        .bind(&job.posting.company)
        .bind(serde_json::to_value(&job.posting)?)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        info!("Created job {} ({})", job.id, job.title());
        Ok(job)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        sqlx::query_as::<_, JobRow>(
            "SELECT id, data, created_at, updated_at FROM jobs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Job::try_from)
        .transpose()
    }

    async fn find_analysis(
        &self,
        candidate_id: Uuid,
        job_id: Uuid,
    ) -> Result<Option<AnalysisResult>, StoreError> {
        let row = sqlx::query_as::<_, AnalysisRow>(
            r#"
            SELECT data FROM analysis_results
            WHERE candidate_id = $1 AND job_id = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(candidate_id)
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| serde_json::from_value(r.data)).transpose()?)
    }

    async fn create_analysis(&self, result: &AnalysisResult) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO analysis_results (id, candidate_id, job_id, overall_score, data, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(result.id)
        .bind(result.candidate_id)
        .bind(result.job_id)
        .bind(result.overall_score)
        .bind(serde_json::to_value(result)?)
        .bind(result.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_analysis(&self, id: Uuid) -> Result<Option<AnalysisResult>, StoreError> {
        let row = sqlx::query_as::<_, AnalysisRow>("SELECT data FROM analysis_results WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| serde_json::from_value(r.data)).transpose()?)
    }
}
