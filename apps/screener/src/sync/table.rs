use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::models::analysis::AnalysisResult;

/// Column name → value, as the external table stores a row.
pub type RecordFields = Map<String, Value>;

/// Natural identity of a published row: one row per (candidate, job).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub candidate_id: Uuid,
    pub job_id: Uuid,
}

impl From<&AnalysisResult> for RecordKey {
    fn from(result: &AnalysisResult) -> Self {
        Self {
            candidate_id: result.candidate_id,
            job_id: result.job_id,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.candidate_id, self.job_id)
    }
}

#[derive(Debug, Clone)]
pub struct TableRecord {
    pub record_id: String,
    pub fields: RecordFields,
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Table API error (code {code}): {message}")]
    Api { code: i64, message: String },

    #[error("Unreadable table response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Batch of {size} exceeds the table limit of {max}")]
    BatchTooLarge { size: usize, max: usize },
}

/// Record id written by an upsert, and whether the row already existed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upserted {
    Created(String),
    Updated(String),
}

/// The external table results are published to.
#[async_trait]
pub trait TabularStore: Send + Sync {
    /// Most rows a single batch call accepts.
    fn max_batch_size(&self) -> usize;

    async fn find(&self, key: &RecordKey) -> Result<Option<TableRecord>, TableError>;

    async fn batch_create(&self, rows: Vec<RecordFields>) -> Result<Vec<String>, TableError>;

    async fn batch_update(
        &self,
        rows: Vec<(String, RecordFields)>,
    ) -> Result<Vec<String>, TableError>;

    /// Record ids of the rows that already exist for `keys`.
    async fn find_many(&self, keys: &[RecordKey]) -> Result<HashMap<RecordKey, String>, TableError> {
        let mut found = HashMap::new();
        for key in keys {
            if let Some(record) = self.find(key).await? {
                found.insert(*key, record.record_id);
            }
        }
        Ok(found)
    }

    /// Updates the row for `key` in place, or creates it.
    async fn upsert(&self, key: &RecordKey, fields: RecordFields) -> Result<Upserted, TableError> {
        let existing = self.find(key).await?;
        let updating = existing.is_some();
        let mut ids = match existing {
            Some(existing) => self.batch_update(vec![(existing.record_id, fields)]).await?,
            None => self.batch_create(vec![fields]).await?,
        };
        let id = ids.pop().ok_or_else(|| TableError::Api {
            code: -1,
            message: format!("no record id returned for {key}"),
        })?;
        Ok(if updating {
            Upserted::Updated(id)
        } else {
            Upserted::Created(id)
        })
    }
}
