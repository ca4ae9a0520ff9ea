use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{RecordStore, StoreError};
use crate::models::analysis::AnalysisResult;
use crate::models::candidate::{CandidateRecord, NaturalKey, NewCandidate};
use crate::models::job::{Job, JobPosting};

#[derive(Default)]
struct Tables {
    candidates: HashMap<Uuid, CandidateRecord>,
    by_key: HashMap<NaturalKey, Uuid>,
    jobs: HashMap<Uuid, Job>,
    analyses: Vec<AnalysisResult>,
}

/// In-memory `RecordStore` with the same uniqueness rules as the Postgres one.
#[derive(Default)]
pub struct MemoryRecordStore {
    tables: Mutex<Tables>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn candidate_count(&self) -> usize {
        self.tables.lock().unwrap().candidates.len()
    }

    pub fn analysis_count(&self) -> usize {
        self.tables.lock().unwrap().analyses.len()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_candidate_by_key(
        &self,
        key: &NaturalKey,
    ) -> Result<Option<CandidateRecord>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .by_key
            .get(key)
            .and_then(|id| tables.candidates.get(id))
            .cloned())
    }

    async fn create_candidate(
        &self,
        candidate: NewCandidate,
    ) -> Result<CandidateRecord, StoreError> {
        let key = candidate.natural_key();
        let mut tables = self.tables.lock().unwrap();
        if tables.by_key.contains_key(&key) {
            return Err(StoreError::Conflict(format!("candidate {key} already exists")));
        }
        let record = candidate.into_record(Uuid::new_v4(), Utc::now());
        tables.by_key.insert(key, record.id);
        tables.candidates.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_candidate(
        &self,
        mut record: CandidateRecord,
    ) -> Result<CandidateRecord, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.candidates.contains_key(&record.id) {
            return Err(StoreError::NotFound(format!("candidate {}", record.id)));
        }
        record.updated_at = Utc::now();
        tables.candidates.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_candidate(&self, id: Uuid) -> Result<Option<CandidateRecord>, StoreError> {
        Ok(self.tables.lock().unwrap().candidates.get(&id).cloned())
    }

    async fn create_job(&self, posting: JobPosting) -> Result<Job, StoreError> {
        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4(),
            posting,
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().unwrap().jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(self.tables.lock().unwrap().jobs.get(&id).cloned())
    }

    async fn find_analysis(
        &self,
        candidate_id: Uuid,
        job_id: Uuid,
    ) -> Result<Option<AnalysisResult>, StoreError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .analyses
            .iter()
            .rev()
            .find(|a| a.candidate_id == candidate_id && a.job_id == job_id)
            .cloned())
    }

    async fn create_analysis(&self, result: &AnalysisResult) -> Result<(), StoreError> {
        self.tables.lock().unwrap().analyses.push(result.clone());
        Ok(())
    }

    async fn get_analysis(&self, id: Uuid) -> Result<Option<AnalysisResult>, StoreError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .analyses
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::new_candidate;

    #[tokio::test]
    async fn test_get_or_create_resolves_same_key_to_same_record() {
        let store = MemoryRecordStore::new();

        let (first, created) = store
            .get_or_create_candidate(new_candidate("boss", "u-1", "Li Lei"))
            .await
            .unwrap();
        assert!(created);

        let (second, created) = store
            .get_or_create_candidate(new_candidate("boss", "u-1", "Li Lei (updated)"))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.name(), "Li Lei (updated)");
        assert_eq!(store.candidate_count(), 1);
    }

    #[tokio::test]
    async fn test_same_source_id_on_other_source_is_distinct() {
        let store = MemoryRecordStore::new();
        store
            .get_or_create_candidate(new_candidate("boss", "u-1", "Li Lei"))
            .await
            .unwrap();
        store
            .get_or_create_candidate(new_candidate("zhilian", "u-1", "Han Meimei"))
            .await
            .unwrap();
        assert_eq!(store.candidate_count(), 2);
    }

    #[tokio::test]
    async fn test_create_candidate_rejects_duplicate_key() {
        let store = MemoryRecordStore::new();
        store
            .create_candidate(new_candidate("boss", "u-1", "Li Lei"))
            .await
            .unwrap();
        let err = store
            .create_candidate(new_candidate("boss", "u-1", "Li Lei"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }
}
