//! Sync stage: publishes analysis results to the external table.
//!
//! One row per (candidate, job). Rows that already exist are updated in
//! place, the rest are created. Work is chunked to the table's batch limit
//! and a failed chunk does not undo the chunks before it.

pub mod bitable;
pub mod fields;
pub mod table;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::models::analysis::AnalysisResult;
use crate::models::candidate::CandidateRecord;
use crate::models::job::Job;
use crate::pipeline::control::RunSignal;
use crate::pipeline::events::{StageEvent, StageReporter};
use crate::pipeline::run::PipelineStep;

pub use bitable::BitableStore;
pub use table::{RecordFields, RecordKey, TableError, TabularStore, Upserted};

pub const DEFAULT_BATCH_SIZE: usize = bitable::MAX_BATCH_SIZE;

#[derive(Debug, Clone)]
pub struct ChunkFailure {
    pub chunk: usize,
    pub records: usize,
    /// Rows of this chunk that landed before the failing call.
    pub published: usize,
    pub message: String,
}

/// What one chunk wrote, and the call that stopped it, if any.
#[derive(Debug, Default)]
struct ChunkWrite {
    ids: Vec<String>,
    created: usize,
    updated: usize,
    error: Option<TableError>,
}

#[derive(Debug, Default)]
pub struct SyncOutcome {
    /// Table record ids written, in chunk order.
    pub record_ids: Vec<String>,
    pub created: usize,
    pub updated: usize,
    pub failures: Vec<ChunkFailure>,
    pub chunks: usize,
    pub cancelled: bool,
}

impl SyncOutcome {
    /// True when there was work to do and none of it landed.
    pub fn all_failed(&self) -> bool {
        self.chunks > 0
            && self.failures.len() == self.chunks
            && self.failures.iter().all(|f| f.published == 0)
    }
}

pub struct SyncStage {
    table: Arc<dyn TabularStore>,
    batch_size: usize,
}

impl SyncStage {
    pub fn new(table: Arc<dyn TabularStore>, batch_size: usize) -> Self {
        let batch_size = batch_size.clamp(1, table.max_batch_size().max(1));
        Self { table, batch_size }
    }

    pub async fn publish(
        &self,
        job: &Job,
        candidates: &[CandidateRecord],
        results: &[AnalysisResult],
        signal: &RunSignal,
        reporter: &StageReporter,
    ) -> SyncOutcome {
        let by_id: HashMap<Uuid, &CandidateRecord> =
            candidates.iter().map(|c| (c.id, c)).collect();

        // Last result for a key wins; first-seen order is kept.
        let mut order: Vec<RecordKey> = Vec::new();
        let mut rows: HashMap<RecordKey, RecordFields> = HashMap::new();
        for result in results {
            let key = RecordKey::from(result);
            let fields = fields::render_record(job, by_id.get(&result.candidate_id).copied(), result);
            if rows.insert(key, fields).is_none() {
                order.push(key);
            }
        }

        let mut outcome = SyncOutcome::default();
        if order.is_empty() {
            info!("Nothing to sync for '{}'", job.title());
            return outcome;
        }

        let chunks: Vec<&[RecordKey]> = order.chunks(self.batch_size).collect();
        outcome.chunks = chunks.len();
        info!(
            "Syncing {} records for '{}' in {} chunk(s)",
            order.len(),
            job.title(),
            chunks.len()
        );

        for (index, keys) in chunks.into_iter().enumerate() {
            if signal.checkpoint().await.is_err() {
                outcome.cancelled = true;
                break;
            }

            let chunk_rows: Vec<(RecordKey, RecordFields)> = keys
                .iter()
                .filter_map(|k| rows.remove(k).map(|f| (*k, f)))
                .collect();

            let written = self.write_chunk(chunk_rows).await;
            outcome.created += written.created;
            outcome.updated += written.updated;
            let published = written.ids.len();
            if published > 0 {
                reporter.emit(StageEvent::ChunkSynced {
                    chunk: index,
                    records: published,
                });
            }
            outcome.record_ids.extend(written.ids);

            if let Some(e) = written.error {
                warn!(
                    "Sync chunk {} ({} records, {} written) failed: {}",
                    index,
                    keys.len(),
                    published,
                    e
                );
                reporter.item_failed(
                    PipelineStep::Sync,
                    Some(format!("chunk {index}")),
                    e.to_string(),
                );
                outcome.failures.push(ChunkFailure {
                    chunk: index,
                    records: keys.len(),
                    published,
                    message: e.to_string(),
                });
            }
        }

        info!(
            "Sync finished: {} written ({} created, {} updated), {} chunk failure(s)",
            outcome.record_ids.len(),
            outcome.created,
            outcome.updated,
            outcome.failures.len()
        );
        outcome
    }

    async fn write_chunk(&self, mut rows: Vec<(RecordKey, RecordFields)>) -> ChunkWrite {
        let mut written = ChunkWrite::default();

        if rows.len() == 1 {
            if let Some((key, fields)) = rows.pop() {
                match self.table.upsert(&key, fields).await {
                    Ok(Upserted::Created(id)) => {
                        written.created = 1;
                        written.ids.push(id);
                    }
                    Ok(Upserted::Updated(id)) => {
                        written.updated = 1;
                        written.ids.push(id);
                    }
                    Err(e) => written.error = Some(e),
                }
            }
            return written;
        }

        let keys: Vec<RecordKey> = rows.iter().map(|(k, _)| *k).collect();
        let existing = match self.table.find_many(&keys).await {
            Ok(existing) => existing,
            Err(e) => {
                written.error = Some(e);
                return written;
            }
        };

        let mut updates = Vec::new();
        let mut creates = Vec::new();
        for (key, fields) in rows {
            match existing.get(&key) {
                Some(record_id) => updates.push((record_id.clone(), fields)),
                None => creates.push(fields),
            }
        }

        // Updates that landed stay counted even if the creates fail.
        if !updates.is_empty() {
            match self.table.batch_update(updates).await {
                Ok(ids) => {
                    written.updated = ids.len();
                    written.ids.extend(ids);
                }
                Err(e) => {
                    written.error = Some(e);
                    return written;
                }
            }
        }
        if !creates.is_empty() {
            match self.table.batch_create(creates).await {
                Ok(ids) => {
                    written.created = ids.len();
                    written.ids.extend(ids);
                }
                Err(e) => written.error = Some(e),
            }
        }
        written
    }
}
