//! Collection stage: pages through the listing source, extracts each item,
//! and resolves it against the record store by natural key.
//!
//! A failed item never aborts its page. A page that yields nothing, or a
//! source error, counts toward the breaker; the breaker opens after
//! `breaker_threshold` such pages in a row and the stage returns what it has.

pub mod feed;
pub mod pacing;
pub mod source;

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::candidate::{CandidateProfile, CandidateRecord, NewCandidate};
use crate::models::job::Job;
use crate::pipeline::control::RunSignal;
use crate::pipeline::events::{StageEvent, StageReporter};
use crate::pipeline::run::PipelineStep;
use crate::store::{RecordStore, StoreError};

pub use pacing::{DelayRange, Pacer, PacingConfig};
pub use source::{ListingSource, RawItem, SearchParams, SourceError};

pub const DEFAULT_BREAKER_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectionStats {
    pub pages: u32,
    pub items_seen: usize,
    pub extracted: usize,
    pub failed: usize,
    /// Items that resolved to a candidate already collected in this run.
    pub duplicates: usize,
    /// Candidates stored for the first time.
    pub created: usize,
    pub page_errors: usize,
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CollectionHalt {
    BreakerTripped {
        consecutive_failures: u32,
        last_error: String,
    },
    Cancelled,
}

#[derive(Debug)]
pub struct CollectionOutcome {
    pub candidates: Vec<CandidateRecord>,
    pub stats: CollectionStats,
    /// Why the stage stopped early, if it did. `candidates` still holds
    /// everything collected up to that point.
    pub halt: Option<CollectionHalt>,
}

#[derive(Debug, Error)]
enum HarvestError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct CollectionStage {
    source: Arc<dyn ListingSource>,
    store: Arc<dyn RecordStore>,
    pacer: Pacer,
    breaker_threshold: u32,
}

impl CollectionStage {
    pub fn new(
        source: Arc<dyn ListingSource>,
        store: Arc<dyn RecordStore>,
        pacing: PacingConfig,
        breaker_threshold: u32,
    ) -> Self {
        Self {
            source,
            store,
            pacer: Pacer::new(pacing),
            breaker_threshold: breaker_threshold.max(1),
        }
    }

    pub async fn collect(
        &self,
        job: &Job,
        search: &SearchParams,
        max_candidates: usize,
        signal: &RunSignal,
        reporter: &StageReporter,
    ) -> CollectionOutcome {
        info!(
            "Collecting up to {} candidates for '{}' from {}",
            max_candidates,
            job.title(),
            self.source.name()
        );

        let mut candidates: Vec<CandidateRecord> = Vec::new();
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut stats = CollectionStats::default();
        let mut cursor: Option<String> = None;
        let mut halt = None;

        'pages: while candidates.len() < max_candidates {
            if signal.checkpoint().await.is_err() {
                halt = Some(CollectionHalt::Cancelled);
                break;
            }

            let page_no = stats.pages + 1;
            let page = match self.source.next_page(search, cursor.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    stats.page_errors += 1;
                    stats.consecutive_failures += 1;
                    let last_error = format!("page {page_no}: {e}");
                    warn!("Listing page {} failed: {}", page_no, e);
                    reporter.item_failed(
                        PipelineStep::Collection,
                        Some(format!("page {page_no}")),
                        e.to_string(),
                    );
                    if stats.consecutive_failures >= self.breaker_threshold {
                        halt = Some(self.trip(&stats, &last_error));
                        break;
                    }
                    if self.pacer.after_error(signal).await.is_err() {
                        halt = Some(CollectionHalt::Cancelled);
                        break;
                    }
                    continue;
                }
            };
            stats.pages = page_no;

            if page.items.is_empty() {
                info!("Listing page {} is empty, end of results", page_no);
                break;
            }

            let mut page_extracted = 0usize;
            let mut page_failed = 0usize;
            let remaining = max_candidates - candidates.len();

            for (idx, item) in page.items.iter().take(remaining).enumerate() {
                if idx > 0 && self.pacer.between_items(signal).await.is_err() {
                    halt = Some(CollectionHalt::Cancelled);
                    break 'pages;
                }
                if signal.checkpoint().await.is_err() {
                    halt = Some(CollectionHalt::Cancelled);
                    break 'pages;
                }
                stats.items_seen += 1;

                match self.harvest(item).await {
                    Ok((record, created)) => {
                        page_extracted += 1;
                        stats.extracted += 1;
                        if created {
                            stats.created += 1;
                        }
                        if !seen.insert(record.id) {
                            stats.duplicates += 1;
                            continue;
                        }
                        reporter.emit(StageEvent::CandidateFound {
                            candidate_id: record.id,
                            name: record.name().to_string(),
                            created,
                        });
                        candidates.push(record);
                    }
                    Err(e) => {
                        page_failed += 1;
                        stats.failed += 1;
                        warn!("Failed to extract listing {}: {}", item.label(), e);
                        reporter.item_failed(
                            PipelineStep::Collection,
                            Some(item.label()),
                            e.to_string(),
                        );
                    }
                }
            }

            reporter.emit(StageEvent::PageProcessed {
                page: page_no,
                extracted: page_extracted,
                failed: page_failed,
            });
            info!(
                "Page {} done: {} extracted, {} failed, {} collected in total",
                page_no,
                page_extracted,
                page_failed,
                candidates.len()
            );

            if page_extracted == 0 {
                stats.consecutive_failures += 1;
                let last_error = format!("page {page_no} yielded no extractable items");
                if stats.consecutive_failures >= self.breaker_threshold {
                    halt = Some(self.trip(&stats, &last_error));
                    break;
                }
            } else {
                stats.consecutive_failures = 0;
            }

            if candidates.len() >= max_candidates {
                break;
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => {
                    info!("Reached the last listing page");
                    break;
                }
            }
            if self.pacer.between_pages(signal).await.is_err() {
                halt = Some(CollectionHalt::Cancelled);
                break;
            }
        }

        info!(
            "Collection finished: {} candidates, {} extracted, {} failed, {} pages",
            candidates.len(),
            stats.extracted,
            stats.failed,
            stats.pages
        );

        CollectionOutcome {
            candidates,
            stats,
            halt,
        }
    }

    fn trip(&self, stats: &CollectionStats, last_error: &str) -> CollectionHalt {
        warn!(
            "Collection breaker open after {} consecutive failed pages",
            stats.consecutive_failures
        );
        CollectionHalt::BreakerTripped {
            consecutive_failures: stats.consecutive_failures,
            last_error: last_error.to_string(),
        }
    }

    async fn harvest(&self, item: &RawItem) -> Result<(CandidateRecord, bool), HarvestError> {
        let detail = self.source.extract_detail(item).await?;
        let candidate = to_new_candidate(self.source.name(), detail)?;
        Ok(self.store.get_or_create_candidate(candidate).await?)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Detail → record conversion
// ────────────────────────────────────────────────────────────────────────────

/// Builds a `NewCandidate` from an extracted detail, normalising whitespace.
/// A detail without a source id, or with a name under two characters, is rejected.
pub fn to_new_candidate(source: &str, detail: RawItem) -> Result<NewCandidate, SourceError> {
    let source_id = detail
        .source_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SourceError::Invalid("listing detail has no source id".to_string()))?;

    let mut profile: CandidateProfile = serde_json::from_value(detail.data)?;
    if profile.source_url.is_none() {
        profile.source_url = detail.url;
    }
    normalize_profile(&mut profile);

    if profile.name.chars().count() < 2 {
        return Err(SourceError::Invalid(format!(
            "listing {source_id} has no usable candidate name"
        )));
    }

    Ok(NewCandidate {
        source: source.to_string(),
        source_id,
        profile,
    })
}

fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clean_opt(text: &mut Option<String>) {
    *text = text.take().map(|t| clean_text(&t)).filter(|t| !t.is_empty());
}

fn clean_list(items: &mut Vec<String>) {
    let mut seen = HashSet::new();
    items.retain_mut(|item| {
        *item = clean_text(item);
        !item.is_empty() && seen.insert(item.to_lowercase())
    });
}

fn normalize_profile(profile: &mut CandidateProfile) {
    profile.name = clean_text(&profile.name);
    clean_opt(&mut profile.summary);
    clean_opt(&mut profile.current_position);
    clean_opt(&mut profile.current_company);
    clean_opt(&mut profile.salary_expectation);
    clean_opt(&mut profile.contact.location);
    clean_list(&mut profile.skills);
    clean_list(&mut profile.languages);
    clean_list(&mut profile.certifications);

    for work in profile.work_experiences.iter_mut() {
        work.company = clean_text(&work.company);
        work.position = clean_text(&work.position);
        clean_opt(&mut work.description);
        clean_list(&mut work.responsibilities);
        clean_list(&mut work.achievements);
    }
    for project in profile.projects.iter_mut() {
        project.name = clean_text(&project.name);
        clean_opt(&mut project.description);
        clean_list(&mut project.technologies);
    }
}
