//! Fixtures and scripted fakes for the collaborator traits.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::analysis::oracle::{OracleError, OracleResponse, OracleScore, ScoringOracle};
use crate::collection::source::{ListingPage, ListingSource, RawItem, SearchParams, SourceError};
use crate::models::analysis::{
    AnalysisResult, InterviewSuggestions, MatchAnalysis, RecommendationLevel, RiskAssessment,
    ScoreDimension,
};
use crate::models::candidate::{CandidateProfile, CandidateRecord, NewCandidate};
use crate::models::job::{
    EducationRequirement, ExperienceLevel, Job, JobPosting, JobRequirements, JobType, SalaryRange,
};
use crate::scoring::ScoreWeights;
use crate::sync::fields::key_of;
use crate::sync::table::{RecordFields, RecordKey, TableError, TableRecord, TabularStore};

// ────────────────────────────────────────────────────────────────────────────
// Fixtures
// ────────────────────────────────────────────────────────────────────────────

pub fn sample_job() -> Job {
    let now = Utc::now();
    Job {
        id: Uuid::new_v4(),
        posting: JobPosting {
            title: "Backend Engineer".to_string(),
            company: "Acme Robotics".to_string(),
            department: Some("Platform".to_string()),
            location: "Shanghai".to_string(),
            job_type: JobType::FullTime,
            description: "Build and run the order services".to_string(),
            responsibilities: vec!["Own the order API".to_string()],
            requirements: JobRequirements {
                experience_level: ExperienceLevel::Mid,
                min_years: Some(3),
                max_years: Some(5),
                education: EducationRequirement::Bachelor,
                required_skills: vec!["Python".to_string(), "SQL".to_string()],
                preferred_skills: vec!["Go".to_string()],
                ..Default::default()
            },
            salary_range: Some(SalaryRange {
                min_salary: Some(20000),
                max_salary: Some(35000),
                currency: "CNY".to_string(),
                unit: "monthly".to_string(),
                negotiable: false,
            }),
            benefits: vec![],
        },
        created_at: now,
        updated_at: now,
    }
}

pub fn new_candidate(source: &str, source_id: &str, name: &str) -> NewCandidate {
    NewCandidate {
        source: source.to_string(),
        source_id: source_id.to_string(),
        profile: CandidateProfile {
            name: name.to_string(),
            skills: vec!["Python".to_string(), "SQL".to_string()],
            years_of_experience: Some(4),
            ..Default::default()
        },
    }
}

pub fn candidate_record(source: &str, source_id: &str, name: &str) -> CandidateRecord {
    new_candidate(source, source_id, name).into_record(Uuid::new_v4(), Utc::now())
}

pub fn listing_item(source_id: &str, name: &str) -> RawItem {
    RawItem {
        source_id: Some(source_id.to_string()),
        url: None,
        data: json!({ "name": name, "skills": ["Python", "SQL"] }),
    }
}

/// A well-formed response scoring every dimension `raw`, in canonical order.
pub fn oracle_response(raw: f64) -> OracleResponse {
    OracleResponse {
        overall_score: None,
        recommendation_level: RecommendationLevel::Recommended,
        score_details: ScoreDimension::ALL
            .iter()
            .map(|d| OracleScore {
                dimension: *d,
                score: raw,
                weight: None,
                explanation: format!("{} is adequate", d.label()),
                evidence: vec![],
                suggestions: vec![],
            })
            .collect(),
        match_analysis: MatchAnalysis {
            matched_skills: vec!["Python".to_string(), "SQL".to_string()],
            skill_match_rate: 1.0,
            experience_match: true,
            education_match: true,
            location_match: true,
            ..Default::default()
        },
        risk_assessment: RiskAssessment::default(),
        interview_suggestions: InterviewSuggestions {
            recommended_questions: vec!["Describe a schema migration you led".to_string()],
            ..Default::default()
        },
        summary: "Solid backend profile".to_string(),
        strengths: vec!["Python".to_string()],
        weaknesses: vec![],
        recommendations: vec!["Proceed to interview".to_string()],
    }
}

pub fn analysis_result(candidate: &CandidateRecord, job: &Job, raw: f64) -> AnalysisResult {
    oracle_response(raw).into_result(candidate.id, job.id, &ScoreWeights::default(), "test-model", 5)
}

// ────────────────────────────────────────────────────────────────────────────
// Listing source
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum PageScript {
    /// Items for one page; `true` when another page follows.
    Items(Vec<RawItem>, bool),
    /// The page fetch fails with this message.
    Error(String),
}

/// Serves scripted pages in order, then empty pages forever.
pub struct ScriptedSource {
    script: Mutex<VecDeque<PageScript>>,
    failing_details: HashSet<String>,
    pages_served: AtomicUsize,
    cursors: Mutex<Vec<Option<String>>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<PageScript>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            failing_details: HashSet::new(),
            pages_served: AtomicUsize::new(0),
            cursors: Mutex::new(Vec::new()),
        }
    }

    /// Detail extraction fails for these source ids.
    pub fn failing_details(mut self, ids: &[&str]) -> Self {
        self.failing_details = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    /// The cursor passed to every `next_page` call so far.
    pub fn cursors(&self) -> Vec<Option<String>> {
        self.cursors.lock().unwrap().clone()
    }
}

#[async_trait]
impl ListingSource for ScriptedSource {
    fn name(&self) -> &str {
        "boss"
    }

    async fn next_page(
        &self,
        _search: &SearchParams,
        cursor: Option<&str>,
    ) -> Result<ListingPage, SourceError> {
        self.cursors.lock().unwrap().push(cursor.map(str::to_string));
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(PageScript::Items(items, more)) => {
                let n = self.pages_served.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(ListingPage {
                    items,
                    next_cursor: more.then(|| format!("cursor-{n}")),
                })
            }
            Some(PageScript::Error(message)) => Err(SourceError::Unavailable(message)),
            None => Ok(ListingPage::default()),
        }
    }

    async fn extract_detail(&self, item: &RawItem) -> Result<RawItem, SourceError> {
        match item.source_id.as_deref() {
            Some(id) if self.failing_details.contains(id) => {
                Err(SourceError::Unavailable(format!("detail page for {id} timed out")))
            }
            _ => Ok(item.clone()),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Scoring oracle
// ────────────────────────────────────────────────────────────────────────────

/// Scores every dimension `raw`. Candidates are told apart by the
/// `Name:` line of their rendered text.
pub struct ScriptedOracle {
    raw: f64,
    failing: HashSet<String>,
    malformed: HashSet<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedOracle {
    pub fn new(raw: f64) -> Self {
        Self {
            raw,
            failing: HashSet::new(),
            malformed: HashSet::new(),
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing_for(mut self, names: &[&str]) -> Self {
        self.failing = names.iter().map(|s| s.to_string()).collect();
        self
    }

    /// These candidates get a response missing most dimensions.
    pub fn malformed_for(mut self, names: &[&str]) -> Self {
        self.malformed = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoringOracle for ScriptedOracle {
    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn score(
        &self,
        candidate_text: &str,
        _job_text: &str,
    ) -> Result<OracleResponse, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let name = candidate_text
            .lines()
            .next()
            .and_then(|l| l.strip_prefix("Name: "))
            .unwrap_or_default();
        if self.failing.contains(name) {
            return Err(OracleError::Unavailable(format!("scripted outage for {name}")));
        }

        let mut response = oracle_response(self.raw);
        if self.malformed.contains(name) {
            response.score_details.truncate(3);
        }
        Ok(response)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tabular store
// ────────────────────────────────────────────────────────────────────────────

/// In-memory table. Chunk failures are injected by lookup call index
/// (`find` or `find_many`, one per chunk).
pub struct MemoryTable {
    rows: Mutex<Vec<TableRecord>>,
    max_batch: usize,
    failing_chunks: HashSet<usize>,
    fail_all: bool,
    reject_creates: AtomicBool,
    lookups: AtomicUsize,
    create_calls: AtomicUsize,
    next_id: AtomicUsize,
}

impl MemoryTable {
    pub fn new(max_batch: usize) -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            max_batch,
            failing_chunks: HashSet::new(),
            fail_all: false,
            reject_creates: AtomicBool::new(false),
            lookups: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            next_id: AtomicUsize::new(0),
        }
    }

    /// The `n`th chunk (0-based, counted across runs) fails.
    pub fn failing_chunk(mut self, n: usize) -> Self {
        self.failing_chunks.insert(n);
        self
    }

    pub fn unreachable() -> Self {
        Self {
            fail_all: true,
            ..Self::new(500)
        }
    }

    /// From now on every `batch_create` fails; updates still land.
    pub fn reject_creates(&self) {
        self.reject_creates.store(true, Ordering::SeqCst);
    }

    pub fn rows(&self) -> Vec<RecordFields> {
        self.rows.lock().unwrap().iter().map(|r| r.fields.clone()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    fn lookup(&self) -> Result<(), TableError> {
        let n = self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_all || self.failing_chunks.contains(&n) {
            return Err(TableError::Api {
                code: 1254290,
                message: "TooManyRequest".to_string(),
            });
        }
        Ok(())
    }

    fn check_batch(&self, size: usize) -> Result<(), TableError> {
        if size > self.max_batch {
            return Err(TableError::BatchTooLarge {
                size,
                max: self.max_batch,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TabularStore for MemoryTable {
    fn max_batch_size(&self) -> usize {
        self.max_batch
    }

    async fn find(&self, key: &RecordKey) -> Result<Option<TableRecord>, TableError> {
        self.lookup()?;
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| key_of(&r.fields).as_ref() == Some(key))
            .cloned())
    }

    async fn find_many(
        &self,
        keys: &[RecordKey],
    ) -> Result<std::collections::HashMap<RecordKey, String>, TableError> {
        self.lookup()?;
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter_map(|r| key_of(&r.fields).map(|k| (k, r.record_id.clone())))
            .filter(|(k, _)| keys.contains(k))
            .collect())
    }

    async fn batch_create(&self, rows: Vec<RecordFields>) -> Result<Vec<String>, TableError> {
        self.check_batch(rows.len())?;
        if self.reject_creates.load(Ordering::SeqCst) {
            return Err(TableError::Api {
                code: 1254045,
                message: "FieldNameNotFound".to_string(),
            });
        }
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut table = self.rows.lock().unwrap();
        let mut ids = Vec::with_capacity(rows.len());
        for fields in rows {
            let record_id = format!("rec{}", self.next_id.fetch_add(1, Ordering::SeqCst));
            ids.push(record_id.clone());
            table.push(TableRecord { record_id, fields });
        }
        Ok(ids)
    }

    async fn batch_update(
        &self,
        rows: Vec<(String, RecordFields)>,
    ) -> Result<Vec<String>, TableError> {
        self.check_batch(rows.len())?;
        let mut table = self.rows.lock().unwrap();
        let mut ids = Vec::with_capacity(rows.len());
        for (record_id, fields) in rows {
            match table.iter_mut().find(|r| r.record_id == record_id) {
                Some(existing) => existing.fields = fields,
                None => {
                    return Err(TableError::Api {
                        code: 1254043,
                        message: format!("RecordIdNotFound: {record_id}"),
                    })
                }
            }
            ids.push(record_id);
        }
        Ok(ids)
    }
}
