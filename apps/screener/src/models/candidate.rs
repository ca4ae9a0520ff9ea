use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The `(source, source_id)` pair that identifies a harvested profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NaturalKey {
    pub source: String,
    pub source_id: String,
}

impl NaturalKey {
    pub fn new(source: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            source_id: source_id.into(),
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.source_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkExperience {
    pub company: String,
    pub position: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub responsibilities: Vec<String>,
    #[serde(default)]
    pub achievements: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Education {
    pub school: String,
    pub major: String,
    pub degree: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectExperience {
    pub name: String,
    pub role: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
}

/// Everything about a candidate except identity and bookkeeping timestamps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub name: String,
    pub source_url: Option<String>,
    #[serde(default)]
    pub contact: ContactInfo,
    pub summary: Option<String>,
    #[serde(default)]
    pub work_experiences: Vec<WorkExperience>,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub projects: Vec<ProjectExperience>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub certifications: Vec<String>,
    pub years_of_experience: Option<u32>,
    pub current_position: Option<String>,
    pub current_company: Option<String>,
    pub salary_expectation: Option<String>,
}

/// A harvested profile not yet resolved against storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCandidate {
    pub source: String,
    pub source_id: String,
    #[serde(flatten)]
    pub profile: CandidateProfile,
}

impl NewCandidate {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(&self.source, &self.source_id)
    }

    pub fn into_record(self, id: Uuid, now: DateTime<Utc>) -> CandidateRecord {
        CandidateRecord {
            id,
            source: self.source,
            source_id: self.source_id,
            profile: self.profile,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A stored candidate. `source + source_id` is globally unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id: Uuid,
    pub source: String,
    pub source_id: String,
    #[serde(flatten)]
    pub profile: CandidateProfile,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CandidateRecord {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(&self.source, &self.source_id)
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }
}
