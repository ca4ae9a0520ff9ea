use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    #[default]
    FullTime,
    PartTime,
    Contract,
    Internship,
    Remote,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    Entry,
    Junior,
    #[default]
    Mid,
    Senior,
    Expert,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EducationRequirement {
    HighSchool,
    College,
    Bachelor,
    Master,
    Phd,
    #[default]
    NoRequirement,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalaryRange {
    pub min_salary: Option<u32>,
    pub max_salary: Option<u32>,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// "monthly" | "yearly"
    #[serde(default = "default_salary_unit")]
    pub unit: String,
    #[serde(default)]
    pub negotiable: bool,
}

fn default_currency() -> String {
    "CNY".to_string()
}

fn default_salary_unit() -> String {
    "monthly".to_string()
}

/// Experience/education thresholds and skill sets a candidate is measured against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobRequirements {
    #[serde(default)]
    pub experience_level: ExperienceLevel,
    pub min_years: Option<u32>,
    pub max_years: Option<u32>,
    #[serde(default)]
    pub education: EducationRequirement,
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub preferred_skills: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub certifications: Vec<String>,
    #[serde(default)]
    pub bonus_points: Vec<String>,
}

/// The requisition content. Read-only to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPosting {
    pub title: String,
    pub company: String,
    pub department: Option<String>,
    pub location: String,
    #[serde(default)]
    pub job_type: JobType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub responsibilities: Vec<String>,
    #[serde(default)]
    pub requirements: JobRequirements,
    pub salary_range: Option<SalaryRange>,
    #[serde(default)]
    pub benefits: Vec<String>,
}

impl JobPosting {
    /// Title and company must both carry at least two non-blank characters.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().chars().count() < 2 {
            return Err("title must be at least 2 characters".to_string());
        }
        if self.company.trim().chars().count() < 2 {
            return Err("company must be at least 2 characters".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    #[serde(flatten)]
    pub posting: JobPosting,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn title(&self) -> &str {
        &self.posting.title
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_posting_defaults_fill_optional_sections() {
        let posting: JobPosting = serde_json::from_value(json!({
            "title": "Backend Engineer",
            "company": "Acme",
            "location": "Shanghai",
            "department": null,
            "salary_range": null
        }))
        .unwrap();

        assert_eq!(posting.job_type, JobType::FullTime);
        assert!(posting.requirements.required_skills.is_empty());
        assert!(posting.validate().is_ok());
    }

    #[test]
    fn test_posting_rejects_short_title() {
        let posting: JobPosting = serde_json::from_value(json!({
            "title": " A ",
            "company": "Acme",
            "location": "Remote",
            "department": null,
            "salary_range": null
        }))
        .unwrap();

        assert!(posting.validate().unwrap_err().contains("title"));
    }

    #[test]
    fn test_job_serializes_flat() {
        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4(),
            posting: serde_json::from_value(json!({
                "title": "Data Engineer",
                "company": "Acme",
                "location": "Beijing",
                "department": "Data",
                "salary_range": {"min_salary": 20000, "max_salary": 30000}
            }))
            .unwrap(),
            created_at: now,
            updated_at: now,
        };

        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["title"], "Data Engineer");
        assert_eq!(value["salary_range"]["currency"], "CNY");
    }
}
