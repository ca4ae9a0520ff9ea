use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The ten fixed scoring categories. Declaration order is the canonical
/// order used everywhere results are listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreDimension {
    SkillMatch,
    ExperienceRelevance,
    EducationBackground,
    ProjectExperience,
    WorkStability,
    SalaryExpectation,
    LocationMatch,
    LanguageAbility,
    Certifications,
    BonusPoints,
}

impl ScoreDimension {
    pub const ALL: [ScoreDimension; 10] = [
        ScoreDimension::SkillMatch,
        ScoreDimension::ExperienceRelevance,
        ScoreDimension::EducationBackground,
        ScoreDimension::ProjectExperience,
        ScoreDimension::WorkStability,
        ScoreDimension::SalaryExpectation,
        ScoreDimension::LocationMatch,
        ScoreDimension::LanguageAbility,
        ScoreDimension::Certifications,
        ScoreDimension::BonusPoints,
    ];

    /// Default weight. The ten defaults sum to 1.0.
    pub fn default_weight(self) -> f64 {
        match self {
            ScoreDimension::SkillMatch => 0.25,
            ScoreDimension::ExperienceRelevance => 0.20,
            ScoreDimension::EducationBackground => 0.15,
            ScoreDimension::ProjectExperience => 0.15,
            ScoreDimension::WorkStability => 0.10,
            ScoreDimension::SalaryExpectation => 0.05,
            ScoreDimension::LocationMatch => 0.03,
            ScoreDimension::LanguageAbility => 0.03,
            ScoreDimension::Certifications => 0.02,
            ScoreDimension::BonusPoints => 0.02,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScoreDimension::SkillMatch => "skill_match",
            ScoreDimension::ExperienceRelevance => "experience_relevance",
            ScoreDimension::EducationBackground => "education_background",
            ScoreDimension::ProjectExperience => "project_experience",
            ScoreDimension::WorkStability => "work_stability",
            ScoreDimension::SalaryExpectation => "salary_expectation",
            ScoreDimension::LocationMatch => "location_match",
            ScoreDimension::LanguageAbility => "language_ability",
            ScoreDimension::Certifications => "certifications",
            ScoreDimension::BonusPoints => "bonus_points",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ScoreDimension::SkillMatch => "Skill match",
            ScoreDimension::ExperienceRelevance => "Experience relevance",
            ScoreDimension::EducationBackground => "Education background",
            ScoreDimension::ProjectExperience => "Project experience",
            ScoreDimension::WorkStability => "Work stability",
            ScoreDimension::SalaryExpectation => "Salary expectation",
            ScoreDimension::LocationMatch => "Location match",
            ScoreDimension::LanguageAbility => "Language ability",
            ScoreDimension::Certifications => "Certifications",
            ScoreDimension::BonusPoints => "Bonus points",
        }
    }
}

/// One scored dimension. `weighted_score` is always `raw_score * weight`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreDetail {
    pub dimension: ScoreDimension,
    pub raw_score: f64, // 0.0 to 10.0
    pub weight: f64,    // 0.0 to 1.0
    pub weighted_score: f64,
    pub rationale: String,
    pub evidence: Vec<String>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationLevel {
    HighlyRecommended,
    Recommended,
    NotRecommended,
    NeedsReview,
}

impl RecommendationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RecommendationLevel::HighlyRecommended => "highly_recommended",
            RecommendationLevel::Recommended => "recommended",
            RecommendationLevel::NotRecommended => "not_recommended",
            RecommendationLevel::NeedsReview => "needs_review",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MatchAnalysis {
    pub matched_skills: Vec<String>,
    pub missing_skills: Vec<String>,
    pub extra_skills: Vec<String>,
    pub skill_match_rate: f64, // 0.0 to 1.0
    pub experience_match: bool,
    pub experience_gap: Option<String>,
    pub education_match: bool,
    pub education_gap: Option<String>,
    pub location_match: bool,
    pub location_note: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskAssessment {
    pub overall_risk: RiskLevel,
    pub risk_factors: Vec<String>,
    pub job_hopping_risk: f64,
    pub salary_risk: f64,
    pub skill_gap_risk: f64,
    pub culture_fit_risk: f64,
    pub mitigation_strategies: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InterviewSuggestions {
    pub recommended_questions: Vec<String>,
    pub focus_areas: Vec<String>,
    pub technical_assessment: Vec<String>,
    pub behavioral_assessment: Vec<String>,
    pub red_flags: Vec<String>,
}

/// Outcome of scoring one candidate against one job. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub job_id: Uuid,
    /// Σ weighted_score over `score_details`, rounded to 2 decimals.
    pub overall_score: f64,
    pub recommendation_level: RecommendationLevel,
    pub score_details: Vec<ScoreDetail>,
    pub match_analysis: MatchAnalysis,
    pub risk_assessment: RiskAssessment,
    pub interview_suggestions: InterviewSuggestions,
    pub summary: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendations: Vec<String>,
    pub model_used: String,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}
