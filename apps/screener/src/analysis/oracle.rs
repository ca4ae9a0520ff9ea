use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::llm_client::LlmError;
use crate::models::analysis::{
    AnalysisResult, InterviewSuggestions, MatchAnalysis, RecommendationLevel, RiskAssessment,
    ScoreDetail, ScoreDimension,
};
use crate::scoring::{apply_weights, ScoreWeights};

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Malformed oracle response: {0}")]
    Malformed(String),

    #[error("Scoring oracle unavailable: {0}")]
    Unavailable(String),
}

/// Raw per-dimension score as the oracle reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleScore {
    pub dimension: ScoreDimension,
    pub score: f64,
    /// Ignored; the run's weight table is authoritative.
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// The fixed response schema. Any missing section fails deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleResponse {
    /// Ignored; the overall score is always recomputed.
    #[serde(default)]
    pub overall_score: Option<f64>,
    pub recommendation_level: RecommendationLevel,
    pub score_details: Vec<OracleScore>,
    pub match_analysis: MatchAnalysis,
    pub risk_assessment: RiskAssessment,
    pub interview_suggestions: InterviewSuggestions,
    pub summary: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendations: Vec<String>,
}

impl OracleResponse {
    /// Exactly one score per dimension, each a finite value in [0, 10].
    pub fn validate(&self) -> Result<(), OracleError> {
        let mut seen = HashSet::new();
        for detail in &self.score_details {
            if !seen.insert(detail.dimension) {
                return Err(OracleError::Malformed(format!(
                    "duplicate dimension {}",
                    detail.dimension.as_str()
                )));
            }
            if !detail.score.is_finite() || !(0.0..=10.0).contains(&detail.score) {
                return Err(OracleError::Malformed(format!(
                    "score {} for {} is outside [0, 10]",
                    detail.score,
                    detail.dimension.as_str()
                )));
            }
        }

        let missing: Vec<&str> = ScoreDimension::ALL
            .iter()
            .filter(|d| !seen.contains(*d))
            .map(|d| d.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(OracleError::Malformed(format!(
                "missing dimensions: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    /// Builds the stored result, weighting details with `weights` and
    /// recomputing the overall score from them.
    pub fn into_result(
        self,
        candidate_id: Uuid,
        job_id: Uuid,
        weights: &ScoreWeights,
        model_used: &str,
        duration_ms: u64,
    ) -> AnalysisResult {
        let mut score_details: Vec<ScoreDetail> = self
            .score_details
            .into_iter()
            .map(|s| ScoreDetail {
                dimension: s.dimension,
                raw_score: s.score,
                weight: 0.0,
                weighted_score: 0.0,
                rationale: s.explanation,
                evidence: s.evidence,
                suggestions: s.suggestions,
            })
            .collect();
        score_details.sort_by_key(|d| d.dimension);
        let overall_score = apply_weights(&mut score_details, weights);

        AnalysisResult {
            id: Uuid::new_v4(),
            candidate_id,
            job_id,
            overall_score,
            recommendation_level: self.recommendation_level,
            score_details,
            match_analysis: self.match_analysis,
            risk_assessment: self.risk_assessment,
            interview_suggestions: self.interview_suggestions,
            summary: self.summary,
            strengths: self.strengths,
            weaknesses: self.weaknesses,
            recommendations: self.recommendations,
            model_used: model_used.to_string(),
            duration_ms,
            created_at: Utc::now(),
        }
    }
}

/// Scores one candidate text against one job text.
#[async_trait]
pub trait ScoringOracle: Send + Sync {
    /// Recorded as `AnalysisResult::model_used`.
    fn model(&self) -> &str;

    async fn score(&self, candidate_text: &str, job_text: &str)
        -> Result<OracleResponse, OracleError>;
}
