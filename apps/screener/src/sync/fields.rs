use serde_json::{json, Value};
use uuid::Uuid;

use super::table::{RecordFields, RecordKey};
use crate::models::analysis::AnalysisResult;
use crate::models::candidate::CandidateRecord;
use crate::models::job::Job;

pub const FIELD_CANDIDATE_ID: &str = "candidate_id";
pub const FIELD_JOB_ID: &str = "job_id";

const MAX_WORK_EXPERIENCES: usize = 3;
const MAX_INTERVIEW_QUESTIONS: usize = 5;

fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|s| format!("• {s}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn date_span(start: Option<&str>, end: Option<&str>) -> String {
    match (start, end) {
        (Some(start), Some(end)) => format!(" ({start} ~ {end})"),
        (Some(start), None) => format!(" ({start} ~ present)"),
        _ => String::new(),
    }
}

/// Reads the natural key back out of a stored row.
pub fn key_of(fields: &RecordFields) -> Option<RecordKey> {
    let id = |name: &str| {
        fields
            .get(name)
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
    };
    Some(RecordKey {
        candidate_id: id(FIELD_CANDIDATE_ID)?,
        job_id: id(FIELD_JOB_ID)?,
    })
}

/// Flattens one analysis result (plus its candidate and job) into a table row.
pub fn render_record(
    job: &Job,
    candidate: Option<&CandidateRecord>,
    result: &AnalysisResult,
) -> RecordFields {
    let mut fields = RecordFields::new();
    let mut put = |name: &str, value: Value| {
        fields.insert(name.to_string(), value);
    };

    put(FIELD_CANDIDATE_ID, json!(result.candidate_id.to_string()));
    put(FIELD_JOB_ID, json!(result.job_id.to_string()));
    put("job_title", json!(job.posting.title));
    put("company", json!(job.posting.company));
    put("department", json!(job.posting.department.clone().unwrap_or_default()));

    if let Some(candidate) = candidate {
        let profile = &candidate.profile;
        let work = profile
            .work_experiences
            .iter()
            .take(MAX_WORK_EXPERIENCES)
            .map(|w| {
                format!(
                    "{} - {}{}",
                    w.company,
                    w.position,
                    date_span(w.start_date.as_deref(), w.end_date.as_deref())
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let education = profile
            .education
            .iter()
            .map(|e| {
                format!(
                    "{} - {} - {}{}",
                    e.school,
                    e.major,
                    e.degree,
                    date_span(e.start_date.as_deref(), e.end_date.as_deref())
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        put("candidate_name", json!(profile.name));
        put("email", json!(profile.contact.email.clone().unwrap_or_default()));
        put("phone", json!(profile.contact.phone.clone().unwrap_or_default()));
        put("location", json!(profile.contact.location.clone().unwrap_or_default()));
        put("current_position", json!(profile.current_position.clone().unwrap_or_default()));
        put("current_company", json!(profile.current_company.clone().unwrap_or_default()));
        put("years_of_experience", json!(profile.years_of_experience.unwrap_or(0)));
        put("salary_expectation", json!(profile.salary_expectation.clone().unwrap_or_default()));
        put("skills", json!(profile.skills.join(", ")));
        put("languages", json!(profile.languages.join(", ")));
        put("certifications", json!(profile.certifications.join(", ")));
        put("work_experience", json!(work));
        put("education", json!(education));
        put("source", json!(candidate.source));
    }

    let m = &result.match_analysis;
    let match_summary = format!(
        "Skill match: {:.1}%\nExperience match: {}\nEducation match: {}",
        m.skill_match_rate * 100.0,
        m.experience_match,
        m.education_match
    );
    let questions = result
        .interview_suggestions
        .recommended_questions
        .iter()
        .take(MAX_INTERVIEW_QUESTIONS)
        .enumerate()
        .map(|(i, q)| format!("{}. {q}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");

    put("overall_score", json!(result.overall_score));
    put("recommendation_level", json!(result.recommendation_level.as_str()));
    put("match_summary", json!(match_summary));
    put("summary", json!(result.summary));
    put("strengths", json!(bullets(&result.strengths)));
    put("weaknesses", json!(bullets(&result.weaknesses)));
    put("interview_questions", json!(questions));
    put("overall_risk", json!(result.risk_assessment.overall_risk.as_str()));
    put("analysis_model", json!(result.model_used));
    put("updated_at", json!(chrono::Utc::now().timestamp_millis()));

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{analysis_result, candidate_record, sample_job};

    #[test]
    fn test_record_carries_natural_key() {
        let job = sample_job();
        let candidate = candidate_record("boss", "9", "Liu Yang");
        let result = analysis_result(&candidate, &job, 7.0);

        let fields = render_record(&job, Some(&candidate), &result);

        assert_eq!(key_of(&fields), Some(RecordKey::from(&result)));
        assert_eq!(fields["candidate_name"], "Liu Yang");
        assert_eq!(fields["job_title"], "Backend Engineer");
        assert_eq!(fields["source"], "boss");
    }

    #[test]
    fn test_interview_questions_capped_at_five() {
        let job = sample_job();
        let candidate = candidate_record("boss", "9", "Liu Yang");
        let mut result = analysis_result(&candidate, &job, 7.0);
        result.interview_suggestions.recommended_questions =
            (1..=8).map(|i| format!("Question {i}")).collect();

        let fields = render_record(&job, Some(&candidate), &result);
        let questions = fields["interview_questions"].as_str().unwrap();

        assert_eq!(questions.lines().count(), 5);
        assert!(questions.starts_with("1. Question 1"));
    }

    #[test]
    fn test_record_without_candidate_still_has_scores() {
        let job = sample_job();
        let candidate = candidate_record("boss", "9", "Liu Yang");
        let result = analysis_result(&candidate, &job, 6.5);

        let fields = render_record(&job, None, &result);
        assert!(fields.get("candidate_name").is_none());
        assert_eq!(fields["overall_score"], 6.5);
    }
}
