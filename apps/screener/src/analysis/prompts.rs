use crate::llm_client::prompts::{EVIDENCE_INSTRUCTION, JSON_ONLY_SYSTEM};

pub const ANALYSIS_ROLE: &str = "You are an experienced recruiter who evaluates how well \
    a candidate's resume matches a job requisition.";

pub fn analysis_system_prompt() -> String {
    format!("{ANALYSIS_ROLE} {JSON_ONLY_SYSTEM}")
}

const RESPONSE_SCHEMA: &str = r#"{
  "overall_score": 7.5,
  "recommendation_level": "recommended",
  "score_details": [
    {
      "dimension": "skill_match",
      "score": 8.0,
      "explanation": "Has Python and SQL, lacks Kubernetes",
      "evidence": ["5 years of Python backend work"],
      "suggestions": ["Probe container orchestration experience"]
    }
  ],
  "match_analysis": {
    "matched_skills": ["Python"],
    "missing_skills": ["Kubernetes"],
    "extra_skills": ["Go"],
    "skill_match_rate": 0.8,
    "experience_match": true,
    "experience_gap": null,
    "education_match": true,
    "education_gap": null,
    "location_match": true,
    "location_note": null
  },
  "risk_assessment": {
    "overall_risk": "low",
    "risk_factors": ["Short tenure at last employer"],
    "job_hopping_risk": 0.3,
    "salary_risk": 0.2,
    "skill_gap_risk": 0.3,
    "culture_fit_risk": 0.2,
    "mitigation_strategies": ["Discuss reasons for leaving"]
  },
  "interview_suggestions": {
    "recommended_questions": ["Walk through your largest Python project"],
    "focus_areas": ["System design"],
    "technical_assessment": ["Live coding"],
    "behavioral_assessment": ["Teamwork"],
    "red_flags": []
  },
  "summary": "Strong backend profile with a small infrastructure gap",
  "strengths": ["Solid Python experience"],
  "weaknesses": ["No Kubernetes"],
  "recommendations": ["Proceed to technical interview"]
}"#;

pub fn build_analysis_prompt(candidate_text: &str, job_text: &str) -> String {
    format!(
        "Evaluate the candidate below against the job requisition.\n\n\
         ## Job\n{job_text}\n\n\
         ## Candidate\n{candidate_text}\n\n\
         ## Scoring\n\
         Score each of these ten dimensions from 0 to 10, exactly once each:\n\
         skill_match, experience_relevance, education_background, project_experience, \
         work_stability, salary_expectation, location_match, language_ability, \
         certifications, bonus_points.\n\n\
         {EVIDENCE_INSTRUCTION}\n\n\
         ## Output\n\
         Return one JSON object shaped like this example (score_details must list all ten dimensions):\n\
         {RESPONSE_SCHEMA}\n\n\
         Rules:\n\
         1. recommendation_level is one of \"highly_recommended\", \"recommended\", \"not_recommended\", \"needs_review\".\n\
         2. overall_risk is one of \"low\", \"medium\", \"high\".\n\
         3. Risk values and skill_match_rate are decimals between 0 and 1.\n\
         4. strengths, weaknesses and recommendations must be present, even if empty."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_example_is_valid_json() {
        let value: serde_json::Value = serde_json::from_str(RESPONSE_SCHEMA).unwrap();
        assert_eq!(value["score_details"][0]["dimension"], "skill_match");
    }

    #[test]
    fn test_prompt_embeds_both_texts() {
        let prompt = build_analysis_prompt("Name: Chen Jing", "Title: Backend Engineer");
        assert!(prompt.contains("## Candidate\nName: Chen Jing"));
        assert!(prompt.contains("## Job\nTitle: Backend Engineer"));
        assert!(prompt.contains("bonus_points"));
    }
}
