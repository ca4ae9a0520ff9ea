//! Plain-text renderings of a candidate and a job, as handed to the oracle.

use std::fmt::Write;

use crate::models::candidate::CandidateRecord;
use crate::models::job::{EducationRequirement, ExperienceLevel, Job, JobType};

fn push_line(out: &mut String, label: &str, value: &str) {
    if !value.trim().is_empty() {
        let _ = writeln!(out, "{label}: {value}");
    }
}

fn push_list(out: &mut String, label: &str, items: &[String]) {
    if !items.is_empty() {
        push_line(out, label, &items.join(", "));
    }
}

fn push_bullets(out: &mut String, label: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "  {label}:");
    for item in items {
        let _ = writeln!(out, "    - {item}");
    }
}

pub fn render_candidate(candidate: &CandidateRecord) -> String {
    let profile = &candidate.profile;
    let mut out = String::new();

    push_line(&mut out, "Name", &profile.name);
    push_line(&mut out, "Location", profile.contact.location.as_deref().unwrap_or(""));
    push_line(&mut out, "Current position", profile.current_position.as_deref().unwrap_or(""));
    push_line(&mut out, "Current company", profile.current_company.as_deref().unwrap_or(""));
    if let Some(years) = profile.years_of_experience {
        push_line(&mut out, "Years of experience", &years.to_string());
    }
    push_line(&mut out, "Expected salary", profile.salary_expectation.as_deref().unwrap_or(""));
    push_line(&mut out, "Summary", profile.summary.as_deref().unwrap_or(""));

    if !profile.work_experiences.is_empty() {
        out.push_str("\nWork experience:\n");
        for work in &profile.work_experiences {
            let _ = writeln!(
                out,
                "- {} at {} ({} to {})",
                work.position,
                work.company,
                work.start_date.as_deref().unwrap_or("?"),
                work.end_date.as_deref().unwrap_or("present"),
            );
            if let Some(description) = &work.description {
                let _ = writeln!(out, "  {description}");
            }
            push_bullets(&mut out, "Responsibilities", &work.responsibilities);
            push_bullets(&mut out, "Achievements", &work.achievements);
        }
    }

    if !profile.education.is_empty() {
        out.push_str("\nEducation:\n");
        for edu in &profile.education {
            let _ = writeln!(
                out,
                "- {}, {} in {} ({} to {})",
                edu.school,
                edu.degree,
                edu.major,
                edu.start_date.as_deref().unwrap_or("?"),
                edu.end_date.as_deref().unwrap_or("?"),
            );
        }
    }

    if !profile.projects.is_empty() {
        out.push_str("\nProjects:\n");
        for project in &profile.projects {
            match &project.role {
                Some(role) => {
                    let _ = writeln!(out, "- {} ({role})", project.name);
                }
                None => {
                    let _ = writeln!(out, "- {}", project.name);
                }
            }
            if let Some(description) = &project.description {
                let _ = writeln!(out, "  {description}");
            }
            if !project.technologies.is_empty() {
                let _ = writeln!(out, "  Technologies: {}", project.technologies.join(", "));
            }
        }
    }

    out.push('\n');
    push_list(&mut out, "Skills", &profile.skills);
    push_list(&mut out, "Languages", &profile.languages);
    push_list(&mut out, "Certifications", &profile.certifications);
    out.trim_end().to_string()
}

fn job_type_label(job_type: JobType) -> &'static str {
    match job_type {
        JobType::FullTime => "full-time",
        JobType::PartTime => "part-time",
        JobType::Contract => "contract",
        JobType::Internship => "internship",
        JobType::Remote => "remote",
    }
}

fn experience_label(level: ExperienceLevel) -> &'static str {
    match level {
        ExperienceLevel::Entry => "entry",
        ExperienceLevel::Junior => "junior",
        ExperienceLevel::Mid => "mid",
        ExperienceLevel::Senior => "senior",
        ExperienceLevel::Expert => "expert",
    }
}

fn education_label(education: EducationRequirement) -> &'static str {
    match education {
        EducationRequirement::HighSchool => "high school",
        EducationRequirement::College => "college",
        EducationRequirement::Bachelor => "bachelor",
        EducationRequirement::Master => "master",
        EducationRequirement::Phd => "PhD",
        EducationRequirement::NoRequirement => "no requirement",
    }
}

pub fn render_job(job: &Job) -> String {
    let posting = &job.posting;
    let requirements = &posting.requirements;
    let mut out = String::new();

    push_line(&mut out, "Title", &posting.title);
    push_line(&mut out, "Company", &posting.company);
    push_line(&mut out, "Department", posting.department.as_deref().unwrap_or(""));
    push_line(&mut out, "Location", &posting.location);
    push_line(&mut out, "Type", job_type_label(posting.job_type));
    push_line(&mut out, "Description", &posting.description);

    if !posting.responsibilities.is_empty() {
        out.push_str("\nResponsibilities:\n");
        for r in &posting.responsibilities {
            let _ = writeln!(out, "- {r}");
        }
    }

    out.push_str("\nRequirements:\n");
    let years = match (requirements.min_years, requirements.max_years) {
        (Some(min), Some(max)) => format!(" ({min}-{max} years)"),
        (Some(min), None) => format!(" ({min}+ years)"),
        (None, Some(max)) => format!(" (up to {max} years)"),
        (None, None) => String::new(),
    };
    let _ = writeln!(
        out,
        "Experience level: {}{years}",
        experience_label(requirements.experience_level)
    );
    push_line(&mut out, "Education", education_label(requirements.education));
    push_list(&mut out, "Required skills", &requirements.required_skills);
    push_list(&mut out, "Preferred skills", &requirements.preferred_skills);
    push_list(&mut out, "Languages", &requirements.languages);
    push_list(&mut out, "Certifications", &requirements.certifications);
    push_list(&mut out, "Bonus points", &requirements.bonus_points);

    if let Some(salary) = &posting.salary_range {
        let band = match (salary.min_salary, salary.max_salary) {
            (Some(min), Some(max)) => format!("{min}-{max}"),
            (Some(min), None) => format!("from {min}"),
            (None, Some(max)) => format!("up to {max}"),
            (None, None) => "unspecified".to_string(),
        };
        let negotiable = if salary.negotiable { ", negotiable" } else { "" };
        let _ = writeln!(
            out,
            "\nSalary: {band} {} ({}){negotiable}",
            salary.currency, salary.unit
        );
    }
    push_list(&mut out, "Benefits", &posting.benefits);
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::candidate::WorkExperience;
    use crate::testing::{candidate_record, sample_job};

    #[test]
    fn test_candidate_text_has_labelled_sections() {
        let mut candidate = candidate_record("boss", "1", "Chen Jing");
        candidate.profile.skills = vec!["Python".into(), "SQL".into(), "Go".into()];
        candidate.profile.work_experiences.push(WorkExperience {
            company: "Acme".into(),
            position: "Data Engineer".into(),
            start_date: Some("2019-03".into()),
            end_date: None,
            description: None,
            responsibilities: vec!["ETL pipelines".into()],
            achievements: vec![],
        });

        let text = render_candidate(&candidate);
        assert!(text.starts_with("Name: Chen Jing"));
        assert!(text.contains("- Data Engineer at Acme (2019-03 to present)"));
        assert!(text.contains("    - ETL pipelines"));
        assert!(text.contains("Skills: Python, SQL, Go"));
        assert!(!text.contains("Achievements"));
    }

    #[test]
    fn test_job_text_includes_requirements_and_salary() {
        let text = render_job(&sample_job());
        assert!(text.contains("Title: Backend Engineer"));
        assert!(text.contains("Required skills: Python, SQL"));
        assert!(text.contains("Experience level: mid (3-5 years)"));
        assert!(text.contains("Salary: 20000-35000 CNY (monthly)"));
    }
}
