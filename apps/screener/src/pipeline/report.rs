use std::fmt::Write;

use aws_sdk_s3::primitives::ByteStream;
use tracing::{info, warn};

use super::run::PipelineRun;

const TOP_CANDIDATES: usize = 10;

/// Uploads a Markdown report of each finished run to S3.
#[derive(Clone)]
pub struct RunReportArchive {
    s3: aws_sdk_s3::Client,
    bucket: String,
}

impl RunReportArchive {
    pub fn new(s3: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { s3, bucket }
    }

    pub fn key_for(run: &PipelineRun) -> String {
        format!("runs/{}.md", run.id)
    }

    /// Failures are logged and otherwise ignored.
    pub async fn archive(&self, run: &PipelineRun) {
        let key = Self::key_for(run);
        let body = render_report(run);

        let uploaded = self
            .s3
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body.into_bytes()))
            .content_type("text/markdown")
            .send()
            .await;

        match uploaded {
            Ok(_) => info!("Uploaded run report to s3://{}/{}", self.bucket, key),
            Err(e) => warn!("Run report upload for {} failed: {}", run.id, e),
        }
    }
}

pub fn render_report(run: &PipelineRun) -> String {
    let summary = run.summary.clone().unwrap_or_else(|| run.summarize());
    let mut md = String::new();

    let _ = writeln!(md, "# Screening run {}\n", run.id);
    let _ = writeln!(md, "- **Job:** {} ({})", run.job.title(), run.job.posting.company);
    let _ = writeln!(md, "- **Status:** {:?}", run.status);
    let _ = writeln!(md, "- **Last step:** {}", run.current_step.as_str());
    let _ = writeln!(md, "- **Started:** {}", run.start_time.to_rfc3339());
    if let Some(end) = run.end_time {
        let _ = writeln!(md, "- **Ended:** {}", end.to_rfc3339());
    }
    if let Some(secs) = summary.duration_secs {
        let _ = writeln!(md, "- **Duration:** {secs:.1}s");
    }

    md.push_str("\n## Progress\n\n");
    md.push_str("| Collected | Analyzed | Synced | Errors | Success rate |\n");
    md.push_str("|---|---|---|---|---|\n");
    let _ = writeln!(
        md,
        "| {} | {} | {} | {} | {:.2}% |",
        summary.collected, summary.analyzed, summary.synced, summary.errors, summary.success_rate
    );

    if !run.analyzed.is_empty() {
        let mut ranked: Vec<_> = run.analyzed.iter().collect();
        ranked.sort_by(|a, b| b.overall_score.total_cmp(&a.overall_score));

        md.push_str("\n## Top candidates\n\n");
        md.push_str("| # | Candidate | Score | Recommendation |\n");
        md.push_str("|---|---|---|---|\n");
        for (i, result) in ranked.into_iter().take(TOP_CANDIDATES).enumerate() {
            let name = run
                .collected
                .iter()
                .find(|c| c.id == result.candidate_id)
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| result.candidate_id.to_string());
            let _ = writeln!(
                md,
                "| {} | {} | {:.2} | {} |",
                i + 1,
                name,
                result.overall_score,
                result.recommendation_level.as_str()
            );
        }
    }

    if !run.errors.is_empty() {
        md.push_str("\n## Errors\n\n");
        for error in &run.errors {
            let item = error.item.as_deref().map(|i| format!(" [{i}]")).unwrap_or_default();
            let fatal = if error.fatal { " **(fatal)**" } else { "" };
            let _ = writeln!(
                md,
                "- `{}`{}{}: {}",
                error.step.as_str(),
                item,
                fatal,
                error.message
            );
        }
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::run::{PipelineStep, RunError, RunRequest, RunStatus};
    use crate::testing::{analysis_result, candidate_record, sample_job};

    fn run_with_results() -> PipelineRun {
        let job = sample_job();
        let mut run = PipelineRun::new(
            job.clone(),
            RunRequest {
                search_params: Default::default(),
                max_candidates: 5,
                weights: Default::default(),
                force_reanalysis: false,
            },
        );
        let low = candidate_record("boss", "1", "Wang Fang");
        let high = candidate_record("boss", "2", "Zhao Lei");
        run.analyzed = vec![analysis_result(&low, &job, 4.0), analysis_result(&high, &job, 8.5)];
        run.collected = vec![low, high];
        run.progress.collected = 2;
        run.progress.analyzed = 2;
        run.record_error(RunError::isolated(
            PipelineStep::Sync,
            Some("chunk 0".to_string()),
            "TooManyRequest",
        ));
        run.finish(RunStatus::Completed);
        run
    }

    #[test]
    fn test_report_ranks_candidates_by_score() {
        let report = render_report(&run_with_results());

        let zhao = report.find("Zhao Lei").unwrap();
        let wang = report.find("Wang Fang").unwrap();
        assert!(zhao < wang);
        assert!(report.contains("| 1 | Zhao Lei | 8.50 | recommended |"));
    }

    #[test]
    fn test_report_lists_errors_with_step_and_item() {
        let report = render_report(&run_with_results());
        assert!(report.contains("- `sync` [chunk 0]: TooManyRequest"));
        assert!(report.contains("**Status:** Completed"));
    }

    #[test]
    fn test_report_key() {
        let run = run_with_results();
        assert_eq!(RunReportArchive::key_for(&run), format!("runs/{}.md", run.id));
    }
}
