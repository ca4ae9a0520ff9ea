pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::pipeline::handlers as pipeline;
use crate::state::AppState;
use crate::store::handlers as records;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Records
        .route("/api/v1/jobs", post(records::handle_create_job))
        .route("/api/v1/jobs/:id", get(records::handle_get_job))
        .route("/api/v1/candidates/:id", get(records::handle_get_candidate))
        .route("/api/v1/analyses/:id", get(records::handle_get_analysis))
        // Pipeline
        .route("/api/v1/pipeline/start", post(pipeline::handle_start))
        .route("/api/v1/pipeline/status", get(pipeline::handle_status))
        .route("/api/v1/pipeline/pause", post(pipeline::handle_pause))
        .route("/api/v1/pipeline/resume", post(pipeline::handle_resume))
        .route("/api/v1/pipeline/cancel", post(pipeline::handle_cancel))
        .route("/api/v1/pipeline/history", get(pipeline::handle_history))
        .route("/api/v1/pipeline/statistics", get(pipeline::handle_statistics))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::util::ServiceExt; // for `oneshot`

    use crate::analysis::AnalysisStage;
    use crate::collection::{CollectionStage, PacingConfig, DEFAULT_BREAKER_THRESHOLD};
    use crate::pipeline::{Orchestrator, OrchestratorSettings, Stages};
    use crate::store::memory::MemoryRecordStore;
    use crate::sync::SyncStage;
    use crate::testing::{listing_item, MemoryTable, PageScript, ScriptedOracle, ScriptedSource};

    fn app() -> Router {
        let store = Arc::new(MemoryRecordStore::new());
        let source = ScriptedSource::new(vec![PageScript::Items(
            vec![listing_item("1", "Sun Li"), listing_item("2", "Zhou Min")],
            false,
        )]);
        let stages = Stages {
            collection: CollectionStage::new(
                Arc::new(source),
                store.clone(),
                PacingConfig::none(),
                DEFAULT_BREAKER_THRESHOLD,
            ),
            analysis: AnalysisStage::new(Arc::new(ScriptedOracle::new(6.0)), store.clone(), 3),
            sync: SyncStage::new(Arc::new(MemoryTable::new(500)), 500),
        };
        build_router(AppState {
            store,
            orchestrator: Orchestrator::new(stages, OrchestratorSettings::default(), None),
        })
    }

    fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn job_body() -> Value {
        json!({
            "title": "Data Engineer",
            "company": "Acme Robotics",
            "location": "Hangzhou",
            "department": null,
            "salary_range": null,
            "requirements": {"required_skills": ["Python", "SQL"]}
        })
    }

    async fn wait_for_terminal(app: &Router) -> Value {
        for _ in 0..100 {
            let (_, run) = send(app, request("GET", "/api/v1/pipeline/status", None)).await;
            if matches!(run["status"].as_str(), Some("completed" | "failed" | "cancelled")) {
                return run;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run never finished");
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&app(), request("GET", "/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_create_and_fetch_job() {
        let app = app();
        let (status, job) = send(&app, request("POST", "/api/v1/jobs", Some(job_body()))).await;
        assert_eq!(status, StatusCode::CREATED);

        let uri = format!("/api/v1/jobs/{}", job["id"].as_str().unwrap());
        let (status, fetched) = send(&app, request("GET", &uri, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["title"], "Data Engineer");
    }

    #[tokio::test]
    async fn test_invalid_job_rejected() {
        let mut body = job_body();
        body["company"] = json!("A");
        let (status, err) = send(&app(), request("POST", "/api/v1/jobs", Some(body))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_start_unknown_job_is_404() {
        let body = json!({"job_id": uuid::Uuid::new_v4(), "max_candidates": 5});
        let (status, err) = send(&app(), request("POST", "/api/v1/pipeline/start", Some(body))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(err["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_status_before_any_run_is_404() {
        let (status, _) = send(&app(), request("GET", "/api/v1/pipeline/status", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_run_through_the_api() {
        let app = app();
        let (_, job) = send(&app, request("POST", "/api/v1/jobs", Some(job_body()))).await;

        let start = json!({
            "job_id": job["id"],
            "search_params": {"keywords": "data engineer", "location": "Hangzhou"},
            "max_candidates": 5
        });
        let (status, started) =
            send(&app, request("POST", "/api/v1/pipeline/start", Some(start))).await;
        assert_eq!(status, StatusCode::OK);

        let run = wait_for_terminal(&app).await;
        assert_eq!(run["id"], started["run_id"]);
        assert_eq!(run["status"], "completed");
        assert_eq!(run["progress"]["synced"], 2);

        let candidate_id = run["collected"][0]["id"].as_str().unwrap().to_string();
        let (status, candidate) =
            send(&app, request("GET", &format!("/api/v1/candidates/{candidate_id}"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(candidate["source"], "boss");

        let analysis_id = run["analyzed"][0]["id"].as_str().unwrap().to_string();
        let (status, analysis) =
            send(&app, request("GET", &format!("/api/v1/analyses/{analysis_id}"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(analysis["overall_score"], 6.0);

        let (_, history) = send(&app, request("GET", "/api/v1/pipeline/history?limit=5", None)).await;
        assert_eq!(history["runs"].as_array().unwrap().len(), 1);

        let (_, stats) = send(&app, request("GET", "/api/v1/pipeline/statistics", None)).await;
        assert_eq!(stats["total_runs"], 1);
        assert_eq!(stats["success_rate"], 100.0);
    }

    #[tokio::test]
    async fn test_control_on_finished_run_not_accepted() {
        let app = app();
        let (_, job) = send(&app, request("POST", "/api/v1/jobs", Some(job_body()))).await;
        let start = json!({"job_id": job["id"], "max_candidates": 5});
        send(&app, request("POST", "/api/v1/pipeline/start", Some(start))).await;
        wait_for_terminal(&app).await;

        let (status, body) = send(&app, request("POST", "/api/v1/pipeline/cancel", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["accepted"], false);
        assert_eq!(body["run"]["status"], "completed");
    }

    #[tokio::test]
    async fn test_bad_weights_rejected() {
        let app = app();
        let (_, job) = send(&app, request("POST", "/api/v1/jobs", Some(job_body()))).await;
        let start = json!({
            "job_id": job["id"],
            "max_candidates": 5,
            "weights": {"skill_match": 0.9}
        });
        let (status, err) = send(&app, request("POST", "/api/v1/pipeline/start", Some(start))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(err["error"]["message"].as_str().unwrap().contains("sum"), "{err}");
    }
}
