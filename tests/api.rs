//! HTTP surface exercised through the router, without binding a socket.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use company_research_pipeline::{
    api::create_router,
    artifacts::ArtifactStore,
    capability::{RetryPolicy, ScriptedSummarizer, StaticSearch},
    catalog::InMemoryCatalog,
    condenser::CondenserLimits,
    orchestrator::{Orchestrator, PipelineConfig},
    research::ResearchCategory,
    state::InMemoryJobRegistry,
    FinancialInputs, Subject,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

static CATEGORIES: &[ResearchCategory] = &[
    ResearchCategory {
        id: "1_business_fundamentals",
        subtopics: &["segments"],
    },
    ResearchCategory {
        id: "2_financial_strength",
        subtopics: &["cash flow"],
    },
];

fn orchestrator(dir: &TempDir, summarizer: ScriptedSummarizer) -> Orchestrator {
    let catalog = InMemoryCatalog::new(vec![Subject {
        name: "Acme Industries".into(),
        rank: Some(1),
        financial_inputs: Some(FinancialInputs {
            promoter_holding_pct: Some(62.0),
            fii_holding_change_pct: Some(0.8),
            dii_holding_change_pct: Some(0.3),
            debt_to_equity: Some(0.2),
            free_cash_flow_3y: Some(850.0),
            working_capital_days: Some(45.0),
            cash_conversion_cycle_days: Some(30.0),
            ..Default::default()
        }),
    }]);

    Orchestrator::new(
        PipelineConfig {
            retry: RetryPolicy {
                max_attempts: 1,
                call_timeout: Duration::from_secs(5),
                ..RetryPolicy::default()
            },
            max_results_per_subtopic: 4,
            limits: CondenserLimits::default(),
            categories: CATEGORIES,
        },
        Arc::new(InMemoryJobRegistry::new()),
        Arc::new(catalog),
        Arc::new(StaticSearch::new(4)),
        Arc::new(summarizer),
        Arc::new(ArtifactStore::new(dir.path().join("research"), dir.path().join("reports"))),
    )
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let dir = TempDir::new().unwrap();
    let router = create_router(orchestrator(&dir, ScriptedSummarizer::new()));

    let (status, body) = send(&router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_submit_poll_and_fetch_result() {
    let dir = TempDir::new().unwrap();
    let orch = orchestrator(&dir, ScriptedSummarizer::new());
    let router = create_router(orch.clone());

    let (status, body) = send(&router, post_json("/jobs", json!({ "subject": "#1" }))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id: Uuid = body["jobId"].as_str().unwrap().parse().unwrap();

    orch.wait_for(job_id, Duration::from_millis(5)).await.unwrap();

    let (status, body) = send(&router, get(&format!("/jobs/{}/status", job_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["jobId"], job_id.to_string());
    assert_eq!(body["subject"], "Acme Industries");
    assert_eq!(body["stage"], "completed");
    assert_eq!(body["progress"]["current"], 6);
    assert_eq!(body["progress"]["total"], 6);
    assert!(body.get("error").is_none());

    let (status, body) = send(&router, get(&format!("/jobs/{}/result", job_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["recommendation"], "BUY");
    assert_eq!(body["validation"]["recommendation"], "BUY");
    assert!(body["report"].as_str().unwrap().contains("Business Overview"));
    assert!(body["reportPath"].as_str().unwrap().ends_with(".md"));

    let (status, body) = send(&router, get("/jobs")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_result_before_completion_is_conflict() {
    let dir = TempDir::new().unwrap();
    let router = create_router(orchestrator(&dir, ScriptedSummarizer::new()));

    let (_, body) = send(&router, post_json("/jobs", json!({ "subject": "Acme Industries" }))).await;
    let job_id = body["jobId"].as_str().unwrap().to_string();

    // Artifact writes keep the job running well past this request.
    let (status, body) = send(&router, get(&format!("/jobs/{}/result", job_id))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "NotReady");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_error_responses() {
    let dir = TempDir::new().unwrap();
    let router = create_router(orchestrator(&dir, ScriptedSummarizer::new()));

    let (status, body) = send(&router, get(&format!("/jobs/{}/status", Uuid::new_v4()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "NotFound");

    let (status, _) = send(&router, get("/jobs/not-a-uuid/status")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&router, post_json("/jobs", json!({ "subject": "Globex" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "UnknownSubject");

    let (status, body) = send(
        &router,
        post_json(
            "/jobs",
            json!({ "subject": "Acme Industries", "financial_inputs": { "promoter_holding_pct": 120 } }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "InvalidInput");

    let (status, body) = send(&router, post_json("/jobs", json!({ "ticker": "ACME" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "InvalidInput");
}

#[tokio::test]
async fn test_failed_job_reports_error_in_status() {
    let dir = TempDir::new().unwrap();
    let orch = orchestrator(&dir, ScriptedSummarizer::new().with_report("Error: quota exceeded"));
    let router = create_router(orch.clone());

    let (_, body) = send(&router, post_json("/jobs", json!({ "subject": "Acme Industries" }))).await;
    let job_id: Uuid = body["jobId"].as_str().unwrap().parse().unwrap();
    orch.wait_for(job_id, Duration::from_millis(5)).await.unwrap();

    let (status, body) = send(&router, get(&format!("/jobs/{}/status", job_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stage"], "error");
    assert_eq!(body["progress"]["current"], 4);
    assert!(body["error"].as_str().unwrap().contains("quota exceeded"));

    let (status, body) = send(&router, get(&format!("/jobs/{}/result", job_id))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "NotReady");
}

#[tokio::test]
async fn test_subjects_listing() {
    let dir = TempDir::new().unwrap();
    let router = create_router(orchestrator(&dir, ScriptedSummarizer::new()));

    let (status, body) = send(&router, get("/subjects")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subjects"][0]["name"], "Acme Industries");
    assert_eq!(body["subjects"][0]["rank"], 1);
}
