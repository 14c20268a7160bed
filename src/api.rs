//! REST API server for the research pipeline
//!
//! Submit a job, poll its status, fetch the result once it completes.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::models::{ConfidenceTier, FinancialInputs, JobStatus, Recommendation, ValidationResult};
use crate::orchestrator::Orchestrator;

/// =============================
/// Request / Response Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SubmitRequest {
    #[serde(alias = "company")]
    pub subject: String,
    #[serde(default, alias = "financialInputs")]
    pub financial_inputs: Option<FinancialInputs>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultResponse {
    pub report: String,
    pub executive_summary: String,
    pub validation: ValidationResult,
    pub report_path: String,
    pub recommendation: Recommendation,
    pub confidence: ConfidenceTier,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
    pub timestamp: String,
}

/// =============================
/// Error Mapping
/// =============================

pub struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        ApiError(e)
    }
}

fn status_for(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::JobNotFound(_) | PipelineError::UnknownSubject(_) => StatusCode::NOT_FOUND,
        PipelineError::JobNotReady { .. } | PipelineError::JobActive { .. } => StatusCode::CONFLICT,
        PipelineError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::UuidError(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            warn!(error = %self.0, "Request failed");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            kind: self.0.kind().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}

fn parse_job_id(raw: &str) -> Result<Uuid, ApiError> {
    Ok(Uuid::parse_str(raw.trim()).map_err(PipelineError::from)?)
}

/// =============================
/// Handlers
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn list_subjects(State(orchestrator): State<Orchestrator>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "subjects": orchestrator.subjects().await }))
}

async fn list_jobs(
    State(orchestrator): State<Orchestrator>,
) -> Result<Json<Vec<JobStatus>>, ApiError> {
    Ok(Json(orchestrator.list().await?))
}

async fn submit_job(
    State(orchestrator): State<Orchestrator>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let Json(req) = payload.map_err(|e| PipelineError::InvalidInput(e.body_text()))?;
    info!(subject = %req.subject, "Received job submission");

    let job_id = orchestrator.submit(&req.subject, req.financial_inputs).await?;
    Ok((StatusCode::ACCEPTED, Json(SubmitResponse { job_id })))
}

async fn job_status(
    State(orchestrator): State<Orchestrator>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatus>, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    Ok(Json(orchestrator.status(job_id).await?))
}

async fn job_result(
    State(orchestrator): State<Orchestrator>,
    Path(job_id): Path<String>,
) -> Result<Json<ResultResponse>, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    let result = orchestrator.result(job_id).await?;

    Ok(Json(ResultResponse {
        report: result.report.clone(),
        executive_summary: result.executive_summary.clone(),
        validation: result.validation.clone(),
        report_path: result.report_path.clone(),
        recommendation: result.validation.recommendation,
        confidence: result.validation.confidence,
    }))
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Orchestrator) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/subjects", get(list_subjects))
        .route("/jobs", get(list_jobs).post(submit_job))
        .route("/jobs/:job_id/status", get(job_status))
        .route("/jobs/:job_id/result", get(job_result))
        .with_state(orchestrator)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Orchestrator,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            status_for(&PipelineError::JobNotFound(Uuid::nil())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&PipelineError::UnknownSubject("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&PipelineError::JobNotReady {
                job_id: Uuid::nil(),
                stage: crate::stage::Stage::Researching
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&PipelineError::InvalidInput("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&PipelineError::ArtifactError("disk".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_malformed_job_id_is_bad_request() {
        let Err(ApiError(err)) = parse_job_id("not-a-uuid") else {
            panic!("expected parse failure");
        };
        assert_eq!(status_for(&err), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_submit_request_accepts_company_alias() {
        let req: SubmitRequest =
            serde_json::from_str(r#"{"company": "Acme", "financial_inputs": {"prom_hold": 55}}"#)
                .unwrap();
        assert_eq!(req.subject, "Acme");
        assert_eq!(req.financial_inputs.unwrap().promoter_holding_pct, Some(55.0));
    }
}
