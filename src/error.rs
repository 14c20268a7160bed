//! Error types for the research pipeline

use crate::stage::Stage;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {

    // =============================
    // Job Lifecycle Errors
    // =============================

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Job {job_id} is not ready (stage: {stage})")]
    JobNotReady { job_id: Uuid, stage: Stage },

    #[error("A job for '{subject}' is already active: {job_id}")]
    JobActive { subject: String, job_id: Uuid },

    #[error("Duplicate job id: {0}")]
    DuplicateJob(Uuid),

    #[error("Job {0} is terminal and can no longer change")]
    JobTerminal(Uuid),

    #[error("Invalid stage transition: {from} -> {to}")]
    InvalidTransition { from: Stage, to: Stage },

    // =============================
    // Input Errors
    // =============================

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown subject: {0}")]
    UnknownSubject(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // Capability Errors
    // =============================

    #[error("Search error: {0}")]
    SearchError(String),

    #[error("Summarizer error: {0}")]
    SummarizerError(String),

    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("Capability call '{operation}' timed out after {timeout_ms} ms")]
    CapabilityTimeout { operation: String, timeout_ms: u64 },

    #[error("Malformed capability response: {0}")]
    MalformedResponse(String),

    // =============================
    // Stage Errors
    // =============================

    #[error("{stage} failed: {reason}")]
    StageFailed { stage: Stage, reason: String },

    #[error("Artifact error: {0}")]
    ArtifactError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("UUID parse error: {0}")]
    UuidError(#[from] uuid::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PipelineError {
    /// Stable machine-readable name, surfaced by the HTTP layer.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::JobNotFound(_) => "NotFound",
            PipelineError::JobNotReady { .. } => "NotReady",
            PipelineError::JobActive { .. } => "JobActive",
            PipelineError::DuplicateJob(_) => "DuplicateJob",
            PipelineError::JobTerminal(_) => "JobTerminal",
            PipelineError::InvalidTransition { .. } => "InvalidTransition",
            PipelineError::InvalidInput(_) => "InvalidInput",
            PipelineError::UnknownSubject(_) => "UnknownSubject",
            PipelineError::ConfigError(_) => "ConfigError",
            PipelineError::SearchError(_) => "SearchError",
            PipelineError::SummarizerError(_) => "SummarizerError",
            PipelineError::CapabilityUnavailable(_) => "CapabilityUnavailable",
            PipelineError::CapabilityTimeout { .. } => "CapabilityTimeout",
            PipelineError::MalformedResponse(_) => "MalformedResponse",
            PipelineError::StageFailed { .. } => "StageFailed",
            PipelineError::ArtifactError(_) => "ArtifactError",
            PipelineError::SerializationError(_) => "SerializationError",
            PipelineError::HttpError(_) => "HttpError",
            PipelineError::UuidError(_) => "UuidError",
            PipelineError::IoError(_) => "IoError",
        }
    }

    /// Whether a capability call that failed this way may be attempted again.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::CapabilityUnavailable(_) | PipelineError::CapabilityTimeout { .. } => {
                true
            }
            PipelineError::HttpError(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().map_or(false, |s| s.is_server_error() || s.as_u16() == 429)
            }
            _ => false,
        }
    }

    pub fn stage_failed(stage: Stage, reason: impl Into<String>) -> Self {
        PipelineError::StageFailed {
            stage,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(PipelineError::CapabilityUnavailable("429".into()).is_transient());
        assert!(PipelineError::CapabilityTimeout {
            operation: "search".into(),
            timeout_ms: 10
        }
        .is_transient());
        assert!(!PipelineError::MalformedResponse("bad json".into()).is_transient());
        assert!(!PipelineError::SearchError("401".into()).is_transient());
    }

    #[test]
    fn test_kinds_are_distinct_for_reads() {
        let not_found = PipelineError::JobNotFound(Uuid::nil());
        let not_ready = PipelineError::JobNotReady {
            job_id: Uuid::nil(),
            stage: Stage::Researching,
        };
        assert_eq!(not_found.kind(), "NotFound");
        assert_eq!(not_ready.kind(), "NotReady");
        assert!(not_ready.to_string().contains("Researching"));
    }
}
