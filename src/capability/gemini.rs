//! Gemini-backed summarizer
//!
//! Uses a long-lived reqwest::Client for connection pooling.
//! `extract` asks for a JSON response; `draft` returns prose.

use crate::capability::{parse_json_payload, ExtractionRequest, Summarizer};
use crate::error::PipelineError;
use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiSummarizer {
    client: Client,
    api_key: String,
    endpoint: String,
    max_output_tokens: i32,
}

impl GeminiSummarizer {
    pub fn new(api_key: String, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/{}:generateContent", DEFAULT_BASE_URL, model),
            max_output_tokens: 8192,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn generate(&self, request: &ExtractionRequest, json_mode: bool) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(PipelineError::ConfigError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}?key={}", self.endpoint, self.api_key);

        let body = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: request.prompt.clone(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: self.max_output_tokens,
                response_mime_type: json_mode.then(|| "application/json".to_string()),
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: request.system.clone(),
                }],
            },
        };

        debug!(task = %request.task, json_mode, "Calling Gemini API");

        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(task = %request.task, %status, "Gemini API error response: {}", error_text);
            return Err(classify_status(status, error_text));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            PipelineError::MalformedResponse(format!("Gemini parse error: {}", e))
        })?;

        gemini_response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::SummarizerError("Empty response from Gemini".to_string())
            })
    }
}

/// Rate limits and server errors are worth retrying; anything else is not.
fn classify_status(status: StatusCode, body: String) -> PipelineError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        PipelineError::CapabilityUnavailable(format!("Gemini returned {}: {}", status, body))
    } else {
        PipelineError::SummarizerError(format!("Gemini returned {}: {}", status, body))
    }
}

#[async_trait]
impl Summarizer for GeminiSummarizer {
    async fn extract(&self, request: &ExtractionRequest) -> Result<serde_json::Value> {
        let raw = self.generate(request, true).await?;
        parse_json_payload(&raw)
    }

    async fn draft(&self, request: &ExtractionRequest) -> Result<String> {
        self.generate(request, false).await
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}
