//! Environment-driven settings.

use crate::capability::RetryPolicy;
use crate::error::PipelineError;
use crate::Result;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub tavily_api_key: Option<String>,
    pub research_output_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub max_results_per_subtopic: usize,
    pub max_items_per_subtopic: usize,
    pub max_excerpt_chars: usize,
    pub capability_timeout: Duration,
    pub capability_max_attempts: u32,
    pub capability_backoff: Duration,
    pub subject_catalog_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: 8080,
            gemini_api_key: None,
            gemini_model: "gemini-2.0-flash".to_string(),
            tavily_api_key: None,
            research_output_dir: PathBuf::from("research_output"),
            reports_dir: PathBuf::from("reports"),
            max_results_per_subtopic: 10,
            max_items_per_subtopic: 10,
            max_excerpt_chars: 500,
            capability_timeout: Duration::from_secs(60),
            capability_max_attempts: 3,
            capability_backoff: Duration::from_millis(500),
            subject_catalog_path: None,
        }
    }
}

impl Settings {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup. Unset or blank keys take defaults;
    /// malformed values are rejected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let port = match get("PORT").or_else(|| get("API_PORT")) {
            Some(raw) => parse_value("PORT", &raw)?,
            None => defaults.port,
        };

        let settings = Self {
            port,
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_model: get("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            tavily_api_key: get("TAVILY_API_KEY"),
            research_output_dir: get("RESEARCH_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.research_output_dir),
            reports_dir: get("REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.reports_dir),
            max_results_per_subtopic: parse_or(
                &get,
                "MAX_RESULTS_PER_SUBTOPIC",
                defaults.max_results_per_subtopic,
            )?,
            max_items_per_subtopic: parse_or(
                &get,
                "MAX_ITEMS_PER_SUBTOPIC",
                defaults.max_items_per_subtopic,
            )?,
            max_excerpt_chars: parse_or(&get, "MAX_EXCERPT_CHARS", defaults.max_excerpt_chars)?,
            capability_timeout: Duration::from_secs(parse_or(
                &get,
                "CAPABILITY_TIMEOUT_SECS",
                defaults.capability_timeout.as_secs(),
            )?),
            capability_max_attempts: parse_or(
                &get,
                "CAPABILITY_MAX_ATTEMPTS",
                defaults.capability_max_attempts,
            )?,
            capability_backoff: Duration::from_millis(parse_or(
                &get,
                "CAPABILITY_BACKOFF_MS",
                defaults.capability_backoff.as_millis() as u64,
            )?),
            subject_catalog_path: get("SUBJECT_CATALOG_PATH").map(PathBuf::from),
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        let zero = [
            ("MAX_RESULTS_PER_SUBTOPIC", self.max_results_per_subtopic == 0),
            ("MAX_ITEMS_PER_SUBTOPIC", self.max_items_per_subtopic == 0),
            ("MAX_EXCERPT_CHARS", self.max_excerpt_chars == 0),
            ("CAPABILITY_TIMEOUT_SECS", self.capability_timeout.is_zero()),
            ("CAPABILITY_MAX_ATTEMPTS", self.capability_max_attempts == 0),
        ];
        match zero.iter().find(|(_, is_zero)| *is_zero) {
            Some((key, _)) => Err(PipelineError::ConfigError(format!(
                "{} must be greater than zero",
                key
            ))),
            None => Ok(()),
        }
    }

    /// Both live capabilities have credentials.
    pub fn has_live_capabilities(&self) -> bool {
        self.gemini_api_key.is_some() && self.tavily_api_key.is_some()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.capability_max_attempts,
            initial_backoff: self.capability_backoff,
            call_timeout: self.capability_timeout,
            ..RetryPolicy::default()
        }
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse().map_err(|_| {
        PipelineError::ConfigError(format!("{} has an invalid value: {:?}", key, raw))
    })
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}
