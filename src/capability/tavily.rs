//! Tavily web search adapter
//!
//! Turns search hits into EvidenceItems: source domain, a short excerpt,
//! a bounded copy of the raw content, and a confidence tier derived from
//! the authority of the source.

use crate::capability::SearchCapability;
use crate::error::PipelineError;
use crate::models::{truncate_chars, ConfidenceTier, EvidenceItem};
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";
const EXCERPT_MAX_WORDS: usize = 100;
const RAW_CONTENT_MAX_CHARS: usize = 2000;

const HIGH_CONFIDENCE_SOURCES: &[&str] = &[
    "sec.gov",
    "sebi.gov.in",
    "mca.gov.in",
    "bseindia.com",
    "nseindia.com",
    "bloomberg.com",
    "reuters.com",
    "factset.com",
    "finance.yahoo.com",
];

/// Filing and disclosure paths, matched anywhere in the URL.
const HIGH_CONFIDENCE_MARKERS: &[&str] = &["edgar", "xbrl", "investor-relations", "annual-report"];

const MEDIUM_CONFIDENCE_SOURCES: &[&str] = &[
    "seekingalpha.com",
    "morningstar.com",
    "ft.com",
    "wsj.com",
    "economictimes.indiatimes.com",
    "moneycontrol.com",
    "livemint.com",
    "business-standard.com",
];

const LOW_CONFIDENCE_SOURCES: &[&str] = &[
    "reddit.com",
    "quora.com",
    "twitter.com",
    "x.com",
    "facebook.com",
    "medium.com",
];

pub struct TavilySearch {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl TavilySearch {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            endpoint: TAVILY_SEARCH_URL.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SearchCapability for TavilySearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<EvidenceItem>> {
        if self.api_key.is_empty() {
            return Err(PipelineError::ConfigError(
                "TAVILY_API_KEY not configured".to_string(),
            ));
        }

        let payload = TavilyRequest {
            api_key: &self.api_key,
            query,
            search_depth: "advanced",
            include_answer: false,
            include_raw_content: false,
            max_results,
        };

        debug!(query, max_results, "Calling Tavily search");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, query, "Tavily search failed: {}", body);
            return Err(if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                PipelineError::CapabilityUnavailable(format!("Tavily returned {}", status))
            } else {
                PipelineError::SearchError(format!("Tavily returned {}: {}", status, body))
            });
        }

        let body: TavilyResponse = response.json().await.map_err(|e| {
            PipelineError::MalformedResponse(format!("Tavily parse error: {}", e))
        })?;

        let retrieved_at = Utc::now();
        Ok(body
            .results
            .into_iter()
            .take(max_results)
            .map(|hit| to_evidence(hit, retrieved_at))
            .collect())
    }
}

fn to_evidence(hit: TavilyHit, retrieved_at: chrono::DateTime<Utc>) -> EvidenceItem {
    let source_domain = extract_domain(&hit.url);
    let confidence = assess_confidence(&hit.url, &source_domain);
    let raw_content = (!hit.content.is_empty())
        .then(|| truncate_chars(&hit.content, RAW_CONTENT_MAX_CHARS).to_string());

    EvidenceItem {
        excerpt: truncate_words(&hit.content, EXCERPT_MAX_WORDS),
        url: hit.url,
        title: hit.title,
        source_domain,
        retrieved_at,
        confidence,
        raw_content,
    }
}

pub fn extract_domain(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(|h| h.to_string()))
        .unwrap_or_default()
}

/// Authority tier by source. Unknown sources are medium.
pub fn assess_confidence(url: &str, domain: &str) -> ConfidenceTier {
    let url = url.to_lowercase();
    let host = match domain.trim() {
        "" => extract_domain(&url),
        domain => domain.to_lowercase(),
    };
    let matches = |sources: &[&str]| sources.iter().any(|source| host_matches(&host, source));

    if matches(HIGH_CONFIDENCE_SOURCES)
        || HIGH_CONFIDENCE_MARKERS.iter().any(|marker| url.contains(marker))
    {
        ConfidenceTier::High
    } else if matches(MEDIUM_CONFIDENCE_SOURCES) {
        ConfidenceTier::Medium
    } else if matches(LOW_CONFIDENCE_SOURCES) {
        ConfidenceTier::Low
    } else {
        ConfidenceTier::Medium
    }
}

/// Exact host or one of its subdomains; `x.com` does not match `netflix.com`.
fn host_matches(host: &str, source: &str) -> bool {
    host == source
        || host
            .strip_suffix(source)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

pub fn truncate_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        text.to_string()
    } else {
        format!("{}...", words[..max_words].join(" "))
    }
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'a str,
    include_answer: bool,
    include_raw_content: bool,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyHit>,
}

#[derive(Debug, Deserialize)]
struct TavilyHit {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("https://www.reuters.com/markets/asia/acme-2024"),
            "www.reuters.com"
        );
        assert_eq!(extract_domain("not a url"), "");
    }

    #[test]
    fn test_confidence_tiers() {
        assert_eq!(
            assess_confidence("https://www.sebi.gov.in/order", "www.sebi.gov.in"),
            ConfidenceTier::High
        );
        assert_eq!(
            assess_confidence("https://www.reddit.com/r/stocks", "www.reddit.com"),
            ConfidenceTier::Low
        );
        assert_eq!(
            assess_confidence("https://someblog.example/acme", "someblog.example"),
            ConfidenceTier::Medium
        );
        assert_eq!(
            assess_confidence("https://ir.example.com/investor-relations/q3", "ir.example.com"),
            ConfidenceTier::High
        );
    }

    #[test]
    fn test_confidence_matches_whole_host_labels() {
        assert_eq!(
            assess_confidence("https://ir.netflix.com/q3", "ir.netflix.com"),
            ConfidenceTier::Medium
        );
        assert_eq!(
            assess_confidence("https://www.fox.com/news", "www.fox.com"),
            ConfidenceTier::Medium
        );
        assert_eq!(
            assess_confidence("https://blog.example/see-x.com/post", "blog.example"),
            ConfidenceTier::Medium
        );
        assert_eq!(
            assess_confidence("https://x.com/acme/status/1", "x.com"),
            ConfidenceTier::Low
        );
        assert_eq!(
            assess_confidence("https://mobile.x.com/acme", "mobile.x.com"),
            ConfidenceTier::Low
        );
        assert_eq!(
            assess_confidence("https://www.reddit.com/r/stocks", ""),
            ConfidenceTier::Low
        );
        assert!(!host_matches("notreuters.com", "reuters.com"));
        assert!(host_matches("www.reuters.com", "reuters.com"));
    }

    #[test]
    fn test_truncate_words_appends_ellipsis() {
        let text = (0..150).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
        let excerpt = truncate_words(&text, 100);
        assert!(excerpt.ends_with("w99..."));
        assert_eq!(truncate_words("a b c", 100), "a b c");
    }

    #[test]
    fn test_hit_to_evidence_bounds_content() {
        let hit = TavilyHit {
            url: "https://www.bloomberg.com/news/acme".into(),
            title: "Acme results".into(),
            content: "x ".repeat(3000),
        };
        let item = to_evidence(hit, Utc::now());
        assert_eq!(item.source_domain, "www.bloomberg.com");
        assert_eq!(item.confidence, ConfidenceTier::High);
        assert_eq!(item.raw_content.as_ref().map(|c| c.chars().count()), Some(2000));
        assert!(item.excerpt.ends_with("..."));
    }
}
