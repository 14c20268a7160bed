//! Evidence condenser
//!
//! Reduces each category's raw evidence to a bounded [`CategoryEssence`]:
//!
//! 1. keep the first N items of every subtopic, in relevance order
//! 2. cut each item's text to M characters
//! 3. one structured extraction per category
//! 4. lenient parse; any failure yields the sentinel essence and the next
//!    category still runs
//! 5. clamp every list to its maximum
//!
//! Categories run sequentially in numeric index order, so the profile's
//! insertion order is the category order.

use crate::capability::{call_with_retry, ExtractionRequest, RetryPolicy, Summarizer, Task};
use crate::error::PipelineError;
use crate::models::{
    category_index, truncate_chars, CategoryEssence, CategoryEvidence, ConfidenceTier,
    CondensedProfile, KeyMetric, ProgressDetail,
};
use crate::progress::ProgressSink;
use crate::research::EvidenceStore;
use crate::Result;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

const ESSENCE_SYSTEM_PROMPT: &str = "You are a research analyst who extracts core, verifiable \
facts from evidence. Reason over every item, prefer facts over opinion, and surface legal, \
governance and fraud concerns prominently.";

#[derive(Debug, Clone, Copy)]
pub struct CondenserLimits {
    /// N: items kept per subtopic.
    pub max_items_per_subtopic: usize,
    /// M: characters kept per item.
    pub max_excerpt_chars: usize,
}

impl Default for CondenserLimits {
    fn default() -> Self {
        Self {
            max_items_per_subtopic: 10,
            max_excerpt_chars: 500,
        }
    }
}

/// Measured, never enforced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CondensationStats {
    pub evidence_bytes: usize,
    pub profile_bytes: usize,
    /// 1 - profile/evidence; 0 when there was no evidence.
    pub reduction_ratio: f64,
}

impl CondensationStats {
    pub fn measure(evidence_bytes: usize, profile_bytes: usize) -> Self {
        let reduction_ratio = if evidence_bytes == 0 {
            0.0
        } else {
            1.0 - profile_bytes as f64 / evidence_bytes as f64
        };
        Self {
            evidence_bytes,
            profile_bytes,
            reduction_ratio,
        }
    }
}

/// One item after selection and truncation.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedItem {
    pub title: String,
    pub url: String,
    pub source_domain: String,
    pub confidence: ConfidenceTier,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedSubtopic {
    pub subtopic: String,
    pub query: String,
    pub items: Vec<SelectedItem>,
}

pub struct Condenser {
    summarizer: Arc<dyn Summarizer>,
    retry: RetryPolicy,
    limits: CondenserLimits,
}

impl Condenser {
    pub fn new(summarizer: Arc<dyn Summarizer>, retry: RetryPolicy, limits: CondenserLimits) -> Self {
        Self {
            summarizer,
            retry,
            limits,
        }
    }

    /// Produce one essence per category in the store, sentinels included.
    pub async fn condense(
        &self,
        subject: &str,
        store: &EvidenceStore,
        progress: &dyn ProgressSink,
    ) -> Result<(CondensedProfile, CondensationStats)> {
        let mut ordered: Vec<&CategoryEvidence> = store.categories().iter().collect();
        ordered.sort_by_key(|c| category_index(&c.category));

        let total = ordered.len();
        let mut profile = CondensedProfile::new(subject);

        for (idx, category) in ordered.into_iter().enumerate() {
            progress
                .report(ProgressDetail {
                    category: Some(category.category.clone()),
                    category_number: Some(idx + 1),
                    total_categories: Some(total),
                    message: format!("Extracting essence: {}", category.category),
                    ..Default::default()
                })
                .await;

            let essence = self.condense_category(subject, category).await;
            profile.insert(essence)?;
        }

        let stats = CondensationStats::measure(
            store.serialized_size()?,
            serde_json::to_vec(&profile)?.len(),
        );

        info!(
            subject,
            categories = profile.categories_processed,
            failed = profile.failed_categories().count(),
            evidence_bytes = stats.evidence_bytes,
            profile_bytes = stats.profile_bytes,
            reduction_ratio = stats.reduction_ratio,
            "Condensation complete"
        );

        Ok((profile, stats))
    }

    /// Never fails; a failed extraction becomes the sentinel.
    pub async fn condense_category(&self, subject: &str, category: &CategoryEvidence) -> CategoryEssence {
        let selected = select_evidence(category, &self.limits);
        let request = essence_request(subject, &category.category, &selected);
        let summarizer = &self.summarizer;
        let request_ref = &request;

        let outcome = call_with_retry(&self.retry, "extract_essence", move || {
            summarizer.extract(request_ref)
        })
        .await
        .and_then(|value| parse_essence(&category.category, &value, &selected));

        match outcome {
            Ok(essence) => {
                debug!(category = %category.category, facts = essence.core_facts.len(), "Essence extracted");
                essence.clamp()
            }
            Err(e) => {
                warn!(category = %category.category, error = %e, "Essence extraction failed - using sentinel");
                CategoryEssence::sentinel(&category.category, e.to_string())
            }
        }
    }
}

/// Steps 1 and 2: head of each subtopic, text cut on a char boundary.
pub fn select_evidence(category: &CategoryEvidence, limits: &CondenserLimits) -> Vec<SelectedSubtopic> {
    category
        .subtopics
        .iter()
        .map(|subtopic| SelectedSubtopic {
            subtopic: subtopic.subtopic.clone(),
            query: subtopic.query.clone(),
            items: subtopic
                .evidence
                .iter()
                .take(limits.max_items_per_subtopic)
                .map(|item| {
                    let text = item.raw_content.as_deref().unwrap_or(&item.excerpt);
                    SelectedItem {
                        title: item.title.clone(),
                        url: item.url.clone(),
                        source_domain: item.source_domain.clone(),
                        confidence: item.confidence,
                        text: truncate_chars(text, limits.max_excerpt_chars).to_string(),
                    }
                })
                .collect(),
        })
        .collect()
}

/// Step 3.
pub fn essence_request(subject: &str, category: &str, selected: &[SelectedSubtopic]) -> ExtractionRequest {
    let mut evidence = String::new();
    for subtopic in selected {
        let _ = write!(
            evidence,
            "\n\nSubtopic: {}\nQuery: {}\nEvidence:\n",
            subtopic.subtopic, subtopic.query
        );
        for (i, item) in subtopic.items.iter().enumerate() {
            let _ = write!(
                evidence,
                "\n{}. Title: {}\n   Source: {} ({})\n   Confidence: {}\n   Content: {}\n",
                i + 1,
                item.title,
                item.source_domain,
                item.url,
                item.confidence,
                item.text
            );
        }
    }

    let prompt = format!(
        r#"Extract the core facts and essence of the research evidence about {subject}.

Category: {category}

Research Evidence:{evidence}

Instructions:
- Identify the most important verifiable facts, numbers, dates, names and quotes.
- List risks, red flags and concerns with their sources; fraud, legal and governance issues first.
- List strengths and positive indicators with their sources.
- Judge the overall quality of the sources (high, medium or low).
- If there is no usable evidence, say so in the summary.

Respond with a single JSON object:
{{
  "category": "{category}",
  "core_facts": ["fact with source and date", ...],
  "key_numbers": [{{"metric": "name", "value": "value", "source": "citation"}}, ...],
  "risks_and_red_flags": ["risk with source", ...],
  "strengths": ["strength with source", ...],
  "key_quotes": ["quote with source", ...],
  "source_quality": "high|medium|low",
  "summary": "about 200 words on the most important findings"
}}

At most {facts} core facts, {numbers} key numbers, {risks} risks, {strengths} strengths and {quotes} quotes."#,
        subject = subject,
        category = category,
        evidence = evidence,
        facts = CategoryEssence::MAX_CORE_FACTS,
        numbers = CategoryEssence::MAX_KEY_NUMBERS,
        risks = CategoryEssence::MAX_RISKS,
        strengths = CategoryEssence::MAX_STRENGTHS,
        quotes = CategoryEssence::MAX_QUOTES,
    );

    ExtractionRequest {
        task: Task::CategoryEssence {
            category: category.to_string(),
        },
        system: ESSENCE_SYSTEM_PROMPT.to_string(),
        prompt,
        temperature: 0.2,
    }
}

/// Step 4. The category key always comes from the caller, never the response.
pub fn parse_essence(category: &str, value: &Value, selected: &[SelectedSubtopic]) -> Result<CategoryEssence> {
    let object = value.as_object().ok_or_else(|| {
        PipelineError::MalformedResponse("essence response is not a JSON object".to_string())
    })?;

    let summary = object.get("summary").and_then(Value::as_str).map(str::to_string);
    let core_facts = string_list(object.get("core_facts"));

    if summary.is_none() && core_facts.is_empty() {
        return Err(PipelineError::MalformedResponse(format!(
            "essence for {} has neither summary nor core_facts",
            category
        )));
    }

    Ok(CategoryEssence {
        category: category.to_string(),
        core_facts,
        key_numbers: key_numbers(object.get("key_numbers")),
        risks_and_red_flags: string_list(object.get("risks_and_red_flags")),
        strengths: string_list(object.get("strengths")),
        key_quotes: string_list(object.get("key_quotes")),
        source_quality: source_quality(object.get("source_quality"))
            .unwrap_or_else(|| majority_tier(selected)),
        summary: summary.unwrap_or_default(),
        error: None,
    })
}

/// Strings as-is; other scalars stringified; objects by their text-like field.
fn string_list(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Object(map) => ["description", "text", "fact", "quote"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .map(str::to_string)
                .or_else(|| Some(item.to_string())),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Array of `{metric, value, source}` or a `{metric: value}` map.
fn key_numbers(value: Option<&Value>) -> Vec<KeyMetric> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                let map = item.as_object()?;
                let metric = map
                    .get("metric")
                    .or_else(|| map.get("name"))
                    .and_then(scalar_text)?;
                Some(KeyMetric {
                    metric,
                    value: map.get("value").and_then(scalar_text).unwrap_or_default(),
                    source: map.get("source").and_then(scalar_text).unwrap_or_default(),
                })
            })
            .collect(),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(metric, entry)| match entry {
                Value::Object(inner) => KeyMetric {
                    metric: metric.clone(),
                    value: inner.get("value").and_then(scalar_text).unwrap_or_default(),
                    source: inner.get("source").and_then(scalar_text).unwrap_or_default(),
                },
                other => KeyMetric {
                    metric: metric.clone(),
                    value: scalar_text(other).unwrap_or_else(|| other.to_string()),
                    source: String::new(),
                },
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// A tier string, or `{high_confidence_sources: [..], ...}` judged by the longest list.
fn source_quality(value: Option<&Value>) -> Option<ConfidenceTier> {
    match value? {
        Value::String(s) => ConfidenceTier::parse(s),
        Value::Object(map) => {
            let count = |key: &str| map.get(key).and_then(Value::as_array).map_or(0, Vec::len);
            let tallies = [
                (ConfidenceTier::Low, count("low_confidence_sources")),
                (ConfidenceTier::Medium, count("medium_confidence_sources")),
                (ConfidenceTier::High, count("high_confidence_sources")),
            ];
            pick_majority(&tallies)
        }
        _ => None,
    }
}

/// Most common tier among the selected items; ties go to the lower tier.
fn majority_tier(selected: &[SelectedSubtopic]) -> ConfidenceTier {
    let items = selected.iter().flat_map(|s| s.items.iter());
    let mut tallies = [
        (ConfidenceTier::Low, 0usize),
        (ConfidenceTier::Medium, 0),
        (ConfidenceTier::High, 0),
    ];
    for item in items {
        if let Some(slot) = tallies.iter_mut().find(|(tier, _)| *tier == item.confidence) {
            slot.1 += 1;
        }
    }
    pick_majority(&tallies).unwrap_or(ConfidenceTier::Low)
}

/// `tallies` ordered from lowest to highest tier.
fn pick_majority(tallies: &[(ConfidenceTier, usize)]) -> Option<ConfidenceTier> {
    let best = tallies.iter().map(|(_, n)| *n).max()?;
    if best == 0 {
        return None;
    }
    tallies.iter().find(|(_, n)| *n == best).map(|(tier, _)| *tier)
}
