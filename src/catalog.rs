//! Subject catalog: resolves a submitted identifier to a known subject.

use crate::config::Settings;
use crate::error::PipelineError;
use crate::models::Subject;
use crate::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[async_trait]
pub trait SubjectCatalog: Send + Sync {
    /// Resolve by case-insensitive name, or by rank written as `3` or `#3`.
    async fn resolve(&self, identifier: &str) -> Option<Subject>;

    async fn list(&self) -> Vec<Subject>;
}

pub struct InMemoryCatalog {
    subjects: Vec<Subject>,
    open: bool,
}

impl InMemoryCatalog {
    pub fn new(subjects: Vec<Subject>) -> Self {
        Self {
            subjects,
            open: false,
        }
    }

    /// Accepts any non-blank identifier as a subject name.
    pub fn open() -> Self {
        Self {
            subjects: Vec::new(),
            open: true,
        }
    }

    /// `[{name, rank?, financial_inputs?}]`
    pub async fn from_json_file(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            PipelineError::ConfigError(format!(
                "cannot read subject catalog {}: {}",
                path.display(),
                e
            ))
        })?;
        let subjects: Vec<Subject> = serde_json::from_str(&raw)?;

        for subject in &subjects {
            if subject.name.trim().is_empty() {
                return Err(PipelineError::ConfigError(
                    "subject catalog contains a blank name".to_string(),
                ));
            }
            if let Some(inputs) = &subject.financial_inputs {
                inputs.validate()?;
            }
        }

        Ok(Self::new(subjects))
    }

    fn find(&self, identifier: &str) -> Option<&Subject> {
        let rank = identifier
            .strip_prefix('#')
            .unwrap_or(identifier)
            .parse::<u32>()
            .ok();

        self.subjects.iter().find(|s| {
            s.name.eq_ignore_ascii_case(identifier)
                || (rank.is_some() && s.rank == rank)
        })
    }
}

/// The configured catalog file, or an open catalog when none is set.
pub async fn from_settings(settings: &Settings) -> Result<Arc<dyn SubjectCatalog>> {
    match &settings.subject_catalog_path {
        Some(path) => {
            let catalog = InMemoryCatalog::from_json_file(path).await?;
            info!(path = %path.display(), subjects = catalog.subjects.len(), "Subject catalog loaded");
            Ok(Arc::new(catalog))
        }
        None => Ok(Arc::new(InMemoryCatalog::open())),
    }
}

#[async_trait]
impl SubjectCatalog for InMemoryCatalog {
    async fn resolve(&self, identifier: &str) -> Option<Subject> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return None;
        }

        if let Some(subject) = self.find(identifier) {
            return Some(subject.clone());
        }

        self.open.then(|| Subject {
            name: identifier.to_string(),
            rank: None,
            financial_inputs: None,
        })
    }

    async fn list(&self) -> Vec<Subject> {
        self.subjects.clone()
    }
}
