//! Job registry
//!
//! Shared map of job id → JobRecord. Writers are the single task owning a job;
//! readers are any number of status pollers. Every update replaces the stored
//! snapshot as a whole, so a reader sees either the previous or the new record.

use crate::artifacts::subject_key;
use crate::error::PipelineError;
use crate::models::JobRecord;
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Mutation applied to a private copy of a record before it is committed.
pub type RecordUpdate = Box<dyn FnOnce(&mut JobRecord) -> Result<()> + Send>;

/// Trait for job record storage
#[async_trait::async_trait]
pub trait JobRegistry: Send + Sync {
    /// Register a new job. Fails on a duplicate id, or when another
    /// non-terminal job already exists for the same subject.
    async fn insert(&self, record: JobRecord) -> Result<Arc<JobRecord>>;

    async fn get(&self, job_id: Uuid) -> Result<Arc<JobRecord>>;

    /// Apply `update` atomically. If it fails, the stored record is unchanged.
    async fn update(&self, job_id: Uuid, update: RecordUpdate) -> Result<Arc<JobRecord>>;

    /// All jobs, oldest first.
    async fn list(&self) -> Result<Vec<Arc<JobRecord>>>;
}

/// In-memory registry; lives as long as the process
pub struct InMemoryJobRegistry {
    records: Arc<RwLock<HashMap<Uuid, Arc<JobRecord>>>>,
}

impl InMemoryJobRegistry {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryJobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl JobRegistry for InMemoryJobRegistry {

    async fn insert(&self, record: JobRecord) -> Result<Arc<JobRecord>> {
        let mut records = self.records.write().await;

        if records.contains_key(&record.job_id) {
            return Err(PipelineError::DuplicateJob(record.job_id));
        }

        let key = subject_key(&record.subject);
        if let Some(active) = records
            .values()
            .find(|existing| !existing.stage.is_terminal() && subject_key(&existing.subject) == key)
        {
            return Err(PipelineError::JobActive {
                subject: record.subject.clone(),
                job_id: active.job_id,
            });
        }

        let record = Arc::new(record);
        records.insert(record.job_id, Arc::clone(&record));
        Ok(record)
    }

    async fn get(&self, job_id: Uuid) -> Result<Arc<JobRecord>> {
        let records = self.records.read().await;
        records
            .get(&job_id)
            .cloned()
            .ok_or(PipelineError::JobNotFound(job_id))
    }

    async fn update(&self, job_id: Uuid, update: RecordUpdate) -> Result<Arc<JobRecord>> {
        let mut records = self.records.write().await;

        let current = records
            .get(&job_id)
            .ok_or(PipelineError::JobNotFound(job_id))?;

        let mut draft = JobRecord::clone(current);
        update(&mut draft)?;

        let committed = Arc::new(draft);
        records.insert(job_id, Arc::clone(&committed));
        Ok(committed)
    }

    async fn list(&self) -> Result<Vec<Arc<JobRecord>>> {
        let records = self.records.read().await;
        let mut all: Vec<Arc<JobRecord>> = records.values().cloned().collect();
        all.sort_by_key(|record| record.created_at);
        Ok(all)
    }
}
