//! Job orchestrator
//!
//! SUBMIT → SELECT → RESEARCH → CONDENSE → REPORT → VALIDATE → PERSIST → COMPLETE
//!
//! `submit` validates synchronously and returns as soon as the record exists.
//! The stages then run on one spawned task per job, which is the only writer
//! of that job's record. Any failure moves the job to `Error` and nothing
//! after it runs.

use crate::artifacts::ArtifactStore;
use crate::capability::{RetryPolicy, SearchCapability, Summarizer};
use crate::catalog::SubjectCatalog;
use crate::condenser::{Condenser, CondenserLimits};
use crate::config::Settings;
use crate::decision::DecisionEngine;
use crate::error::PipelineError;
use crate::models::{FinancialInputs, JobRecord, JobResult, JobStatus, ProgressDetail, Subject};
use crate::progress::ProgressSink;
use crate::report::{render_markdown, ReportWriter};
use crate::research::{ResearchAgent, ResearchCategory, CATEGORIES};
use crate::stage::Stage;
use crate::state::JobRegistry;
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Tunables shared by every job.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub retry: RetryPolicy,
    pub max_results_per_subtopic: usize,
    pub limits: CondenserLimits,
    pub categories: &'static [ResearchCategory],
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_results_per_subtopic: 10,
            limits: CondenserLimits::default(),
            categories: CATEGORIES,
        }
    }
}

impl PipelineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            retry: settings.retry_policy(),
            max_results_per_subtopic: settings.max_results_per_subtopic,
            limits: CondenserLimits {
                max_items_per_subtopic: settings.max_items_per_subtopic,
                max_excerpt_chars: settings.max_excerpt_chars,
            },
            categories: CATEGORIES,
        }
    }
}

/// Everything one job run needs; shared by all spawned job tasks.
struct Pipeline {
    registry: Arc<dyn JobRegistry>,
    catalog: Arc<dyn SubjectCatalog>,
    research: ResearchAgent,
    condenser: Condenser,
    reporter: ReportWriter,
    decision: DecisionEngine,
    artifacts: Arc<ArtifactStore>,
}

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Pipeline>,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        registry: Arc<dyn JobRegistry>,
        catalog: Arc<dyn SubjectCatalog>,
        search: Arc<dyn SearchCapability>,
        summarizer: Arc<dyn Summarizer>,
        artifacts: Arc<ArtifactStore>,
    ) -> Self {
        let research = ResearchAgent::new(
            search,
            Arc::clone(&artifacts),
            config.retry.clone(),
            config.max_results_per_subtopic,
        )
        .with_categories(config.categories);

        let pipeline = Pipeline {
            registry,
            catalog,
            research,
            condenser: Condenser::new(Arc::clone(&summarizer), config.retry.clone(), config.limits),
            reporter: ReportWriter::new(Arc::clone(&summarizer), config.retry.clone()),
            decision: DecisionEngine::new(summarizer, config.retry),
            artifacts,
        };

        Self {
            inner: Arc::new(pipeline),
        }
    }

    /// Validate, register, and start a job. Returns before any stage runs.
    ///
    /// Submitted inputs take precedence over the catalog's; with neither, the
    /// job runs with every metric missing.
    pub async fn submit(
        &self,
        subject: &str,
        financial_inputs: Option<FinancialInputs>,
    ) -> Result<Uuid> {
        let identifier = subject.trim();
        if identifier.is_empty() {
            return Err(PipelineError::UnknownSubject(
                "subject must not be blank".to_string(),
            ));
        }

        let resolved = self
            .inner
            .catalog
            .resolve(identifier)
            .await
            .ok_or_else(|| PipelineError::UnknownSubject(identifier.to_string()))?;

        let inputs = financial_inputs
            .or(resolved.financial_inputs)
            .unwrap_or_default();
        inputs.validate()?;

        let record = self
            .inner
            .registry
            .insert(JobRecord::new(resolved.name, inputs))
            .await?;
        let job_id = record.job_id;

        info!(job_id = %job_id, subject = %record.subject, "Job submitted");

        let pipeline = Arc::clone(&self.inner);
        tokio::spawn(
            async move { pipeline.run_job(job_id).await }
                .instrument(info_span!("job", job_id = %job_id)),
        );

        Ok(job_id)
    }

    pub async fn status(&self, job_id: Uuid) -> Result<JobStatus> {
        Ok(self.inner.registry.get(job_id).await?.status())
    }

    /// The outcome of a completed job; `NotReady` with the current stage otherwise.
    pub async fn result(&self, job_id: Uuid) -> Result<Arc<JobResult>> {
        let record = self.inner.registry.get(job_id).await?;
        match (&record.stage, &record.result) {
            (Stage::Completed, Some(result)) => Ok(Arc::clone(result)),
            (stage, _) => Err(PipelineError::JobNotReady {
                job_id,
                stage: *stage,
            }),
        }
    }

    pub async fn list(&self) -> Result<Vec<JobStatus>> {
        let records = self.inner.registry.list().await?;
        Ok(records.iter().map(|r| r.status()).collect())
    }

    pub async fn subjects(&self) -> Vec<Subject> {
        self.inner.catalog.list().await
    }

    /// Poll until the job reaches `Completed` or `Error`.
    pub async fn wait_for(&self, job_id: Uuid, poll: Duration) -> Result<JobStatus> {
        loop {
            let status = self.status(job_id).await?;
            if status.stage.is_terminal() {
                return Ok(status);
            }
            tokio::time::sleep(poll).await;
        }
    }
}

impl Pipeline {
    async fn run_job(&self, job_id: Uuid) {
        let start = Instant::now();

        match self.execute(job_id).await {
            Ok(()) => info!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Job completed"
            ),
            Err(e) => {
                error!(error = %e, "Job failed");
                let reason = e.to_string();
                if let Err(commit) = self
                    .registry
                    .update(job_id, Box::new(move |r: &mut JobRecord| r.fail(reason)))
                    .await
                {
                    error!(error = %commit, "Could not record job failure");
                }
            }
        }
    }

    async fn advance(&self, job_id: Uuid, to: Stage, message: String) -> Result<()> {
        self.registry
            .update(job_id, Box::new(move |r: &mut JobRecord| r.advance(to, message)))
            .await?;
        info!(stage = %to, "Stage entered");
        Ok(())
    }

    async fn execute(&self, job_id: Uuid) -> Result<()> {
        let record = self.registry.get(job_id).await?;
        let subject = record.subject.clone();
        let inputs = record.financial_inputs.clone();
        let progress = JobProgress {
            registry: Arc::clone(&self.registry),
            job_id,
        };

        // === SELECT ===
        self.advance(job_id, Stage::CompanySelected, format!("Selected: {}", subject))
            .await?;

        // === RESEARCH ===
        self.advance(
            job_id,
            Stage::Researching,
            format!("Researching {} across all categories", subject),
        )
        .await?;
        let research = self.research.run(job_id, &subject, &progress).await?;
        debug!(
            documents = research.documents.len(),
            items = research.store.total_items(),
            "Research documents written"
        );

        // === CONDENSE ===
        self.advance(
            job_id,
            Stage::Preprocessing,
            "Condensing research into category essences".to_string(),
        )
        .await?;
        let (profile, profile_doc) = {
            let store = research.store;
            let (profile, _stats) = self.condenser.condense(&subject, &store, &progress).await?;
            let doc = self.artifacts.save_profile(job_id, &profile).await?;
            (profile, doc)
        };
        if profile.failed_categories().count() > 0 {
            warn!(
                failed = profile.failed_categories().count(),
                "Continuing with sentinel essences"
            );
        }

        // === REPORT ===
        self.advance(
            job_id,
            Stage::ReportGeneration,
            "Drafting analyst report".to_string(),
        )
        .await?;
        let report = self.reporter.draft_report(&subject, &inputs, &profile).await?;

        // === VALIDATE ===
        self.advance(
            job_id,
            Stage::Validating,
            "Validating recommendation".to_string(),
        )
        .await?;
        let validation = self
            .decision
            .validate(&subject, &inputs, &profile, &report)
            .await?;

        // === PERSIST ===
        let executive_summary = self.reporter.executive_summary(&subject, &validation).await;
        let date = Utc::now().format("%Y-%m-%d").to_string();
        let markdown = render_markdown(&subject, &date, &report, &validation, &executive_summary);
        let report_doc = self.artifacts.save_report(job_id, &subject, &markdown).await?;

        info!(
            recommendation = %validation.recommendation,
            report_path = %report_doc.path.display(),
            "Report persisted"
        );

        let result = JobResult {
            report,
            executive_summary,
            validation,
            report_path: report_doc.path.display().to_string(),
            report_sha256: report_doc.sha256,
            profile_path: profile_doc.path.display().to_string(),
        };
        self.registry
            .update(job_id, Box::new(move |r: &mut JobRecord| r.complete(result)))
            .await?;

        Ok(())
    }
}

/// Writes sub-step detail onto the job record.
struct JobProgress {
    registry: Arc<dyn JobRegistry>,
    job_id: Uuid,
}

#[async_trait]
impl ProgressSink for JobProgress {
    async fn report(&self, detail: ProgressDetail) {
        if let Err(e) = self
            .registry
            .update(self.job_id, Box::new(move |r: &mut JobRecord| r.set_detail(detail)))
            .await
        {
            warn!(job_id = %self.job_id, error = %e, "Progress update dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{ScriptedSummarizer, StaticSearch};
    use crate::catalog::InMemoryCatalog;
    use crate::models::Recommendation;
    use crate::state::InMemoryJobRegistry;
    use tempfile::TempDir;

    static SMALL: &[ResearchCategory] = &[
        ResearchCategory {
            id: "1_business",
            subtopics: &["segments", "competition"],
        },
        ResearchCategory {
            id: "2_financials",
            subtopics: &["cash flow"],
        },
    ];

    fn config() -> PipelineConfig {
        PipelineConfig {
            retry: RetryPolicy {
                max_attempts: 1,
                call_timeout: Duration::from_secs(5),
                ..RetryPolicy::default()
            },
            max_results_per_subtopic: 3,
            limits: CondenserLimits::default(),
            categories: SMALL,
        }
    }

    fn orchestrator(
        dir: &TempDir,
        search: StaticSearch,
        summarizer: ScriptedSummarizer,
    ) -> (Orchestrator, Arc<InMemoryJobRegistry>) {
        let registry = Arc::new(InMemoryJobRegistry::new());
        let orch = Orchestrator::new(
            config(),
            registry.clone(),
            Arc::new(InMemoryCatalog::open()),
            Arc::new(search),
            Arc::new(summarizer),
            Arc::new(ArtifactStore::new(
                dir.path().join("research"),
                dir.path().join("reports"),
            )),
        );
        (orch, registry)
    }

    fn healthy() -> FinancialInputs {
        FinancialInputs {
            promoter_holding_pct: Some(62.0),
            fii_holding_change_pct: Some(0.8),
            dii_holding_change_pct: Some(0.3),
            debt_to_equity: Some(0.2),
            free_cash_flow_3y: Some(850.0),
            working_capital_days: Some(45.0),
            cash_conversion_cycle_days: Some(30.0),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_job_runs_to_completion() {
        let dir = TempDir::new().unwrap();
        let (orch, registry) = orchestrator(&dir, StaticSearch::new(3), ScriptedSummarizer::new());

        let job_id = orch.submit("Acme Industries", Some(healthy())).await.unwrap();
        let status = orch.wait_for(job_id, Duration::from_millis(10)).await.unwrap();
        assert_eq!(status.stage, Stage::Completed);
        assert_eq!(status.progress.current, Stage::TOTAL);

        let result = orch.result(job_id).await.unwrap();
        assert_eq!(result.validation.recommendation, Recommendation::Buy);
        assert!(std::path::Path::new(&result.report_path).exists());
        assert!(std::path::Path::new(&result.profile_path).exists());

        let record = registry.get(job_id).await.unwrap();
        let stages: Vec<Stage> = record.transitions.iter().map(|t| t.stage).collect();
        assert_eq!(
            stages,
            vec![
                Stage::Created,
                Stage::CompanySelected,
                Stage::Researching,
                Stage::Preprocessing,
                Stage::ReportGeneration,
                Stage::Validating,
                Stage::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_metrics_block_buy() {
        let dir = TempDir::new().unwrap();
        let (orch, _) = orchestrator(&dir, StaticSearch::new(2), ScriptedSummarizer::new());

        let job_id = orch.submit("Acme Industries", None).await.unwrap();
        orch.wait_for(job_id, Duration::from_millis(10)).await.unwrap();

        let result = orch.result(job_id).await.unwrap();
        assert_eq!(result.validation.recommendation, Recommendation::Avoid);
    }

    #[tokio::test]
    async fn test_search_failure_moves_job_to_error() {
        let dir = TempDir::new().unwrap();
        let search = StaticSearch::new(3).failing_on("cash flow");
        let summarizer = Arc::new(ScriptedSummarizer::new());
        let registry = Arc::new(InMemoryJobRegistry::new());
        let orch = Orchestrator::new(
            config(),
            registry.clone(),
            Arc::new(InMemoryCatalog::open()),
            Arc::new(search),
            summarizer.clone(),
            Arc::new(ArtifactStore::new(dir.path().join("r"), dir.path().join("p"))),
        );

        let job_id = orch.submit("Acme", Some(healthy())).await.unwrap();
        let status = orch.wait_for(job_id, Duration::from_millis(10)).await.unwrap();

        assert_eq!(status.stage, Stage::Error);
        assert!(status.error.unwrap().contains("cash flow"));
        assert_eq!(status.progress.current, 2);
        assert!(summarizer.requests().is_empty());
        assert!(matches!(
            orch.result(job_id).await,
            Err(PipelineError::JobNotReady {
                stage: Stage::Error,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_report_failure_stops_before_validation() {
        let dir = TempDir::new().unwrap();
        let summarizer = Arc::new(ScriptedSummarizer::new().with_report("Error: quota exceeded"));
        let orch = Orchestrator::new(
            config(),
            Arc::new(InMemoryJobRegistry::new()),
            Arc::new(InMemoryCatalog::open()),
            Arc::new(StaticSearch::new(2)),
            summarizer.clone(),
            Arc::new(ArtifactStore::new(dir.path().join("r"), dir.path().join("p"))),
        );

        let job_id = orch.submit("Acme", Some(healthy())).await.unwrap();
        let status = orch.wait_for(job_id, Duration::from_millis(10)).await.unwrap();

        assert_eq!(status.stage, Stage::Error);
        assert_eq!(status.progress.current, 4);
        assert!(status.progress.message.starts_with("Error: "));
        assert!(summarizer
            .requests()
            .iter()
            .all(|r| r.task != crate::capability::Task::Validation));
        assert!(!dir.path().join("p").exists());
    }

    #[tokio::test]
    async fn test_submit_rejects_bad_requests() {
        let dir = TempDir::new().unwrap();
        let (orch, registry) = orchestrator(&dir, StaticSearch::new(1), ScriptedSummarizer::new());

        assert!(matches!(
            orch.submit("   ", None).await,
            Err(PipelineError::UnknownSubject(_))
        ));

        let bad = FinancialInputs {
            promoter_holding_pct: Some(140.0),
            ..Default::default()
        };
        assert!(matches!(
            orch.submit("Acme", Some(bad)).await,
            Err(PipelineError::InvalidInput(_))
        ));
        assert!(registry.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let dir = TempDir::new().unwrap();
        let (orch, _) = orchestrator(&dir, StaticSearch::new(1), ScriptedSummarizer::new());
        let missing = Uuid::new_v4();

        assert!(matches!(
            orch.status(missing).await,
            Err(PipelineError::JobNotFound(id)) if id == missing
        ));
        assert!(matches!(
            orch.result(missing).await,
            Err(PipelineError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_catalog_inputs_used_when_none_submitted() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(InMemoryJobRegistry::new());
        let catalog = InMemoryCatalog::new(vec![Subject {
            name: "Acme Industries".into(),
            rank: Some(1),
            financial_inputs: Some(healthy()),
        }]);
        let orch = Orchestrator::new(
            config(),
            registry.clone(),
            Arc::new(catalog),
            Arc::new(StaticSearch::new(2)),
            Arc::new(ScriptedSummarizer::new()),
            Arc::new(ArtifactStore::new(dir.path().join("r"), dir.path().join("p"))),
        );

        let job_id = orch.submit("#1", None).await.unwrap();
        let record = registry.get(job_id).await.unwrap();
        assert_eq!(record.subject, "Acme Industries");
        assert_eq!(record.financial_inputs, healthy());

        assert!(matches!(
            orch.submit("Globex", None).await,
            Err(PipelineError::UnknownSubject(_))
        ));
        orch.wait_for(job_id, Duration::from_millis(10)).await.unwrap();
    }
}
