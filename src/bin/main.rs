use company_research_pipeline::{
    artifacts::ArtifactStore,
    capability, catalog,
    config::Settings,
    orchestrator::{Orchestrator, PipelineConfig},
    state::InMemoryJobRegistry,
    Stage,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let subject = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if subject.trim().is_empty() {
        eprintln!("usage: research <company name | #rank>");
        std::process::exit(2);
    }

    let settings = Settings::from_env()?;
    let (search, summarizer) = capability::from_settings(&settings)?;
    let catalog = catalog::from_settings(&settings).await?;

    let orchestrator = Orchestrator::new(
        PipelineConfig::from_settings(&settings),
        Arc::new(InMemoryJobRegistry::new()),
        catalog,
        search,
        summarizer,
        Arc::new(ArtifactStore::new(
            settings.research_output_dir.clone(),
            settings.reports_dir.clone(),
        )),
    );

    let job_id = orchestrator.submit(&subject, None).await?;
    info!(job_id = %job_id, subject = %subject, "Running research job");

    let status = orchestrator.wait_for(job_id, Duration::from_millis(500)).await?;

    if status.stage != Stage::Completed {
        eprintln!(
            "Research failed at {}/{}: {}",
            status.progress.current,
            status.progress.total,
            status.error.unwrap_or_else(|| status.progress.message.clone())
        );
        std::process::exit(1);
    }

    let result = orchestrator.result(job_id).await?;
    let validation = &result.validation;

    println!("\n=== RESEARCH RESULT ===");
    println!("Subject: {}", status.subject);
    println!("Recommendation: {}", validation.recommendation);
    println!("Confidence: {}", validation.confidence);
    println!("Expected 3-Year Return: {}", validation.expected_return);
    println!("\nRed Flags:");
    for (i, flag) in validation.red_flags_found.iter().enumerate() {
        println!("  {}: {}", i + 1, flag);
    }
    println!("\n{}", result.executive_summary);
    println!("\nReport: {} (sha256 {})", result.report_path, result.report_sha256);

    Ok(())
}
