use company_research_pipeline::{
    api::start_server,
    artifacts::ArtifactStore,
    capability, catalog,
    config::Settings,
    orchestrator::{Orchestrator, PipelineConfig},
    state::InMemoryJobRegistry,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env()?;

    info!("Company Research Pipeline - API Server");
    info!("Port: {}", settings.port);

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

    info!("Orchestrator initialized");

    start_server(orchestrator, settings.port).await?;

    Ok(())
}
