//! Company Research Pipeline
//!
//! Runs long-lived research jobs for a single company:
//! - Gathers evidence across a fixed catalogue of research categories
//! - Condenses the evidence into a bounded per-category profile
//! - Drafts an analyst report from the condensed profile only
//! - Validates a BUY/AVOID recommendation with deterministic red-flag rules
//!   that the semantic assessment can never override
//! - Persists every intermediate document, and the final report
//!
//! JOB LIFECYCLE:
//! Created → CompanySelected → Researching → Preprocessing → ReportGeneration
//! → Validating → Completed, with Error reachable from any active stage.

pub mod api;
pub mod artifacts;
pub mod capability;
pub mod catalog;
pub mod condenser;
pub mod config;
pub mod decision;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod report;
pub mod research;
pub mod stage;
pub mod state;

pub use error::{PipelineError, Result};

// Re-export common types
pub use models::*;
pub use orchestrator::{Orchestrator, PipelineConfig};
pub use stage::Stage;
