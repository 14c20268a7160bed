//! Sub-step progress reporting used by long-running stages.

use crate::models::ProgressDetail;
use async_trait::async_trait;
use std::sync::Mutex;

#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Replace the current sub-step detail. Reporting is best effort:
    /// a sink that cannot record progress must not fail the stage.
    async fn report(&self, detail: ProgressDetail);
}

/// Discards every update.
pub struct NoopProgress;

#[async_trait]
impl ProgressSink for NoopProgress {
    async fn report(&self, _detail: ProgressDetail) {}
}

/// Keeps every update in order; handy for asserting on sub-step reporting.
#[derive(Default)]
pub struct RecordingProgress {
    updates: Mutex<Vec<ProgressDetail>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<ProgressDetail> {
        self.updates
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProgressSink for RecordingProgress {
    async fn report(&self, detail: ProgressDetail) {
        if let Ok(mut guard) = self.updates.lock() {
            guard.push(detail);
        }
    }
}
