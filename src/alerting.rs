//! Run announcements and failure alerts

use crate::error::FxError;
use crate::types::SourceSelection;

/// What a pipeline run was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub date_from: String,
    pub date_to: String,
    pub sources: SourceSelection,
}

impl RunSummary {
    /// One-line description used in logs and alerts
    pub fn describe(&self) -> String {
        format!(
            "{}..{} ecb={} apilayer={} investing={}",
            self.date_from,
            self.date_to,
            self.sources.ecb,
            self.sources.commercial,
            self.sources.quote_history
        )
    }
}

/// Receiver of run notifications and unexpected failures
///
/// Implementations are best-effort and must never fail the pipeline.
pub trait Alerter: Send + Sync {
    fn notify_run(&self, run: &RunSummary);

    fn alert(&self, run: &RunSummary, error: &FxError);
}

/// Writes everything through the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlerter;

impl Alerter for LogAlerter {
    fn notify_run(&self, run: &RunSummary) {
        log::info!("report run: {}", run.describe());
    }

    fn alert(&self, run: &RunSummary, error: &FxError) {
        log::error!("report run failed: {} ({:?}) [{}]", error, error, run.describe());
    }
}
