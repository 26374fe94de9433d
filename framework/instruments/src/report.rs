mod noop_reporter;
mod summary_report;

use crate::metrics::MetricsSnapshot;
use crate::threshold::{ThresholdReport, Verdict};

pub use noop_reporter::NoopReportCollector;
pub use summary_report::SummaryReportCollector;

/// Receives the final state of a run once all VUs have stopped.
///
/// The verdict can be worse than [ThresholdReport::verdict] when the run had to be stopped early.
pub trait ReportCollector {
    fn finalize(&self, snapshot: &MetricsSnapshot, thresholds: &ThresholdReport, verdict: Verdict);
}

#[derive(Default)]
pub struct ReportConfig {
    enable_summary: bool,
}

impl ReportConfig {
    pub fn enable_summary(mut self) -> Self {
        self.enable_summary = true;
        self
    }

    pub fn init(self) -> Reporter {
        let mut inner: Vec<Box<dyn ReportCollector + Send + Sync>> = Vec::new();

        if self.enable_summary {
            inner.push(Box::new(SummaryReportCollector::new()));
        } else {
            inner.push(Box::new(NoopReportCollector));
        }

        Reporter { inner }
    }
}

pub struct Reporter {
    inner: Vec<Box<dyn ReportCollector + Send + Sync>>,
}

impl Reporter {
    pub fn finalize(
        &self,
        snapshot: &MetricsSnapshot,
        thresholds: &ThresholdReport,
        verdict: Verdict,
    ) {
        for collector in &self.inner {
            collector.finalize(snapshot, thresholds, verdict);
        }
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("collectors", &self.inner.len())
            .finish()
    }
}
