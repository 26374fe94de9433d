use crate::metrics::MetricsSnapshot;
use crate::report::ReportCollector;
use crate::threshold::{ThresholdReport, Verdict};

/// Reports nothing. Useful for tests and when the run output is consumed from the run summary.
pub struct NoopReportCollector;

impl ReportCollector for NoopReportCollector {
    fn finalize(
        &self,
        _snapshot: &MetricsSnapshot,
        _thresholds: &ThresholdReport,
        _verdict: Verdict,
    ) {
    }
}
