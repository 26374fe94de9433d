mod check;
mod metrics;
mod operation;
mod report;
mod threshold;

pub use check::{Checker, CHECKS_METRIC};
pub use metrics::{Distribution, DistributionSummary, Metrics, MetricsSnapshot, Rate, RateSummary};
pub use operation::{report_operation, OperationRecord};
pub use report::{
    NoopReportCollector, ReportCollector, ReportConfig, Reporter, SummaryReportCollector,
};
pub use threshold::{
    Aggregation, Comparator, Threshold, ThresholdParseError, ThresholdReport, ThresholdResult,
    ThresholdSet, ThresholdStatus, Verdict,
};
