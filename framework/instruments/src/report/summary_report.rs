mod metrics_table;

use crate::metrics::MetricsSnapshot;
use crate::report::summary_report::metrics_table::{DistributionRow, RateRow, ThresholdRow};
use crate::report::ReportCollector;
use crate::threshold::{ThresholdReport, Verdict};
use tabled::settings::Style;
use tabled::Table;

/// Prints tables of every metric and threshold at the end of the run.
pub struct SummaryReportCollector;

impl SummaryReportCollector {
    pub fn new() -> Self {
        Self
    }

    fn print_summary(
        &self,
        snapshot: &MetricsSnapshot,
        thresholds: &ThresholdReport,
        verdict: Verdict,
    ) {
        let distributions = distribution_rows(snapshot);
        if !distributions.is_empty() {
            println!("\nSummary of distributions");
            print_table(distributions);
        }

        let rates = rate_rows(snapshot);
        if !rates.is_empty() {
            println!("\nSummary of rates");
            print_table(rates);
        }

        let threshold_rows = threshold_rows(thresholds);
        if !threshold_rows.is_empty() {
            println!("\nThresholds");
            print_table(threshold_rows);
        }

        println!("\nVerdict: {verdict}");
    }
}

impl Default for SummaryReportCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportCollector for SummaryReportCollector {
    fn finalize(&self, snapshot: &MetricsSnapshot, thresholds: &ThresholdReport, verdict: Verdict) {
        self.print_summary(snapshot, thresholds, verdict);
    }
}

fn print_table<T: tabled::Tabled>(rows: Vec<T>) {
    let mut table = Table::new(rows);
    table.with(Style::modern());
    println!("{table}");
}

fn distribution_rows(snapshot: &MetricsSnapshot) -> Vec<DistributionRow> {
    snapshot
        .distributions
        .iter()
        .map(|(metric, summary)| DistributionRow {
            metric: metric.clone(),
            count: summary.count(),
            avg: summary.avg(),
            min: summary.min(),
            med: summary.med(),
            max: summary.max(),
            p90: summary.percentile(90.0),
            p95: summary.percentile(95.0),
            p99: summary.percentile(99.0),
        })
        .collect()
}

fn rate_rows(snapshot: &MetricsSnapshot) -> Vec<RateRow> {
    snapshot
        .rates
        .iter()
        .map(|(metric, summary)| RateRow {
            metric: metric.clone(),
            rate: summary.fraction(),
            trues: summary.trues,
            falses: summary.falses(),
        })
        .collect()
}

fn threshold_rows(report: &ThresholdReport) -> Vec<ThresholdRow> {
    report
        .results
        .iter()
        .map(|result| ThresholdRow {
            metric: result.metric.clone(),
            threshold: result.expression.clone(),
            observed: result.observed,
            status: result.status.to_string(),
        })
        .collect()
}
