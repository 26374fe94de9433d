mod parse;

use crate::metrics::MetricsSnapshot;
use std::fmt::{Display, Formatter};

pub use parse::ThresholdParseError;

/// How a metric is reduced to a single number before it is compared with a limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    /// Percentile of a distribution, `p(95)`.
    Percentile(f64),
    Avg,
    Min,
    Max,
    Med,
    Count,
    /// Fraction of `true` outcomes of a rate.
    Rate,
}

impl Aggregation {
    fn applies_to_rate(&self) -> bool {
        matches!(self, Aggregation::Rate)
    }
}

impl Display for Aggregation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Aggregation::Percentile(p) => write!(f, "p({p})"),
            Aggregation::Avg => write!(f, "avg"),
            Aggregation::Min => write!(f, "min"),
            Aggregation::Max => write!(f, "max"),
            Aggregation::Med => write!(f, "med"),
            Aggregation::Count => write!(f, "count"),
            Aggregation::Rate => write!(f, "rate"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparator {
    pub fn holds(&self, observed: f64, limit: f64) -> bool {
        match self {
            Comparator::Lt => observed < limit,
            Comparator::Le => observed <= limit,
            Comparator::Gt => observed > limit,
            Comparator::Ge => observed >= limit,
            Comparator::Eq => observed == limit,
            Comparator::Ne => observed != limit,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Eq => "==",
            Comparator::Ne => "!=",
        }
    }
}

/// A pass/fail rule over one aggregated metric, for example `http_req_duration: p(95)<50`.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    metric: String,
    aggregation: Aggregation,
    comparator: Comparator,
    limit: f64,
    allow_empty: bool,
    abort_on_fail: bool,
}

impl Threshold {
    pub fn new(
        metric: impl Into<String>,
        aggregation: Aggregation,
        comparator: Comparator,
        limit: f64,
    ) -> Self {
        Self {
            metric: metric.into(),
            aggregation,
            comparator,
            limit,
            allow_empty: false,
            abort_on_fail: false,
        }
    }

    /// Parse an expression such as `p(95)<50` or `rate<0.0001` for the named metric.
    pub fn parse(metric: impl Into<String>, expression: &str) -> Result<Self, ThresholdParseError> {
        let (aggregation, comparator, limit) = parse::parse_expression(expression)?;
        Ok(Self::new(metric, aggregation, comparator, limit))
    }

    /// Treat a metric with no samples as passing instead of inconclusive.
    pub fn with_allow_empty(mut self, allow_empty: bool) -> Self {
        self.allow_empty = allow_empty;
        self
    }

    /// Stop the run as soon as this threshold is observed to fail.
    pub fn with_abort_on_fail(mut self, abort_on_fail: bool) -> Self {
        self.abort_on_fail = abort_on_fail;
        self
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn abort_on_fail(&self) -> bool {
        self.abort_on_fail
    }

    pub fn expression(&self) -> String {
        format!("{}{}{}", self.aggregation, self.comparator.as_str(), self.limit)
    }

    fn observe(&self, snapshot: &MetricsSnapshot) -> Option<f64> {
        if self.aggregation.applies_to_rate() {
            return snapshot.rate(&self.metric)?.fraction();
        }

        let distribution = snapshot.distribution(&self.metric)?;
        match self.aggregation {
            Aggregation::Percentile(p) => distribution.percentile(p),
            Aggregation::Avg => distribution.avg(),
            Aggregation::Min => distribution.min(),
            Aggregation::Max => distribution.max(),
            Aggregation::Med => distribution.med(),
            // A count of zero is a real observation, but only once the metric exists.
            Aggregation::Count => Some(distribution.count() as f64),
            Aggregation::Rate => None,
        }
    }

    pub fn evaluate(&self, snapshot: &MetricsSnapshot) -> ThresholdResult {
        let observed = self.observe(snapshot);
        let status = match observed {
            Some(value) if self.comparator.holds(value, self.limit) => ThresholdStatus::Passed,
            Some(_) => ThresholdStatus::Failed,
            None if self.allow_empty => ThresholdStatus::Passed,
            None => ThresholdStatus::Inconclusive,
        };

        ThresholdResult {
            metric: self.metric.clone(),
            expression: self.expression(),
            limit: self.limit,
            observed,
            status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ThresholdStatus {
    Passed,
    Inconclusive,
    Failed,
}

impl Display for ThresholdStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ThresholdStatus::Passed => write!(f, "passed"),
            ThresholdStatus::Inconclusive => write!(f, "inconclusive"),
            ThresholdStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Overall verdict of a run. Ordered from best to worst so that verdicts combine with `max`.
pub type Verdict = ThresholdStatus;

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    pub limit: f64,
    /// The aggregated value that was compared, `None` when the metric had no samples.
    pub observed: Option<f64>,
    pub status: ThresholdStatus,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdReport {
    pub results: Vec<ThresholdResult>,
}

impl ThresholdReport {
    /// Logical AND over every threshold. A failure wins over an inconclusive result, and no
    /// thresholds at all is a pass.
    pub fn verdict(&self) -> Verdict {
        self.results
            .iter()
            .map(|r| r.status)
            .max()
            .unwrap_or(ThresholdStatus::Passed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ThresholdResult> {
        self.results
            .iter()
            .filter(|r| r.status == ThresholdStatus::Failed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ThresholdSet {
    thresholds: Vec<Threshold>,
}

impl ThresholdSet {
    pub fn new(thresholds: Vec<Threshold>) -> Self {
        Self { thresholds }
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Threshold> {
        self.thresholds.iter()
    }

    pub fn has_abort_on_fail(&self) -> bool {
        self.thresholds.iter().any(|t| t.abort_on_fail)
    }

    pub fn evaluate(&self, snapshot: &MetricsSnapshot) -> ThresholdReport {
        ThresholdReport {
            results: self.thresholds.iter().map(|t| t.evaluate(snapshot)).collect(),
        }
    }

    /// Find the first `abort_on_fail` threshold that is currently failing.
    pub fn first_abort(&self, snapshot: &MetricsSnapshot) -> Option<ThresholdResult> {
        self.thresholds
            .iter()
            .filter(|t| t.abort_on_fail)
            .map(|t| t.evaluate(snapshot))
            .find(|r| r.status == ThresholdStatus::Failed)
    }
}
