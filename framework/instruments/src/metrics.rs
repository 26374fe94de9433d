use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// An append-only collection of real valued samples, such as request latencies in milliseconds.
///
/// Every sample is kept until the end of the run so that percentiles are exact.
#[derive(Debug, Default)]
pub struct Distribution {
    samples: Mutex<Vec<f64>>,
}

impl Distribution {
    pub fn record(&self, value: f64) {
        self.samples.lock().push(value);
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take a point in time copy of the samples.
    pub fn summary(&self) -> DistributionSummary {
        let samples = self.samples.lock().clone();
        DistributionSummary::from_samples(samples)
    }
}

/// An append-only collection of boolean outcomes, such as whether a request failed.
#[derive(Debug, Default)]
pub struct Rate {
    counts: Mutex<RateSummary>,
}

impl Rate {
    pub fn record(&self, outcome: bool) {
        let mut counts = self.counts.lock();
        counts.total += 1;
        if outcome {
            counts.trues += 1;
        }
    }

    pub fn summary(&self) -> RateSummary {
        *self.counts.lock()
    }
}

/// Sorted, immutable view of a [Distribution] at a point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistributionSummary {
    sorted: Vec<f64>,
}

impl DistributionSummary {
    pub fn from_samples(mut samples: Vec<f64>) -> Self {
        samples.retain(|v| !v.is_nan());
        samples.sort_by(|a, b| a.total_cmp(b));
        Self { sorted: samples }
    }

    pub fn count(&self) -> usize {
        self.sorted.len()
    }

    pub fn min(&self) -> Option<f64> {
        self.sorted.first().copied()
    }

    pub fn max(&self) -> Option<f64> {
        self.sorted.last().copied()
    }

    pub fn avg(&self) -> Option<f64> {
        if self.sorted.is_empty() {
            return None;
        }

        Some(self.sorted.iter().sum::<f64>() / self.sorted.len() as f64)
    }

    pub fn med(&self) -> Option<f64> {
        self.percentile(50.0)
    }

    /// Percentile using linear interpolation between the closest ranks.
    ///
    /// For `n` sorted samples the rank is `p / 100 * (n - 1)`, and the value is interpolated between
    /// the samples either side of that rank. `p` is clamped to `[0, 100]`.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        let n = self.sorted.len();
        if n == 0 {
            return None;
        }

        let p = p.clamp(0.0, 100.0);
        let rank = p / 100.0 * (n - 1) as f64;
        let lower = rank.floor() as usize;
        let upper = rank.ceil() as usize;
        let weight = rank - lower as f64;

        Some(self.sorted[lower] + (self.sorted[upper] - self.sorted[lower]) * weight)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateSummary {
    pub trues: u64,
    pub total: u64,
}

impl RateSummary {
    /// The fraction of outcomes that were `true`, or `None` if nothing was recorded.
    pub fn fraction(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.trues as f64 / self.total as f64)
        }
    }

    pub fn falses(&self) -> u64 {
        self.total - self.trues
    }
}

/// The metric sink for a run. Named distributions and rates are created on first use and shared
/// between every VU.
#[derive(Debug, Default)]
pub struct Metrics {
    distributions: RwLock<HashMap<String, Arc<Distribution>>>,
    rates: RwLock<HashMap<String, Arc<Rate>>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn distribution(&self, name: &str) -> Arc<Distribution> {
        if let Some(existing) = self.distributions.read().get(name) {
            return existing.clone();
        }

        self.distributions
            .write()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    pub fn rate(&self, name: &str) -> Arc<Rate> {
        if let Some(existing) = self.rates.read().get(name) {
            return existing.clone();
        }

        self.rates
            .write()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    pub fn record_value(&self, name: &str, value: f64) {
        self.distribution(name).record(value);
    }

    pub fn record_outcome(&self, name: &str, outcome: bool) {
        self.rate(name).record(outcome);
    }

    /// Copy the current state of every sink.
    ///
    /// Each sink is copied under its own lock, so every summary is internally consistent. Samples
    /// recorded while the snapshot is being taken may or may not be included.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.snapshot_where(|_| true)
    }

    /// Like [Metrics::snapshot] but only copies the named sinks. Names that were never recorded to
    /// are left out.
    pub fn snapshot_of(&self, names: &[&str]) -> MetricsSnapshot {
        self.snapshot_where(|name| names.contains(&name))
    }

    fn snapshot_where(&self, keep: impl Fn(&str) -> bool) -> MetricsSnapshot {
        // Clone the handles first so that the registry locks are not held while samples are copied.
        let distributions = self
            .distributions
            .read()
            .iter()
            .filter(|(name, _)| keep(name.as_str()))
            .map(|(name, sink)| (name.clone(), sink.clone()))
            .collect::<Vec<_>>();
        let rates = self
            .rates
            .read()
            .iter()
            .filter(|(name, _)| keep(name.as_str()))
            .map(|(name, sink)| (name.clone(), sink.clone()))
            .collect::<Vec<_>>();

        MetricsSnapshot {
            distributions: distributions
                .into_iter()
                .map(|(name, sink)| (name, sink.summary()))
                .collect(),
            rates: rates
                .into_iter()
                .map(|(name, sink)| (name, sink.summary()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub distributions: BTreeMap<String, DistributionSummary>,
    pub rates: BTreeMap<String, RateSummary>,
}

impl MetricsSnapshot {
    pub fn distribution(&self, name: &str) -> Option<&DistributionSummary> {
        self.distributions.get(name)
    }

    pub fn rate(&self, name: &str) -> Option<&RateSummary> {
        self.rates.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn no_writes_lost_under_concurrent_append() {
        const WRITERS: usize = 16;
        const SAMPLES: usize = 5_000;

        let metrics = Arc::new(Metrics::new());
        let handles = (0..WRITERS)
            .map(|w| {
                let metrics = metrics.clone();
                std::thread::spawn(move || {
                    for i in 0..SAMPLES {
                        metrics.record_value("latency", (w * SAMPLES + i) as f64);
                        metrics.record_outcome("failed", i % 10 == 0);
                    }
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(
            WRITERS * SAMPLES,
            snapshot.distribution("latency").unwrap().count()
        );
        let failed = snapshot.rate("failed").unwrap();
        assert_eq!((WRITERS * SAMPLES) as u64, failed.total);
        assert_eq!((WRITERS * SAMPLES / 10) as u64, failed.trues);
    }

    #[test]
    fn percentiles_are_monotonic() {
        let summary = DistributionSummary::from_samples(
            (0..1000).map(|i| ((i * 7919) % 1000) as f64 * 0.37).collect(),
        );

        let p50 = summary.percentile(50.0).unwrap();
        let p95 = summary.percentile(95.0).unwrap();
        let p99 = summary.percentile(99.0).unwrap();
        assert!(p50 <= p95, "{p50} > {p95}");
        assert!(p95 <= p99, "{p95} > {p99}");
        assert!(summary.min().unwrap() <= p50);
        assert!(p99 <= summary.max().unwrap());
    }

    #[test]
    fn percentile_interpolates_between_ranks() {
        let summary = DistributionSummary::from_samples(vec![40.0, 10.0, 30.0, 20.0]);

        assert_eq!(Some(10.0), summary.percentile(0.0));
        assert_eq!(Some(40.0), summary.percentile(100.0));
        // rank = 0.5 * 3 = 1.5, between 20 and 30
        assert_eq!(Some(25.0), summary.percentile(50.0));
        assert_eq!(Some(25.0), summary.med());
        assert_eq!(Some(25.0), summary.avg());
    }

    #[test]
    fn single_sample_is_every_percentile() {
        let summary = DistributionSummary::from_samples(vec![12.5]);
        assert_eq!(Some(12.5), summary.percentile(1.0));
        assert_eq!(Some(12.5), summary.percentile(99.9));
    }

    #[test]
    fn empty_sinks_have_no_aggregates() {
        let summary = DistributionSummary::default();
        assert_eq!(None, summary.percentile(95.0));
        assert_eq!(None, summary.avg());
        assert_eq!(None, RateSummary::default().fraction());
    }

    #[test]
    fn rate_fraction() {
        let rate = Rate::default();
        for i in 0..1000 {
            rate.record(i < 2);
        }

        let summary = rate.summary();
        assert_eq!(Some(0.002), summary.fraction());
        assert_eq!(998, summary.falses());
    }

    #[test]
    fn snapshot_is_not_affected_by_later_writes() {
        let metrics = Metrics::new();
        metrics.record_value("latency", 1.0);

        let snapshot = metrics.snapshot();
        metrics.record_value("latency", 2.0);

        assert_eq!(1, snapshot.distribution("latency").unwrap().count());
        assert_eq!(2, metrics.snapshot().distribution("latency").unwrap().count());
    }

    #[test]
    fn same_name_returns_same_sink() {
        let metrics = Metrics::new();
        let a = metrics.distribution("latency");
        let b = metrics.distribution("latency");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn snapshot_of_named_sinks() {
        let metrics = Metrics::new();
        metrics.record_value("http_req_duration", 1.0);
        metrics.record_value("iteration_duration", 100.0);
        metrics.record_outcome("http_req_failed", false);

        let snapshot = metrics.snapshot_of(&["http_req_failed", "http_req_duration", "unknown"]);
        assert_eq!(
            vec!["http_req_duration"],
            snapshot.distributions.keys().collect::<Vec<_>>()
        );
        assert_eq!(vec!["http_req_failed"], snapshot.rates.keys().collect::<Vec<_>>());
    }
}
