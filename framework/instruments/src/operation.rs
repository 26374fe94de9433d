use crate::metrics::Metrics;
use std::time::{Duration, Instant};

/// Timing record for a single operation, such as one HTTP request.
#[derive(Debug, Clone)]
pub struct OperationRecord {
    operation_id: String,
    started: Instant,
    elapsed: Option<Duration>,
    is_error: bool,
}

impl OperationRecord {
    pub fn new(operation_id: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            started: Instant::now(),
            elapsed: None,
            is_error: false,
        }
    }

    /// The operation completed and produced a measurable response, successful or not.
    pub fn finish(&mut self, is_error: bool) {
        self.elapsed = Some(self.started.elapsed());
        self.is_error = is_error;
    }

    /// The operation completed with a known duration, measured by whoever performed it.
    pub fn finish_with(&mut self, elapsed: Duration, is_error: bool) {
        self.elapsed = Some(elapsed);
        self.is_error = is_error;
    }

    /// The operation failed without producing anything to time, such as a refused connection.
    pub fn abandon(&mut self) {
        self.elapsed = None;
        self.is_error = true;
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }
}

/// Record a finished operation under `prefix`.
///
/// The duration in milliseconds goes to `<prefix>_duration` and `<prefix>_duration.<operation_id>`,
/// the outcome goes to the `<prefix>_failed` rate where `true` means the operation failed.
/// An abandoned operation only contributes to the failure rate.
pub fn report_operation(metrics: &Metrics, prefix: &str, record: &OperationRecord) {
    if let Some(elapsed) = record.elapsed {
        let ms = elapsed.as_micros() as f64 / 1000.0;
        metrics.record_value(&format!("{prefix}_duration"), ms);
        metrics.record_value(&format!("{prefix}_duration.{}", record.operation_id), ms);
    }

    metrics.record_outcome(&format!("{prefix}_failed"), record.is_error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finished_operation_is_timed_and_counted() {
        let metrics = Metrics::new();
        let mut record = OperationRecord::new("login");
        record.finish_with(Duration::from_millis(12), false);

        report_operation(&metrics, "http_req", &record);

        let snapshot = metrics.snapshot();
        assert_eq!(Some(12.0), snapshot.distribution("http_req_duration").unwrap().max());
        assert_eq!(1, snapshot.distribution("http_req_duration.login").unwrap().count());
        let failed = snapshot.rate("http_req_failed").unwrap();
        assert_eq!((0, 1), (failed.trues, failed.total));
    }

    #[test]
    fn abandoned_operation_only_counts_as_failure() {
        let metrics = Metrics::new();
        let mut record = OperationRecord::new("login");
        record.abandon();

        report_operation(&metrics, "http_req", &record);

        let snapshot = metrics.snapshot();
        assert!(snapshot.distribution("http_req_duration").is_none());
        let failed = snapshot.rate("http_req_failed").unwrap();
        assert_eq!((1, 1), (failed.trues, failed.total));
    }
}
