use crate::metrics::Metrics;
use std::sync::Arc;

/// Name of the rate that every check outcome is also recorded into.
pub const CHECKS_METRIC: &str = "checks";

/// Records named boolean assertions about responses into rate metrics.
///
/// A check never fails the caller. The outcome is recorded into the rate named after the check and
/// into the aggregate [CHECKS_METRIC] rate, and returned so that the caller can branch on it.
#[derive(Debug, Clone)]
pub struct Checker {
    metrics: Arc<Metrics>,
}

impl Checker {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }

    pub fn check(&self, name: &str, passed: bool) -> bool {
        self.metrics.record_outcome(name, passed);
        self.metrics.record_outcome(CHECKS_METRIC, passed);

        if !passed {
            log::trace!("Check failed: {name}");
        }

        passed
    }

    /// Evaluate a predicate that may itself fail, for example because a response body could not be
    /// parsed. A predicate error counts as a failed check.
    pub fn check_with<F>(&self, name: &str, predicate: F) -> bool
    where
        F: FnOnce() -> anyhow::Result<bool>,
    {
        let passed = match predicate() {
            Ok(passed) => passed,
            Err(e) => {
                log::debug!("Check [{name}] could not be evaluated: {e:?}");
                false
            }
        };

        self.check(name, passed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_into_named_and_aggregate_rates() {
        let metrics = Arc::new(Metrics::new());
        let checker = Checker::new(metrics.clone());

        assert!(checker.check("status is 200", true));
        assert!(!checker.check("status is 200", false));
        assert!(checker.check("other", true));

        let snapshot = metrics.snapshot();
        let named = snapshot.rate("status is 200").unwrap();
        assert_eq!(2, named.total);
        assert_eq!(1, named.trues);

        let all = snapshot.rate(CHECKS_METRIC).unwrap();
        assert_eq!(3, all.total);
        assert_eq!(2, all.trues);
    }

    #[test]
    fn predicate_error_is_a_failed_check() {
        let metrics = Arc::new(Metrics::new());
        let checker = Checker::new(metrics.clone());

        let passed = checker.check_with("has token", || {
            anyhow::bail!("response body is not JSON");
        });

        assert!(!passed);
        let named = metrics.snapshot().rate("has token").copied().unwrap();
        assert_eq!(1, named.total);
        assert_eq!(0, named.trues);
    }
}
