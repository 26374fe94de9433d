/// Return this error from a VU's behaviour function to indicate that the VU is bailing.
///
/// This should be used when a VU encounters an error that is fatal to that VU but not to the run.
/// The VU stops and the scheduler will start a fresh one if the current stage still needs it.
#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct AgentBailError {
    msg: String,
}

impl AgentBailError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

impl Default for AgentBailError {
    fn default() -> Self {
        Self {
            msg: "Agent is bailing".to_string(),
        }
    }
}

/// A step could not run because a value it depends on was not produced by an earlier step.
///
/// The remaining steps of the iteration are skipped. Metrics already recorded for the iteration
/// are kept.
#[derive(derive_more::Error, derive_more::Display, Debug)]
#[display("Iteration aborted at step [{step}]: {reason}")]
pub struct IterationAbortError {
    step: String,
    reason: String,
}

impl IterationAbortError {
    pub fn new(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            reason: reason.into(),
        }
    }

    pub fn step(&self) -> &str {
        &self.step
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}
