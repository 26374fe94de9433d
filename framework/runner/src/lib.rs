mod cli;
mod config;
mod context;
mod definition;
mod executor;
mod init;
mod monitor;
mod progress;
mod run;
mod scheduler;
mod shutdown;
mod stages;
mod types;

pub mod prelude {
    pub use crate::cli::{ReporterOpt, StampedeScenarioCli};
    pub use crate::config::{ConfigError, RunConfig, RunPlan, ThresholdEntry};
    pub use crate::context::UserValuesConstraint;
    pub use crate::context::{AgentContext, RunnerContext};
    pub use crate::definition::{HookResult, ScenarioDefinitionBuilder};
    pub use crate::executor::Executor;
    pub use crate::init::init;
    pub use crate::run::{run, RunOutcome, ITERATION_DURATION_METRIC};
    pub use crate::scheduler::{ConcurrencyGauge, SchedulerState, VuState};
    pub use crate::stages::{Stage, StagePlan};
    pub use crate::types::StampedeResult;

    pub use stampede_core::prelude::*;
    pub use stampede_instruments::{
        Checker, Metrics, MetricsSnapshot, ThresholdReport, ThresholdResult, ThresholdStatus,
        Verdict,
    };
}
