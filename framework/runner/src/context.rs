use std::{fmt::Debug, sync::Arc};

use anyhow::Context as _;
use serde::de::DeserializeOwned;
use stampede_core::prelude::{DelegatedShutdownListener, RandomSource, ShutdownHandle};
use stampede_instruments::{Checker, Metrics, Reporter};

use crate::executor::Executor;
use crate::scheduler::{ConcurrencyGauge, SchedulerState, VuLifecycle};

pub trait UserValuesConstraint: Default + Debug + Send + Sync + 'static {}

/// The context shared by every VU in a run. Created by the runner and passed to the global hooks.
#[derive(Debug)]
pub struct RunnerContext<RV: UserValuesConstraint> {
    executor: Arc<Executor>,
    reporter: Arc<Reporter>,
    metrics: Arc<Metrics>,
    shutdown_handle: ShutdownHandle,
    gauge: ConcurrencyGauge,
    run_id: String,
    base_url: Option<String>,
    scenario_config: toml::Table,
    value: RV,
}

impl<RV: UserValuesConstraint> RunnerContext<RV> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        executor: Arc<Executor>,
        reporter: Arc<Reporter>,
        metrics: Arc<Metrics>,
        shutdown_handle: ShutdownHandle,
        gauge: ConcurrencyGauge,
        run_id: String,
        base_url: Option<String>,
        scenario_config: toml::Table,
    ) -> Self {
        Self {
            executor,
            reporter,
            metrics,
            shutdown_handle,
            gauge,
            run_id,
            base_url,
            scenario_config,
            value: Default::default(),
        }
    }

    /// A handle to the executor for running async code.
    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn reporter(&self) -> Arc<Reporter> {
        self.reporter.clone()
    }

    /// The metric sink for this run.
    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// A [Checker] that records into this run's metrics.
    pub fn checker(&self) -> Checker {
        Checker::new(self.metrics.clone())
    }

    /// Stop the run. Every VU finishes its current request and no further iterations are started.
    ///
    /// The run is treated as forcibly terminated so its verdict is at best inconclusive.
    pub fn force_stop_scenario(&self) {
        self.shutdown_handle.shutdown();
    }

    /// The unique run id for this run.
    pub fn get_run_id(&self) -> &str {
        &self.run_id
    }

    /// The base URL of the service under test, if one was provided.
    pub fn get_base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Deserialize the `[scenario]` table of the run configuration. Missing keys take their values
    /// from `T::default()` when `T` is annotated with `#[serde(default)]`.
    pub fn scenario_config<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        toml::Value::Table(self.scenario_config.clone())
            .try_into()
            .context("Invalid [scenario] configuration")
    }

    /// Concurrency as of the most recent scheduler tick.
    pub fn concurrency(&self) -> SchedulerState {
        self.gauge.snapshot()
    }

    pub fn get_mut(&mut self) -> &mut RV {
        &mut self.value
    }

    pub fn get(&self) -> &RV {
        &self.value
    }
}

/// The context of a single VU, passed to the agent hooks.
pub struct AgentContext<RV: UserValuesConstraint, V: UserValuesConstraint> {
    agent_id: String,
    vu: usize,
    iteration: u64,
    runner_context: Arc<RunnerContext<RV>>,
    shutdown_listener: DelegatedShutdownListener,
    lifecycle: VuLifecycle,
    rng: RandomSource,
    value: V,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> AgentContext<RV, V> {
    pub(crate) fn new(
        vu: usize,
        runner_context: Arc<RunnerContext<RV>>,
        shutdown_listener: DelegatedShutdownListener,
        lifecycle: VuLifecycle,
        rng: RandomSource,
    ) -> Self {
        Self {
            agent_id: format!("vu-{vu}"),
            vu,
            iteration: 0,
            runner_context,
            shutdown_listener,
            lifecycle,
            rng,
            value: Default::default(),
        }
    }

    /// A string identifier for the VU, unique within the run.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// The VU number. Starts at 1 and is never reused within a run.
    pub fn vu(&self) -> usize {
        self.vu
    }

    /// The iteration currently running, starting at 0. Together with [AgentContext::vu] this is unique
    /// within the run.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn runner_context(&self) -> &Arc<RunnerContext<RV>> {
        &self.runner_context
    }

    /// A listener for the shutdown signal. Long running behaviours should check it between steps.
    pub fn shutdown_listener(&mut self) -> &mut DelegatedShutdownListener {
        &mut self.shutdown_listener
    }

    /// The random source for this VU, derived from the run seed and the VU number.
    pub fn rng(&mut self) -> &mut RandomSource {
        &mut self.rng
    }

    /// Borrow the VU's values, random source and shutdown listener at the same time, for workflows
    /// that need all three while an iteration runs.
    pub fn split_mut(&mut self) -> (&mut V, &mut RandomSource, &mut DelegatedShutdownListener) {
        (&mut self.value, &mut self.rng, &mut self.shutdown_listener)
    }

    pub(crate) fn lifecycle(&self) -> &VuLifecycle {
        &self.lifecycle
    }

    pub(crate) fn next_iteration(&mut self) {
        self.iteration += 1;
    }

    pub fn get_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub fn get(&self) -> &V {
        &self.value
    }
}
