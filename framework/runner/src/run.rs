use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Context;
use stampede_core::prelude::{AgentBailError, RandomSource, ShutdownHandle, ShutdownSignalError};
use stampede_instruments::{
    Metrics, MetricsSnapshot, ReportConfig, ThresholdReport, ThresholdStatus, Verdict,
};
use stampede_summary_model::{append_run_summary, RunSummary, ThresholdSummary};

use crate::cli::ReporterOpt;
use crate::config::RunPlan;
use crate::definition::AgentHookMut;
use crate::monitor::start_monitor;
use crate::progress::start_progress;
use crate::scheduler::{ConcurrencyGauge, StageScheduler, VuLifecycle};
use crate::{
    context::{AgentContext, RunnerContext, UserValuesConstraint},
    definition::ScenarioDefinitionBuilder,
    executor::Executor,
    shutdown::start_shutdown_listener,
};

/// Time taken by one complete iteration of the behaviour, in milliseconds.
pub const ITERATION_DURATION_METRIC: &str = "iteration_duration";

/// The result of a run.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: String,
    pub verdict: Verdict,
    pub thresholds: ThresholdReport,
    /// True if the run did not end by following its stages to completion.
    pub forced: bool,
    pub stop_reason: Option<String>,
    pub peak_vus: usize,
    pub iterations: u64,
    pub snapshot: MetricsSnapshot,
}

impl RunOutcome {
    pub fn passed(&self) -> bool {
        self.verdict == ThresholdStatus::Passed
    }

    /// Process exit code for this outcome. Thresholds failing is distinguished from a run that could
    /// not reach a verdict.
    pub fn exit_code(&self) -> i32 {
        match self.verdict {
            ThresholdStatus::Passed => 0,
            ThresholdStatus::Failed => 99,
            ThresholdStatus::Inconclusive => 97,
        }
    }
}

/// Everything a VU thread needs, copied out of the scenario definition.
struct VuSpec<RV: UserValuesConstraint, V: UserValuesConstraint> {
    runner_context: Arc<RunnerContext<RV>>,
    shutdown_handle: ShutdownHandle,
    setup_agent_fn: Option<AgentHookMut<RV, V>>,
    agent_behaviour_fn: Option<AgentHookMut<RV, V>>,
    teardown_agent_fn: Option<AgentHookMut<RV, V>>,
    iteration_pause: Duration,
    seed: u64,
    iterations: Arc<AtomicU64>,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> Clone for VuSpec<RV, V> {
    fn clone(&self) -> Self {
        Self {
            runner_context: self.runner_context.clone(),
            shutdown_handle: self.shutdown_handle.clone(),
            setup_agent_fn: self.setup_agent_fn,
            agent_behaviour_fn: self.agent_behaviour_fn,
            teardown_agent_fn: self.teardown_agent_fn,
            iteration_pause: self.iteration_pause,
            seed: self.seed,
            iterations: self.iterations.clone(),
        }
    }
}

pub fn run<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: ScenarioDefinitionBuilder<RV, V>,
) -> anyhow::Result<RunOutcome> {
    let definition = definition.build()?;
    let plan = definition.plan;

    log::info!(
        "Running scenario: {} (run id {}, seed {})",
        definition.name,
        plan.run_id,
        plan.seed
    );
    log::info!(
        "Load profile: start at {} VUs, {} stages over {:?}, up to {} VUs",
        plan.stages.start_vus(),
        plan.stages.stages().len(),
        plan.stages.total_duration(),
        plan.stages.max_vus()
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let shutdown_handle = start_shutdown_listener(&runtime)?;
    let executor = Arc::new(Executor::new(
        runtime,
        shutdown_handle.clone(),
        plan.drain_grace,
    ));
    let reporter = Arc::new(match definition.cli.reporter {
        ReporterOpt::Summary => ReportConfig::default().enable_summary().init(),
        ReporterOpt::Noop => ReportConfig::default().init(),
    });
    let metrics = Arc::new(Metrics::new());
    let gauge = ConcurrencyGauge::default();

    let mut runner_context = RunnerContext::new(
        executor.clone(),
        reporter,
        metrics.clone(),
        shutdown_handle.clone(),
        gauge.clone(),
        plan.run_id.clone(),
        plan.base_url.clone(),
        plan.scenario.clone(),
    );

    if let Some(setup_fn) = &definition.setup_fn {
        setup_fn(&mut runner_context)?;
    }

    let runner_context = Arc::new(runner_context);
    let started_at = chrono::Utc::now();

    if !definition.cli.no_progress {
        if let Err(e) = start_progress(
            plan.stages.clone(),
            gauge.clone(),
            shutdown_handle.new_listener(),
        ) {
            log::warn!("Failed to start progress bar: {e:?}");
        }
    }

    // Ready to start spawning VUs so start the resource monitor to report high usage by VUs
    // which might lead to a misleading outcome.
    if let Err(e) = start_monitor(shutdown_handle.new_listener()) {
        log::warn!("Failed to start resource monitor: {e:?}");
    }

    let vu_spec = VuSpec {
        runner_context: runner_context.clone(),
        shutdown_handle: shutdown_handle.clone(),
        setup_agent_fn: definition.setup_agent_fn,
        agent_behaviour_fn: definition.agent_behaviour,
        teardown_agent_fn: definition.teardown_agent_fn,
        iteration_pause: plan.iteration_pause,
        seed: plan.seed,
        iterations: Arc::new(AtomicU64::new(0)),
    };

    let mut spawn = |vu: usize, lifecycle: VuLifecycle| -> anyhow::Result<JoinHandle<()>> {
        let spec = vu_spec.clone();
        std::thread::Builder::new()
            .name(format!("vu-{vu}"))
            .spawn(move || run_vu(spec, vu, lifecycle))
            .context("Failed to spawn thread for VU")
    };

    let abort_metrics = plan
        .thresholds
        .iter()
        .filter(|t| t.abort_on_fail())
        .map(|t| t.metric())
        .collect::<Vec<_>>();

    let mut scheduler = StageScheduler::new(plan.stages.clone(), gauge.clone());
    let mut forced = false;
    let mut stop_reason = None;
    let start = Instant::now();

    loop {
        let elapsed = start.elapsed();

        if shutdown_handle.is_shutdown() {
            log::warn!("Run stopped before its stages completed");
            forced = true;
            stop_reason = Some("Stopped by shutdown signal".to_string());
            break;
        }

        if elapsed >= plan.max_duration {
            log::error!(
                "Run exceeded its maximum duration of {:?}, stopping",
                plan.max_duration
            );
            forced = true;
            stop_reason = Some(format!(
                "Exceeded maximum duration of {}",
                humantime::format_duration(plan.max_duration)
            ));
            shutdown_handle.shutdown();
            break;
        }

        if !abort_metrics.is_empty() {
            if let Some(failed) = plan
                .thresholds
                .first_abort(&metrics.snapshot_of(&abort_metrics))
            {
                log::error!(
                    "Threshold [{}: {}] failed with observed value {:?}, aborting run",
                    failed.metric,
                    failed.expression,
                    failed.observed
                );
                stop_reason = Some(format!(
                    "Threshold [{}: {}] failed",
                    failed.metric, failed.expression
                ));
                shutdown_handle.shutdown();
                break;
            }
        }

        let state = scheduler.tick(elapsed, &mut spawn);
        log::trace!("Scheduler state at {elapsed:?}: {state:?}");

        if elapsed >= plan.stages.total_duration() && scheduler.alive() == 0 {
            log::info!("All stages complete and all VUs stopped");
            break;
        }

        executor.sleep_unless_shutdown(plan.tick);
    }

    scheduler.drain_all();
    let abandoned = scheduler.wait_for_exit(plan.drain_grace);
    if abandoned > 0 {
        log::error!(
            "{abandoned} VUs did not stop within the drain grace of {:?}, abandoning them",
            plan.drain_grace
        );
        forced = true;
        stop_reason.get_or_insert_with(|| format!("{abandoned} VUs did not stop in time"));
        shutdown_handle.shutdown();
    }

    if let Some(teardown_fn) = definition.teardown_fn {
        // Don't crash the runner if the teardown fails. We still want the reporting and runner
        // shutdown to happen cleanly. The hook is documented as 'best effort'
        if let Err(e) = teardown_fn(runner_context.clone()) {
            log::error!("Teardown failed: {:?}", e);
        }
    }

    // Stops the progress bar and the resource monitor.
    shutdown_handle.shutdown();

    let snapshot = metrics.snapshot();
    let thresholds = plan.thresholds.evaluate(&snapshot);
    let mut verdict = thresholds.verdict();
    if forced {
        verdict = verdict.max(ThresholdStatus::Inconclusive);
    }

    runner_context
        .reporter()
        .finalize(&snapshot, &thresholds, verdict);

    let state = gauge.snapshot();
    let iterations = vu_spec.iterations.load(Ordering::Acquire);
    log::info!(
        "Run {} finished with verdict [{verdict}] after {iterations} iterations, peak of {} VUs",
        plan.run_id,
        state.peak
    );

    let outcome = RunOutcome {
        run_id: plan.run_id.clone(),
        verdict,
        thresholds,
        forced,
        stop_reason,
        peak_vus: state.peak,
        iterations,
        snapshot,
    };

    if let Some(path) = &definition.cli.summary_file {
        // The outcome is still returned if the summary can't be written.
        if let Err(e) = write_summary(path, &definition.name, &plan, started_at, &outcome) {
            log::error!("Failed to write run summary to {path:?}: {e:?}");
        }
    }

    Ok(outcome)
}

fn run_vu<RV: UserValuesConstraint, V: UserValuesConstraint>(
    spec: VuSpec<RV, V>,
    vu: usize,
    lifecycle: VuLifecycle,
) {
    let executor = spec.runner_context.executor().clone();
    let metrics = spec.runner_context.metrics();

    // For us to check if the VU should shut down between iterations
    let mut cycle_shutdown_receiver = spec.shutdown_handle.new_listener();
    // For the behaviour implementation to listen for shutdown and respond appropriately
    let delegated_shutdown_listener = spec.shutdown_handle.new_listener();

    let mut context = AgentContext::new(
        vu,
        spec.runner_context,
        delegated_shutdown_listener,
        lifecycle,
        RandomSource::for_vu(spec.seed, vu),
    );
    log::debug!("Starting {}", context.agent_id());

    let setup_ok = match spec.setup_agent_fn {
        Some(setup_agent_fn) => match setup_agent_fn(&mut context) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Agent setup failed for {}: {:?}", context.agent_id(), e);
                false
            }
        },
        None => true,
    };

    if setup_ok {
        match spec.agent_behaviour_fn {
            Some(behaviour) => loop {
                if cycle_shutdown_receiver.should_shutdown() || !context.lifecycle().is_running() {
                    log::debug!("Stopping {}", context.agent_id());
                    break;
                }

                let iteration_start = Instant::now();
                match behaviour(&mut context) {
                    Ok(()) => {}
                    Err(e) if e.is::<ShutdownSignalError>() => {
                        // Expected if the VU is being shutdown. The iteration was interrupted so it
                        // is not counted, and the check at the top of the loop will break out.
                        continue;
                    }
                    Err(e) if e.is::<AgentBailError>() => {
                        log::warn!("{} bailed: {}", context.agent_id(), e);
                        break;
                    }
                    Err(e) => {
                        log::error!("Agent behaviour failed for {}: {:?}", context.agent_id(), e);
                    }
                }

                metrics.record_value(
                    ITERATION_DURATION_METRIC,
                    iteration_start.elapsed().as_micros() as f64 / 1000.0,
                );
                spec.iterations.fetch_add(1, Ordering::AcqRel);
                context.next_iteration();

                executor.pause(spec.iteration_pause, context.lifecycle());
            },
            None => {
                // Nothing to do, hold the slot until the scheduler no longer needs it.
                executor.pause(Duration::MAX, context.lifecycle());
            }
        }
    }

    if let Some(teardown_agent_fn) = spec.teardown_agent_fn {
        if let Err(e) = teardown_agent_fn(&mut context) {
            log::error!("Agent teardown failed for {}: {:?}", context.agent_id(), e);
        }
    }

    context.lifecycle().stop();
}

fn write_summary(
    path: &Path,
    scenario_name: &str,
    plan: &RunPlan,
    started_at: chrono::DateTime<chrono::Utc>,
    outcome: &RunOutcome,
) -> anyhow::Result<()> {
    let mut summary = RunSummary::new(
        outcome.run_id.clone(),
        scenario_name.to_string(),
        started_at.timestamp(),
        plan.stages.total_duration().as_secs(),
        plan.stages
            .stages()
            .iter()
            .map(|s| (s.duration.as_millis() as u64, s.target))
            .collect(),
        plan.stages.start_vus(),
        env!("CARGO_PKG_VERSION").to_string(),
    );
    summary.peak_vus = outcome.peak_vus;
    summary.iterations = outcome.iterations;
    summary.forced = outcome.forced;
    summary.stop_reason = outcome.stop_reason.clone();
    summary.verdict = outcome.verdict.to_string();
    summary.thresholds = outcome
        .thresholds
        .results
        .iter()
        .map(|r| ThresholdSummary {
            metric: r.metric.clone(),
            expression: r.expression.clone(),
            observed: r.observed,
            limit: r.limit,
            status: r.status.to_string(),
        })
        .collect();
    if let Some(base_url) = &plan.base_url {
        summary.add_env("STAMPEDE_BASE_URL".to_string(), base_url.clone());
    }
    if let Ok(log_level) = std::env::var("RUST_LOG") {
        summary.add_env("RUST_LOG".to_string(), log_level);
    }

    append_run_summary(summary, path.to_path_buf())
}
