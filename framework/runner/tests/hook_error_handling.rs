use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use stampede_runner::prelude::{
    run, AgentBailError, AgentContext, HookResult, ReporterOpt, RunnerContext,
    ScenarioDefinitionBuilder, ShutdownSignalError, StampedeScenarioCli, ThresholdStatus,
    UserValuesConstraint, ITERATION_DURATION_METRIC,
};

#[derive(Default, Debug)]
struct RunnerContextValue {}

impl UserValuesConstraint for RunnerContextValue {}

#[derive(Default, Debug)]
struct AgentContextValue {
    value: i32,
}

impl UserValuesConstraint for AgentContextValue {}

fn sample_cli_cfg() -> StampedeScenarioCli {
    StampedeScenarioCli {
        base_url: Some("http://localhost:8080".to_string()),
        config: None,
        vus: None,
        duration: None,
        stages: vec![],
        thresholds: vec![],
        max_duration: None,
        seed: Some(7),
        run_id: None,
        no_progress: true,
        reporter: ReporterOpt::Noop,
        summary_file: None,
    }
}

#[test]
fn propagate_error_in_setup_hook() {
    fn setup(_tx: &mut RunnerContext<RunnerContextValue>) -> HookResult {
        Err(anyhow::anyhow!("Error in setup hook"))
    }

    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "propagate_error_in_setup_hook",
        sample_cli_cfg(),
    )
    .with_default_duration_s(5)
    .use_setup(setup);

    let result = run(scenario);

    assert!(result.is_err());
    assert_eq!(result.unwrap_err().to_string(), "Error in setup hook");
}

#[test]
fn invalid_load_profile_fails_before_running() {
    fn setup(_tx: &mut RunnerContext<RunnerContextValue>) -> HookResult {
        panic!("Setup must not run without a load profile");
    }

    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "invalid_load_profile_fails_before_running",
        sample_cli_cfg(),
    )
    .use_setup(setup);

    assert!(run(scenario).is_err());
}

#[test]
fn capture_error_in_agent_setup() {
    fn agent_setup(_ctx: &mut AgentContext<RunnerContextValue, AgentContextValue>) -> HookResult {
        Err(anyhow::anyhow!("Error in agent setup hook"))
    }

    fn agent_behaviour(
        _ctx: &mut AgentContext<RunnerContextValue, AgentContextValue>,
    ) -> HookResult {
        panic!("Behaviour must not run after a failed setup");
    }

    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "capture_error_in_agent_setup",
        sample_cli_cfg(),
    )
    .with_default_duration_s(2)
    .use_agent_setup(agent_setup)
    .use_agent_behaviour(agent_behaviour);

    let outcome = run(scenario).unwrap();

    assert_eq!(0, outcome.iterations);
    assert!(!outcome.forced);
}

#[test]
fn capture_error_in_agent_behaviour_and_continue() {
    fn agent_behaviour(
        ctx: &mut AgentContext<RunnerContextValue, AgentContextValue>,
    ) -> HookResult {
        if ctx.get().value < 5 {
            ctx.get_mut().value += 1;
        } else {
            // Save time running this test by shutting down once this has run a few times.
            ctx.runner_context().force_stop_scenario();
        }

        Err(anyhow::anyhow!("Error in agent behaviour hook"))
    }

    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "capture_error_in_agent_behaviour_and_continue",
        sample_cli_cfg(),
    )
    .with_default_duration_s(5)
    .use_agent_behaviour(agent_behaviour);

    let outcome = run(scenario).unwrap();

    assert!(outcome.iterations >= 6);
    // Stopping a run early means it can't be trusted to pass.
    assert!(outcome.forced);
    assert_eq!(ThresholdStatus::Inconclusive, outcome.verdict);
    assert_eq!(97, outcome.exit_code());
}

#[test]
fn bail_error_stops_agent_behaviour() {
    static BEHAVIOUR_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn agent_behaviour(
        _ctx: &mut AgentContext<RunnerContextValue, AgentContextValue>,
    ) -> HookResult {
        BEHAVIOUR_CALLS.fetch_add(1, Ordering::SeqCst);
        Err(AgentBailError::default().into())
    }

    let mut cfg = sample_cli_cfg();
    cfg.vus = Some(2);
    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "bail_error_stops_agent_behaviour",
        cfg,
    )
    .with_default_duration_s(1)
    .use_agent_behaviour(agent_behaviour);

    let outcome = run(scenario).unwrap();

    // A VU that bails is not counted as completing an iteration and doesn't run its behaviour again.
    assert_eq!(0, outcome.iterations);
    assert_eq!(2, BEHAVIOUR_CALLS.load(Ordering::SeqCst));
    assert!(!outcome.forced);
}

#[test]
fn interrupted_iteration_is_not_counted() {
    fn agent_behaviour(
        ctx: &mut AgentContext<RunnerContextValue, AgentContextValue>,
    ) -> HookResult {
        // Part way through the iteration the run is stopped, so the remaining steps are skipped.
        ctx.runner_context().force_stop_scenario();
        if ctx.shutdown_listener().should_shutdown() {
            return Err(ShutdownSignalError::default().into());
        }

        Ok(())
    }

    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "interrupted_iteration_is_not_counted",
        sample_cli_cfg(),
    )
    .with_default_duration_s(5)
    .use_agent_behaviour(agent_behaviour);

    let outcome = run(scenario).unwrap();

    assert_eq!(0, outcome.iterations);
    assert!(outcome.snapshot.distribution(ITERATION_DURATION_METRIC).is_none());
    assert!(outcome.forced);
}

#[test]
fn capture_error_in_agent_teardown() {
    fn agent_teardown(
        _ctx: &mut AgentContext<RunnerContextValue, AgentContextValue>,
    ) -> HookResult {
        Err(anyhow::anyhow!("Error in agent teardown hook"))
    }

    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "capture_error_in_agent_teardown",
        sample_cli_cfg(),
    )
    .with_default_duration_s(1)
    .use_agent_teardown(agent_teardown);

    let outcome = run(scenario).unwrap();

    assert!(outcome.passed());
}

#[test]
fn capture_error_in_teardown() {
    fn teardown(_ctx: Arc<RunnerContext<RunnerContextValue>>) -> HookResult {
        Err(anyhow::anyhow!("Error in teardown hook"))
    }

    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "capture_error_in_teardown",
        sample_cli_cfg(),
    )
    .with_default_duration_s(1)
    .use_teardown(teardown);

    let outcome = run(scenario).unwrap();

    assert!(outcome.passed());
}
