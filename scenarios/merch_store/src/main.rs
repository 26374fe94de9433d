mod workflow;

use anyhow::Context;
use http_stampede_runner::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use workflow::{Iteration, IterationOutcome, MerchStoreConfig};

#[derive(Debug, Default)]
struct MerchStoreValues {
    config: MerchStoreConfig,
}

impl UserValuesConstraint for MerchStoreValues {}

type ScenarioRunnerContext = HttpRunnerContext<MerchStoreValues>;

fn setup(ctx: &mut RunnerContext<ScenarioRunnerContext>) -> HookResult {
    configure_transport(ctx)?;

    let config: MerchStoreConfig = ctx.scenario_config()?;
    config.validate()?;
    log::debug!("Scenario configuration: {config:?}");
    ctx.get_mut().scenario_values.config = config;

    Ok(())
}

fn agent_setup(ctx: &mut AgentContext<ScenarioRunnerContext, HttpAgentContext>) -> HookResult {
    configure_client(ctx)?;
    Ok(())
}

fn agent_behaviour(ctx: &mut AgentContext<ScenarioRunnerContext, HttpAgentContext>) -> HookResult {
    let runner_context = ctx.runner_context().clone();
    let username = format!(
        "user_{}_{}_{}",
        runner_context.get_run_id(),
        ctx.vu(),
        ctx.iteration()
    );
    let checker = runner_context.checker();
    let metrics = runner_context.metrics();
    let config = &runner_context.get().scenario_values.config;

    let (values, rng, shutdown_listener) = ctx.split_mut();
    let client = values
        .client
        .clone()
        .context("No client configured for this VU")?;

    let result = runner_context.executor().execute_in_place(
        Iteration::new(
            &client,
            &checker,
            &metrics,
            config,
            rng,
            shutdown_listener,
            &mut values.session_token,
            username,
        )
        .run(),
    );
    values.session_token = None;

    match result {
        Ok(IterationOutcome::Completed { failed_checks }) if failed_checks > 0 => {
            log::debug!("Iteration completed with {failed_checks} failed checks");
        }
        Ok(IterationOutcome::Interrupted { after_step }) => {
            log::debug!("Iteration interrupted after step [{after_step}]");
            // Not a complete iteration, so the runner must not count it.
            return Err(ShutdownSignalError::default().into());
        }
        Ok(_) => {}
        Err(e) => match e.downcast_ref::<IterationAbortError>() {
            Some(abort) => {
                log::debug!(
                    "Skipped the rest of the iteration after [{}]: {}",
                    abort.step(),
                    abort.reason()
                );
            }
            None => return Err(e),
        },
    }

    Ok(())
}

fn teardown(ctx: Arc<RunnerContext<ScenarioRunnerContext>>) -> HookResult {
    let state = ctx.concurrency();
    log::info!(
        "Started {} VUs over the run, at most {} at once",
        state.started_total,
        state.peak
    );

    Ok(())
}

fn main() -> StampedeResult<()> {
    let builder =
        ScenarioDefinitionBuilder::<ScenarioRunnerContext, HttpAgentContext>::new_with_init(
            env!("CARGO_PKG_NAME"),
        )
        .with_default_stages(
            0,
            vec![
                Stage::new(Duration::from_secs(60), 1000),
                Stage::new(Duration::from_secs(180), 1000),
                Stage::new(Duration::from_secs(60), 0),
            ],
        )
        .with_default_iteration_pause(Duration::from_secs(3))
        .with_default_threshold("http_req_duration", "p(95)<50")
        .with_default_threshold("http_req_failed", "rate<0.0001")
        .use_setup(setup)
        .use_agent_setup(agent_setup)
        .use_agent_behaviour(agent_behaviour)
        .use_teardown(teardown);

    let outcome = run(builder)?;
    if !outcome.passed() {
        std::process::exit(outcome.exit_code());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    #[test]
    fn shipped_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("merch_store.toml");
        let config = RunConfig::load(&path).unwrap();

        assert_eq!(3, config.stages.len());
        assert_eq!(2, config.thresholds.len());
        // Request failures must not cut the run short.
        let aborting = config
            .thresholds
            .values()
            .flatten()
            .filter(|entry| matches!(entry, ThresholdEntry::Detailed { abort_on_fail: true, .. }))
            .count();
        assert_eq!(0, aborting);

        let scenario: MerchStoreConfig = toml::Value::Table(config.scenario.unwrap())
            .try_into()
            .unwrap();
        scenario.validate().unwrap();
        assert_eq!(MerchStoreConfig::default(), scenario);
    }
}
