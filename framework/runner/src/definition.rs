use std::sync::Arc;
use std::time::Duration;

use crate::cli::StampedeScenarioCli;
use crate::config::{RunPlan, ScenarioDefaults};
use crate::context::{AgentContext, RunnerContext, UserValuesConstraint};
use crate::stages::Stage;

pub type HookResult = anyhow::Result<()>;

pub type GlobalHookMut<RV> = fn(&mut RunnerContext<RV>) -> HookResult;
pub type GlobalHook<RV> = fn(Arc<RunnerContext<RV>>) -> HookResult;
pub type AgentHookMut<RV, V> = fn(&mut AgentContext<RV, V>) -> HookResult;

/// The builder for a scenario definition.
///
/// This must be used at the start of a test to define the scenario that you want to run.
pub struct ScenarioDefinitionBuilder<RV: UserValuesConstraint, V: UserValuesConstraint> {
    /// The name of the scenario, which should be unique within the test suite.
    ///
    /// Recommended value is `env!("CARGO_PKG_NAME")`.
    name: String,
    /// This value is initialised for you and you cannot change it.
    #[doc(hidden)]
    cli: StampedeScenarioCli,
    /// Defaults for the load profile and thresholds, used when the command line and the config file
    /// don't provide them.
    defaults: ScenarioDefaults,
    /// Global setup hook for this scenario. It will be run once, before any VUs are started.
    setup_fn: Option<GlobalHookMut<RV>>,
    /// Setup hook for a VU, which will be run once for each VU as it starts.
    ///
    /// A VU whose setup fails is stopped without running its behaviour. The scheduler will start a
    /// new VU in its place on the next tick if the stage plan still calls for one.
    setup_agent_fn: Option<AgentHookMut<RV, V>>,
    /// The behaviour for this scenario. Each call is one iteration, repeated until the VU is drained
    /// or the run shuts down.
    agent_behaviour: Option<AgentHookMut<RV, V>>,
    /// Teardown hook for a VU, run once as the VU stops.
    teardown_agent_fn: Option<AgentHookMut<RV, V>>,
    /// Global teardown hook for this scenario. It will be run once, after all VUs have stopped.
    ///
    /// This hook is best effort. Errors are logged and do not change the outcome of the run.
    teardown_fn: Option<GlobalHook<RV>>,
}

pub(crate) struct ScenarioDefinition<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub(crate) name: String,
    pub(crate) cli: StampedeScenarioCli,
    pub(crate) plan: RunPlan,
    pub(crate) setup_fn: Option<GlobalHookMut<RV>>,
    pub(crate) setup_agent_fn: Option<AgentHookMut<RV, V>>,
    pub(crate) agent_behaviour: Option<AgentHookMut<RV, V>>,
    pub(crate) teardown_agent_fn: Option<AgentHookMut<RV, V>>,
    pub(crate) teardown_fn: Option<GlobalHook<RV>>,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> ScenarioDefinitionBuilder<RV, V> {
    /// Initialise a new scenario definition from the scenario name and the given command line
    /// arguments. See the [ScenarioDefinitionBuilder::name] for more information about the name.
    pub fn new(name: &str, cli: StampedeScenarioCli) -> Self {
        Self {
            name: name.to_string(),
            cli,
            defaults: ScenarioDefaults::default(),
            setup_fn: None,
            setup_agent_fn: None,
            agent_behaviour: None,
            teardown_agent_fn: None,
            teardown_fn: None,
        }
    }

    /// Initialise logging, parse the command line and create a new scenario definition.
    pub fn new_with_init(name: &str) -> Self {
        Self::new(name, crate::init::init())
    }

    /// Run a constant number of VUs for this many seconds, unless a load profile is configured.
    pub fn with_default_duration_s(mut self, duration: u64) -> Self {
        self.defaults.duration = Some(Duration::from_secs(duration));
        self
    }

    /// The number of VUs to run with [ScenarioDefinitionBuilder::with_default_duration_s] or `--duration`.
    pub fn with_default_vus(mut self, vus: usize) -> Self {
        self.defaults.vus = Some(vus);
        self
    }

    /// The default load profile for this scenario.
    pub fn with_default_stages(mut self, start_vus: usize, stages: Vec<Stage>) -> Self {
        self.defaults.start_vus = start_vus;
        self.defaults.stages = stages;
        self
    }

    /// The default pause between two iterations of a VU.
    pub fn with_default_iteration_pause(mut self, pause: Duration) -> Self {
        self.defaults.iteration_pause = Some(pause);
        self
    }

    /// Add a default threshold, such as `("http_req_duration", "p(95)<50")`. Thresholds in the config
    /// file replace the defaults.
    pub fn with_default_threshold(mut self, metric: &str, expression: &str) -> Self {
        self.defaults
            .thresholds
            .push((metric.to_string(), expression.to_string()));
        self
    }

    /// Set the global setup hook [ScenarioDefinitionBuilder::setup_fn] for this scenario.
    pub fn use_setup(mut self, setup_fn: GlobalHookMut<RV>) -> Self {
        self.setup_fn = Some(setup_fn);
        self
    }

    /// Set the VU setup hook [ScenarioDefinitionBuilder::setup_agent_fn] for this scenario.
    pub fn use_agent_setup(mut self, setup_agent_fn: AgentHookMut<RV, V>) -> Self {
        self.setup_agent_fn = Some(setup_agent_fn);
        self
    }

    /// Set the behaviour hook [ScenarioDefinitionBuilder::agent_behaviour] for this scenario.
    pub fn use_agent_behaviour(mut self, behaviour: AgentHookMut<RV, V>) -> Self {
        self.agent_behaviour = Some(behaviour);
        self
    }

    /// Set the VU teardown hook [ScenarioDefinitionBuilder::teardown_agent_fn] for this scenario.
    pub fn use_agent_teardown(mut self, teardown_agent_fn: AgentHookMut<RV, V>) -> Self {
        self.teardown_agent_fn = Some(teardown_agent_fn);
        self
    }

    /// Set the global teardown hook [ScenarioDefinitionBuilder::teardown_fn] for this scenario.
    pub fn use_teardown(mut self, teardown_fn: GlobalHook<RV>) -> Self {
        self.teardown_fn = Some(teardown_fn);
        self
    }

    pub(crate) fn build(self) -> anyhow::Result<ScenarioDefinition<RV, V>> {
        let plan = RunPlan::resolve(&self.cli, &self.defaults)?;

        Ok(ScenarioDefinition {
            name: self.name,
            cli: self.cli,
            plan,
            setup_fn: self.setup_fn,
            setup_agent_fn: self.setup_agent_fn,
            agent_behaviour: self.agent_behaviour,
            teardown_agent_fn: self.teardown_agent_fn,
            teardown_fn: self.teardown_fn,
        })
    }
}
