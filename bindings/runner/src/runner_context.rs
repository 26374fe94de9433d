use http_client_instrumented::prelude::Transport;
use stampede_runner::prelude::UserValuesConstraint;
use std::sync::Arc;

#[derive(Default, Debug)]
pub struct DefaultScenarioValues {}

impl UserValuesConstraint for DefaultScenarioValues {}

#[derive(Default, Debug)]
pub struct HttpRunnerContext<SV: UserValuesConstraint = DefaultScenarioValues> {
    /// Shared by every VU, set by [crate::common::configure_transport].
    pub transport: Option<Arc<dyn Transport>>,
    /// Values for the scenario to share between its VUs, usually read from its configuration.
    pub scenario_values: SV,
}

impl<SV: UserValuesConstraint> UserValuesConstraint for HttpRunnerContext<SV> {}
