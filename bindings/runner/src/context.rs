use http_client_instrumented::prelude::HttpClientInstrumented;
use stampede_runner::prelude::UserValuesConstraint;

use crate::runner_context::DefaultScenarioValues;

#[derive(Default, Debug)]
pub struct HttpAgentContext<SV: UserValuesConstraint = DefaultScenarioValues> {
    pub client: Option<HttpClientInstrumented>,
    /// Token for the logged in user. Only valid for the iteration that logged in.
    pub session_token: Option<String>,
    pub scenario_values: SV,
}

impl<SV: UserValuesConstraint> UserValuesConstraint for HttpAgentContext<SV> {}
