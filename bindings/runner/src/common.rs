use crate::context::HttpAgentContext;
use crate::runner_context::HttpRunnerContext;
use anyhow::Context;
use http_client_instrumented::prelude::{HttpClientInstrumented, ReqwestTransport};
use stampede_runner::prelude::{AgentContext, RunnerContext, StampedeResult, UserValuesConstraint};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Time allowed for a single request, including reading the response body.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Creates the transport for the service under test from the `--base-url` and stores it in
/// [HttpRunnerContext]. Call this from the scenario `setup` hook.
///
/// One transport is shared by every VU so that connections are pooled. Scenarios that need a
/// different transport can store their own in [HttpRunnerContext::transport] instead.
pub fn configure_transport<SV: UserValuesConstraint>(
    ctx: &mut RunnerContext<HttpRunnerContext<SV>>,
) -> StampedeResult<()> {
    let base_url = ctx
        .get_base_url()
        .context("No base URL for the service under test, set `--base-url`")?;
    let base_url = Url::parse(base_url).with_context(|| format!("Invalid base URL [{base_url}]"))?;

    log::info!("Sending requests to {base_url}");
    let transport = ReqwestTransport::new(base_url, DEFAULT_REQUEST_TIMEOUT)
        .context("Failed to create HTTP client")?;
    ctx.get_mut().transport = Some(Arc::new(transport));

    Ok(())
}

/// Sets the `client` value in [HttpAgentContext] using the shared transport and the run's metrics.
///
/// After calling this function you will be able to use the client in your agent hooks:
/// ```rust
/// use http_stampede_runner::prelude::*;
///
/// fn agent_behaviour(ctx: &mut AgentContext<HttpRunnerContext, HttpAgentContext>) -> HookResult {
///     let client = ctx.get().client.clone().expect("configure_client was called in agent setup");
///     ctx.runner_context().executor().execute_in_place(async move {
///         client.send("info", HttpRequest::get("/api/info")).await?;
///         Ok(())
///     })?;
///     Ok(())
/// }
/// ```
pub fn configure_client<RSV: UserValuesConstraint, SV: UserValuesConstraint>(
    ctx: &mut AgentContext<HttpRunnerContext<RSV>, HttpAgentContext<SV>>,
) -> StampedeResult<()> {
    let transport = ctx
        .runner_context()
        .get()
        .transport
        .clone()
        .context("No transport configured, call `configure_transport` in the scenario setup")?;
    let metrics = ctx.runner_context().metrics();

    ctx.get_mut().client = Some(HttpClientInstrumented::new(transport, metrics));

    Ok(())
}
