use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};
use stampede_instruments::{report_operation, Metrics, OperationRecord};
use std::sync::Arc;

/// Prefix for the request metrics, giving `http_req_duration`, `http_req_duration.<step>` and
/// `http_req_failed`.
pub const REQUEST_METRIC_PREFIX: &str = "http_req";

/// Wraps a [Transport] and records the latency and outcome of every request.
///
/// A request has failed if the transport returned an error or the response status is 400 or above.
/// Failed requests are returned to the caller like any other so that checks can be recorded.
#[derive(Debug, Clone)]
pub struct HttpClientInstrumented {
    transport: Arc<dyn Transport>,
    metrics: Arc<Metrics>,
}

impl HttpClientInstrumented {
    pub fn new(transport: Arc<dyn Transport>, metrics: Arc<Metrics>) -> Self {
        Self { transport, metrics }
    }

    /// Send a request, recording it under the name of the workflow step that made it.
    pub async fn send(
        &self,
        step: &str,
        request: HttpRequest,
    ) -> Result<HttpResponse, TransportError> {
        let mut record = OperationRecord::new(step);
        let result = self.transport.send(request).await;

        match &result {
            Ok(response) => record.finish_with(response.latency, response.status >= 400),
            Err(e) => {
                log::debug!("Request for step [{step}] failed: {e}");
                record.abandon();
            }
        }
        report_operation(&self.metrics, REQUEST_METRIC_PREFIX, &record);

        result
    }
}
