mod client;
mod reqwest_transport;
mod transport;

pub mod prelude {
    pub use crate::client::{HttpClientInstrumented, REQUEST_METRIC_PREFIX};
    pub use crate::reqwest_transport::ReqwestTransport;
    pub use crate::transport::{HttpRequest, HttpResponse, Method, Transport, TransportError};

    // Re-exported so that custom transports can be written without a direct dependency.
    pub use async_trait::async_trait;
}
