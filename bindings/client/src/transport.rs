use std::fmt::{Debug, Display, Formatter};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

/// A request to the service under test. The path is resolved against the transport's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    /// Sent as `Authorization: Bearer <token>`.
    pub bearer: Option<String>,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
            bearer: None,
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: None,
            bearer: None,
        }
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    /// Time from sending the request until the whole body was received.
    pub latency: Duration,
}

impl HttpResponse {
    pub fn json(&self) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Read a top level string field from a JSON body, such as `token` from `{"token": "..."}`.
    pub fn json_field(&self, name: &str) -> Option<String> {
        self.json()
            .ok()?
            .get(name)?
            .as_str()
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid request path [{path}]: {source}")]
    InvalidPath {
        path: String,
        source: url::ParseError,
    },
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Failed to read response body: {0}")]
    Body(String),
}

/// Sends requests to the service under test. No retries are made, every call is exactly one request.
#[async_trait::async_trait]
pub trait Transport: Debug + Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}
