use crate::transport::{HttpRequest, HttpResponse, Method, Transport, TransportError};
use std::time::{Duration, Instant};
use url::Url;

/// [Transport] backed by a shared [reqwest::Client], so that connections are pooled across VUs.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    base_url: Url,
    timeout: Duration,
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(base_url: Url, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url,
            timeout,
            client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn map_err(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = self
            .base_url
            .join(&request.path)
            .map_err(|source| TransportError::InvalidPath {
                path: request.path.clone(),
                source,
            })?;

        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }

        let start = Instant::now();
        let response = builder.send().await.map_err(|e| self.map_err(e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(self.timeout)
            } else {
                TransportError::Body(e.to_string())
            }
        })?;
        let latency = start.elapsed();

        log::trace!("{} {} -> {status} in {latency:?}", request.method, request.path);

        Ok(HttpResponse {
            status,
            body,
            latency,
        })
    }
}
