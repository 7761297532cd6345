//! reqwest-backed `Transport`.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{ApiRequest, ApiResponse, Transport, TransportError};

pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("rym/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        debug!("{} {}", request.method, request.url);

        let mut builder = self.http.request(request.method, &request.url);
        if let Some(token) = request.bearer.as_deref() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body.as_ref() {
            builder = builder.json(body);
        }

        let resp = builder.send().await.map_err(map_reqwest_error)?;
        let status = resp.status();
        let body = resp.text().await.map_err(map_reqwest_error)?;

        Ok(ApiResponse { status, body })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Request(e.to_string())
    }
}
