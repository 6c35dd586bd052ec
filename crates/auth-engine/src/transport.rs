//! HTTP transport seam.
//!
//! The pipeline builds fully decorated [`OutboundRequest`]s and hands them
//! to an [`HttpTransport`]. Status codes are not interpreted here; only
//! failures to obtain a response become errors.

use crate::{ApiError, ApiResult};
use async_trait::async_trait;
use reqwest::{Client, Method};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// A request ready to go on the wire.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    /// Path relative to the API base URL, e.g. `/auth/me`.
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<serde_json::Value>,
}

impl OutboundRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Token from the `Authorization: Bearer` header, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        self.header("Authorization")
            .and_then(|value| value.strip_prefix("Bearer "))
    }
}

/// Status and body of a received response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self::new(status, body.to_string())
    }
}

/// Sends requests to the backend.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send one request. Returns `Network` or `Timeout` when no response arrives.
    async fn send(&self, request: OutboundRequest) -> ApiResult<RawResponse>;
}

/// reqwest-backed transport rooted at the API base URL.
pub struct ReqwestTransport {
    client: Client,
    base_url: Url,
}

impl ReqwestTransport {
    /// Create a transport for `base_url` with the given request timeout.
    pub fn new(base_url: Url, timeout: Duration) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> ApiResult<RawResponse> {
        let url = self.url_for(&request.path);
        debug!(method = %request.method, url = %url, "Sending request");

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .header("Content-Type", "application/json");
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;

        debug!(status, url = %url, "Received response");
        Ok(RawResponse { status, body })
    }
}

fn map_reqwest_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Network(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_joins_paths() {
        let transport = ReqwestTransport::new(
            Url::parse("http://localhost:8080/api/v1").unwrap(),
            Duration::from_secs(10),
        )
        .unwrap();
        assert_eq!(
            transport.url_for("/auth/me"),
            "http://localhost:8080/api/v1/auth/me"
        );

        let transport = ReqwestTransport::new(
            Url::parse("http://localhost:8080/api/v1/").unwrap(),
            Duration::from_secs(10),
        )
        .unwrap();
        assert_eq!(
            transport.url_for("auth/me"),
            "http://localhost:8080/api/v1/auth/me"
        );
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_string(), "Bearer abc".to_string());
        let request = OutboundRequest {
            method: Method::GET,
            path: "/auth/me".to_string(),
            headers,
            body: None,
        };

        assert_eq!(request.bearer_token(), Some("abc"));
        assert_eq!(request.header("authorization"), Some("Bearer abc"));
        assert_eq!(request.header("X-Trade-ID"), None);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let transport = ReqwestTransport::new(
            Url::parse("http://127.0.0.1:9").unwrap(),
            Duration::from_secs(2),
        )
        .unwrap();

        let result = transport
            .send(OutboundRequest {
                method: Method::GET,
                path: "/auth/me".to_string(),
                headers: BTreeMap::new(),
                body: None,
            })
            .await;

        assert!(matches!(
            result,
            Err(ApiError::Network(_)) | Err(ApiError::Timeout)
        ));
    }
}
