//! Outbound HTTP for self-requests.
//!
//! The pipeline reaches its own server twice per miss: a HEAD probe of the
//! master and a GET of the stored derivative. Both go through [`Upstream`],
//! which only accepts [`SignedUrl`]s so every outbound request carries the
//! loop-prevention marker. Redirects are never followed.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderValue, StatusCode};
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use reqwest::Client;

use crate::error::UpstreamError;
use crate::request::SignedUrl;

/// Default connect timeout for self-issued requests.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default overall timeout for self-issued requests (includes the body).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Response of a completed upstream GET.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    /// Status code as returned by the upstream
    pub status: StatusCode,

    /// `Content-Type` header, if the upstream sent one
    pub content_type: Option<HeaderValue>,

    /// The complete body
    pub body: Bytes,
}

/// Trait for the HTTP calls the pipeline makes on its own behalf.
///
/// Both calls only accept [`SignedUrl`], so every outbound request carries
/// the loop-prevention marker.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Issue a HEAD request and return the status code.
    async fn head(&self, url: &SignedUrl) -> Result<StatusCode, UpstreamError>;

    /// Issue a GET request and read the body to completion.
    async fn get(&self, url: &SignedUrl) -> Result<UpstreamResponse, UpstreamError>;
}

/// reqwest-backed implementation of [`Upstream`].
///
/// Redirects are not followed: a master that only exists behind a redirect
/// is not considered reachable.
#[derive(Clone)]
pub struct HttpUpstream {
    client: Client,
}

impl HttpUpstream {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn head(&self, url: &SignedUrl) -> Result<StatusCode, UpstreamError> {
        let resp = self
            .client
            .head(url.as_str())
            .send()
            .await
            .map_err(|e| UpstreamError::Connection(e.to_string()))?;

        Ok(resp.status())
    }

    async fn get(&self, url: &SignedUrl) -> Result<UpstreamResponse, UpstreamError> {
        let resp = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| UpstreamError::Connection(e.to_string()))?;

        let status = resp.status();
        let content_type = resp.headers().get(CONTENT_TYPE).cloned();
        let body = resp
            .bytes()
            .await
            .map_err(|e| UpstreamError::Body(e.to_string()))?;

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Create the HTTP client used for self-issued requests.
///
/// ```ignore
/// let client = create_http_client(DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)?;
/// let upstream = HttpUpstream::new(client);
/// ```
pub fn create_http_client(
    connect_timeout: Duration,
    request_timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .redirect(Policy::none())
        .user_agent(concat!("thumb-streamer/", env!("CARGO_PKG_VERSION")))
        .build()
}
