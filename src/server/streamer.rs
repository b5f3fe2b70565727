//! Turns a freshly generated derivative into the client response.
//!
//! The derivative is fetched back through the normal serving path, so the
//! client sees exactly what later cache hits will see (same status, same
//! `Content-Type`, same bytes).

use std::sync::Arc;

use axum::body::Body;
use axum::response::Response;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tracing::debug;

use crate::error::StreamError;
use crate::io::Upstream;
use crate::request::SignedUrl;

/// Fetches a derivative and relays it.
#[derive(Clone)]
pub struct ResponseStreamer {
    upstream: Arc<dyn Upstream>,
}

impl ResponseStreamer {
    pub fn new(upstream: Arc<dyn Upstream>) -> Self {
        Self { upstream }
    }

    /// GET `url` and build a response from it.
    ///
    /// The body is read to completion before anything is returned, so a
    /// transport failure yields an error instead of a truncated response.
    /// A successful fetch with an empty body is also an error.
    pub async fn stream(&self, url: &SignedUrl) -> Result<Response, StreamError> {
        let fetched = self.upstream.get(url).await?;

        if fetched.body.is_empty() {
            return Err(StreamError::EmptyBody {
                status: fetched.status.as_u16(),
            });
        }

        debug!(
            url = %url,
            status = fetched.status.as_u16(),
            bytes = fetched.body.len(),
            "Relaying derivative"
        );

        let mut builder = Response::builder()
            .status(fetched.status)
            .header(CONTENT_LENGTH, fetched.body.len());
        if let Some(content_type) = fetched.content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }

        builder
            .body(Body::from(fetched.body))
            .map_err(|e| StreamError::Response(e.to_string()))
    }
}
