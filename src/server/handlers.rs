//! HTTP request handlers.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /sizes` - Registered named sizes and the active size policy
//! - `GET {upload_prefix}/{*path}` - Static uploads; misses run the pipeline

use std::sync::Arc;

use axum::{
    extract::{OriginalUri, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::pipeline::{MissOutcome, PassReason, Pipeline};
use crate::request::ImageRequest;
use crate::thumbnail::NamedSize;

// =============================================================================
// Application State
// =============================================================================

/// Shared state of the miss handler and the informational endpoints.
#[derive(Clone)]
pub struct AppState {
    /// The miss pipeline
    pub pipeline: Arc<Pipeline>,

    /// URL path under which uploads are served (e.g. `/uploads`)
    pub upload_prefix: String,

    /// Where self-requests are sent, whatever `Host` the client sent
    pub self_origin: Url,

    /// Whether `X-Forwarded-Proto` may set the request scheme
    pub trust_forwarded_proto: bool,
}

impl AppState {
    pub fn new(pipeline: Pipeline, upload_prefix: impl Into<String>, self_origin: Url) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            upload_prefix: upload_prefix.into(),
            self_origin,
            trust_forwarded_proto: false,
        }
    }

    pub fn with_trust_forwarded_proto(mut self, trust: bool) -> Self {
        self.trust_forwarded_proto = trust;
        self
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

/// Response from the sizes endpoint.
#[derive(Debug, Serialize)]
pub struct SizesResponse {
    /// Active size policy (`any` or `registered`)
    pub policy: String,

    /// Named sizes ordered by name
    pub sizes: Vec<NamedSize>,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// A miss the pipeline left to the host.
///
/// Always a 404; the reason is logged but never exposed beyond the error
/// message.
#[derive(Debug)]
pub struct PassThrough {
    pub path: String,
    pub reason: PassReason,
}

impl IntoResponse for PassThrough {
    fn into_response(self) -> Response {
        let status = StatusCode::NOT_FOUND;

        debug!(
            path = %self.path,
            reason = %self.reason,
            status = status.as_u16(),
            "Resource not found"
        );

        let error_response = ErrorResponse::with_status(
            "not_found",
            format!("Resource not found: {}", self.path),
            status,
        );

        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle requests the static file server could not satisfy.
///
/// Installed as the `ServeDir` fallback, so the request URI it receives has
/// the upload prefix stripped; the full path comes from [`OriginalUri`].
///
/// # Response
///
/// - `200 OK` (or whatever the derivative fetch returned): the generated image
/// - `404 Not Found`: JSON [`ErrorResponse`] for every pass-through
pub async fn miss_handler(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    request: Request,
) -> Response {
    let (parts, _body) = request.into_parts();

    let Some(image_request) = ImageRequest::from_parts(
        &parts,
        &uri,
        &state.upload_prefix,
        &state.self_origin,
        state.trust_forwarded_proto,
    ) else {
        return PassThrough {
            path: uri.path().to_string(),
            reason: PassReason::OutsideUploads,
        }
        .into_response();
    };

    match state.pipeline.handle_miss(&image_request).await {
        MissOutcome::Streamed(response) => response,
        MissOutcome::PassThrough(reason) => PassThrough {
            path: uri.path().to_string(),
            reason,
        }
        .into_response(),
    }
}

/// Handle health check requests.
///
/// `200 OK` with `{"status": "healthy", "version": "0.1.0"}`.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// List the registered named sizes.
///
/// # Response
///
/// ```json
/// {
///   "policy": "any",
///   "sizes": [{"name": "thumbnail", "width": 150, "height": 150}]
/// }
/// ```
pub async fn sizes_handler(State(state): State<AppState>) -> Json<SizesResponse> {
    let generator = state.pipeline.generator();

    Json(SizesResponse {
        policy: generator.policy().as_str().to_string(),
        sizes: generator.sizes().iter().cloned().collect(),
    })
}
