//! Router configuration.
//!
//! # Route Structure
//!
//! ```text
//! /health                       - Health check
//! /sizes                        - Named sizes and size policy
//! {upload_prefix}/{*path}       - Static uploads, misses run the pipeline
//! ```
//!
//! # Example
//!
//! ```ignore
//! use thumb_streamer::server::{create_router, RouterConfig};
//!
//! let origin = Url::parse("http://127.0.0.1:3000")?;
//! let config = RouterConfig::new("/uploads", "/srv/uploads", origin)
//!     .with_cors_origins(vec!["https://example.com".to_string()]);
//!
//! let router = create_router(pipeline, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::path::PathBuf;
use std::time::Duration;

use axum::response::{IntoResponse, Response};
use axum::{handler::Handler, routing::get, Json, Router};
use http::header::CONTENT_TYPE;
use http::{Method, StatusCode, Uri};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use url::Url;

use super::handlers::{health_handler, miss_handler, sizes_handler, AppState, ErrorResponse};
use crate::pipeline::Pipeline;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// URL path under which uploads are served (e.g. `/uploads`)
    pub upload_prefix: String,

    /// Directory backing the upload prefix
    pub upload_dir: PathBuf,

    /// Origin this server reaches itself at; all self-requests go here
    pub self_origin: Url,

    /// Whether `X-Forwarded-Proto` may set the request scheme
    pub trust_forwarded_proto: bool,

    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl RouterConfig {
    /// Serve `upload_dir` under `upload_prefix`, reaching this server at
    /// `self_origin` for its own requests.
    ///
    /// By default CORS allows any origin, tracing is enabled and forwarded
    /// headers are not trusted.
    pub fn new(
        upload_prefix: impl Into<String>,
        upload_dir: impl Into<PathBuf>,
        self_origin: Url,
    ) -> Self {
        Self {
            upload_prefix: normalize_prefix(&upload_prefix.into()),
            upload_dir: upload_dir.into(),
            self_origin,
            trust_forwarded_proto: false,
            cors_origins: None,
            enable_tracing: true,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    /// Take the request scheme from `X-Forwarded-Proto`. Only enable behind
    /// a proxy that sets the header itself.
    pub fn with_trust_forwarded_proto(mut self, trust: bool) -> Self {
        self.trust_forwarded_proto = trust;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

/// `uploads/` and `/uploads/` both become `/uploads`.
fn normalize_prefix(prefix: &str) -> String {
    format!("/{}", prefix.trim_matches('/'))
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the application router.
///
/// Existing files under the upload prefix are answered by `ServeDir`
/// directly. Anything it cannot find goes to the miss handler, which either
/// streams a freshly generated derivative or answers 404.
pub fn create_router(pipeline: Pipeline, config: RouterConfig) -> Router {
    let app_state = AppState::new(
        pipeline,
        config.upload_prefix.clone(),
        config.self_origin.clone(),
    )
    .with_trust_forwarded_proto(config.trust_forwarded_proto);

    let miss = miss_handler.with_state(app_state.clone());
    let uploads = ServeDir::new(&config.upload_dir).fallback(miss);

    let cors = build_cors_layer(&config);

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/sizes", get(sizes_handler))
        .with_state(app_state)
        .nest_service(&config.upload_prefix, uploads)
        .fallback(not_found)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// 404 for everything outside the known routes.
async fn not_found(uri: Uri) -> Response {
    let status = StatusCode::NOT_FOUND;
    let body = ErrorResponse::with_status(
        "not_found",
        format!("Resource not found: {}", uri.path()),
        status,
    );
    (status, Json(body)).into_response()
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}
