//! Per-request facts and the request-level parsing layers.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 ImageRequest                 │
//! │  host + path + query + scheme + upload path  │
//! └──────────────┬───────────────────┬───────────┘
//!                │                   │
//!                ▼                   ▼
//!      ┌──────────────────┐  ┌────────────────┐
//!      │ parse_size_spec  │  │   LoopGuard    │
//!      │ (-e2-150x150)    │  │ (self marker)  │
//!      └──────────────────┘  └────────────────┘
//! ```

mod guard;
mod size;

pub use guard::{LoopGuard, SignedUrl, DEFAULT_LOOP_TOKEN};
pub use size::{parse_size_spec, SizeSpec};

use http::header::HOST;
use http::request::Parts;
use http::HeaderName;
use url::Url;

const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Facts derived once from an inbound request.
///
/// Built at the start of the miss handler and passed by reference through
/// every pipeline stage. Paths are kept in their raw (percent-encoded) form.
///
/// The inbound `Host` only names locations for matching against the upload
/// path. Self-requests always go to the configured `origin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    origin: Url,
    scheme: String,
    host: String,
    path: String,
    query: Option<String>,
    relative_upload_path: String,
}

impl ImageRequest {
    /// Create a request from its parts.
    ///
    /// `origin` is where this server answers its own requests (e.g.
    /// `http://127.0.0.1:3000`). `upload_prefix` is the URL path under which
    /// uploads are served (e.g. `/uploads`). The scheme starts as the
    /// origin's scheme.
    pub fn new(
        origin: Url,
        host: impl Into<String>,
        path: impl Into<String>,
        query: Option<String>,
        upload_prefix: &str,
    ) -> Self {
        let host = host.into();
        let prefix = upload_prefix.trim_end_matches('/');
        let relative_upload_path = if prefix.starts_with('/') || prefix.is_empty() {
            format!("{}{}", host, prefix)
        } else {
            format!("{}/{}", host, prefix)
        };

        Self {
            scheme: origin.scheme().to_string(),
            origin,
            host,
            path: path.into(),
            query,
            relative_upload_path,
        }
    }

    /// Override the scheme the client used.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Build from HTTP request parts.
    ///
    /// The scheme comes from the URI, then `origin`. `X-Forwarded-Proto` is
    /// read first only when `trust_forwarded_proto` is set. Returns `None`
    /// when no host can be determined.
    pub fn from_parts(
        parts: &Parts,
        uri: &http::Uri,
        upload_prefix: &str,
        origin: &Url,
        trust_forwarded_proto: bool,
    ) -> Option<Self> {
        let host = parts
            .headers
            .get(HOST)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string)
            .or_else(|| uri.authority().map(|a| a.to_string()))?;

        let forwarded = parts
            .headers
            .get(X_FORWARDED_PROTO)
            .filter(|_| trust_forwarded_proto)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.split(',').next().unwrap_or(s).trim().to_ascii_lowercase())
            .filter(|s| s == "http" || s == "https");

        let request = Self::new(
            origin.clone(),
            host,
            uri.path(),
            uri.query().map(str::to_string),
            upload_prefix,
        );

        Some(match forwarded.or_else(|| uri.scheme_str().map(str::to_string)) {
            Some(scheme) => request.with_scheme(scheme),
            None => request,
        })
    }

    /// Where self-requests are sent.
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Scheme the client used, as far as it can be trusted.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Raw request path, e.g. `/uploads/photos/a-10x10.jpg`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Scheme-less location of uploads, e.g. `example.com/uploads`.
    pub fn relative_upload_path(&self) -> &str {
        &self.relative_upload_path
    }

    /// Scheme-less location of the requested image, e.g.
    /// `example.com/uploads/photos/a-10x10.jpg`.
    pub fn image(&self) -> String {
        format!("{}{}", self.host, self.path)
    }

    /// `true` if the requested image lives under the upload path.
    pub fn is_upload(&self) -> bool {
        self.image()
            .strip_prefix(&self.relative_upload_path)
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Absolute URL for a self-request to `location`.
    ///
    /// A scheme-less location keeps only its path, which is joined onto the
    /// origin. Absolute URLs are kept as given; only hooks produce them.
    pub fn absolute(&self, location: &str) -> String {
        if location.starts_with("http://") || location.starts_with("https://") {
            return location.to_string();
        }

        let path = location.find('/').map_or("/", |i| &location[i..]);
        format!("{}{}", self.origin.as_str().trim_end_matches('/'), path)
    }

    /// Path of `location` relative to the upload root, without a leading `/`.
    pub fn relative_to_uploads(&self, location: &str) -> String {
        let location = location
            .strip_prefix("https://")
            .or_else(|| location.strip_prefix("http://"))
            .unwrap_or(location);
        let relative = location
            .strip_prefix(&self.relative_upload_path)
            .unwrap_or(location);
        relative.strip_prefix('/').unwrap_or(relative).to_string()
    }
}
