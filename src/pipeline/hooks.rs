//! Extension points of the miss pipeline.
//!
//! A [`PipelineHook`] overrides only the stages it cares about. Hooks run in
//! registration order, each receiving the value produced by the previous one.

use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use url::Url;

use crate::request::ImageRequest;

use super::MissOutcome;

/// Strategy object observing or rewriting individual pipeline stages.
///
/// Every method defaults to the identity, so an implementation only
/// overrides what it needs.
pub trait PipelineHook: Send + Sync {
    /// Rewrite an outbound self-request URL before it is sent.
    ///
    /// Runs for the master probe and for the derivative fetch, the latter
    /// after [`PipelineHook::image_url`].
    fn prepare_request_url(&self, url: Url, _request: &ImageRequest) -> Url {
        url
    }

    /// Override the result of the master existence probe.
    ///
    /// `status` is `None` when the probe failed at the transport layer.
    fn master_exists(
        &self,
        exists: bool,
        _status: Option<StatusCode>,
        _request: &ImageRequest,
    ) -> bool {
        exists
    }

    /// Rewrite the upload-relative path used for the metadata lookup.
    fn image_path(&self, path: String, _request: &ImageRequest) -> String {
        path
    }

    /// Rewrite the URL the generated derivative is fetched from.
    fn image_url(&self, url: Url, _request: &ImageRequest) -> Url {
        url
    }

    /// Observe the final outcome of a miss.
    fn on_outcome(&self, _request: &ImageRequest, _outcome: &MissOutcome) {}
}

/// Ordered list of hooks applied by the pipeline.
#[derive(Clone, Default)]
pub struct Hooks {
    hooks: Vec<Arc<dyn PipelineHook>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook; it runs after the ones already registered.
    pub fn push(&mut self, hook: Arc<dyn PipelineHook>) {
        self.hooks.push(hook);
    }

    pub fn with_hook(mut self, hook: Arc<dyn PipelineHook>) -> Self {
        self.push(hook);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn prepare_request_url(&self, url: Url, request: &ImageRequest) -> Url {
        self.hooks
            .iter()
            .fold(url, |url, hook| hook.prepare_request_url(url, request))
    }

    pub fn master_exists(
        &self,
        exists: bool,
        status: Option<StatusCode>,
        request: &ImageRequest,
    ) -> bool {
        self.hooks
            .iter()
            .fold(exists, |exists, hook| hook.master_exists(exists, status, request))
    }

    pub fn image_path(&self, path: String, request: &ImageRequest) -> String {
        self.hooks
            .iter()
            .fold(path, |path, hook| hook.image_path(path, request))
    }

    pub fn image_url(&self, url: Url, request: &ImageRequest) -> Url {
        self.hooks
            .iter()
            .fold(url, |url, hook| hook.image_url(url, request))
    }

    pub fn on_outcome(&self, request: &ImageRequest, outcome: &MissOutcome) {
        for hook in &self.hooks {
            hook.on_outcome(request, outcome);
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("count", &self.hooks.len())
            .finish()
    }
}
