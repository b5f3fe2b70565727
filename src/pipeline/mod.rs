//! The miss pipeline.
//!
//! [`Pipeline::handle_miss`] runs once for every request the static file
//! server could not satisfy. It walks a fixed sequence of stages and stops at
//! the first one that does not apply:
//!
//! ```text
//! Idle ──► Parsed ──► MasterValidated ──► Generated ──► Streamed
//!   │         │              │                 │            │
//!   └─────────┴──────────────┴─────────────────┴────────────┴──► PassThrough
//! ```
//!
//! A pass-through is not an error. It means the request is left to the host,
//! which answers with its regular 404. Nothing is retried.

mod hooks;

pub use hooks::{Hooks, PipelineHook};

use std::fmt;

use axum::response::Response;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::{ResolveError, StoreError, StreamError};
use crate::master::MasterResolver;
use crate::request::{parse_size_spec, ImageRequest, LoopGuard};
use crate::server::ResponseStreamer;
use crate::thumbnail::{GeneratedThumbnail, ThumbnailGenerator};

/// Why a miss was left to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassReason {
    /// The request carries the loop-prevention marker
    SelfRequest,

    /// The request is not under the upload path
    OutsideUploads,

    /// The path has no size token
    NotAThumbnail,

    /// The master is unreachable or not a registered asset
    MasterNotFound,

    /// The derivative could not be produced
    GenerationFailed,

    /// The derivative was produced but could not be fetched back
    StreamFailed,
}

impl PassReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassReason::SelfRequest => "self_request",
            PassReason::OutsideUploads => "outside_uploads",
            PassReason::NotAThumbnail => "not_a_thumbnail",
            PassReason::MasterNotFound => "master_not_found",
            PassReason::GenerationFailed => "generation_failed",
            PassReason::StreamFailed => "stream_failed",
        }
    }
}

impl fmt::Display for PassReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of a miss.
#[derive(Debug)]
pub enum MissOutcome {
    /// The derivative was generated and its response is ready
    Streamed(Response),

    /// The request is left to the host
    PassThrough(PassReason),
}

impl MissOutcome {
    pub fn is_streamed(&self) -> bool {
        matches!(self, MissOutcome::Streamed(_))
    }

    /// The pass-through reason, if any.
    pub fn reason(&self) -> Option<PassReason> {
        match self {
            MissOutcome::Streamed(_) => None,
            MissOutcome::PassThrough(reason) => Some(*reason),
        }
    }
}

/// Composes master resolution, generation and streaming.
#[derive(Clone)]
pub struct Pipeline {
    resolver: MasterResolver,
    generator: ThumbnailGenerator,
    streamer: ResponseStreamer,
    guard: LoopGuard,
    hooks: Hooks,
}

impl Pipeline {
    pub fn new(
        resolver: MasterResolver,
        generator: ThumbnailGenerator,
        streamer: ResponseStreamer,
        guard: LoopGuard,
    ) -> Self {
        Self {
            resolver,
            generator,
            streamer,
            guard,
            hooks: Hooks::default(),
        }
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn generator(&self) -> &ThumbnailGenerator {
        &self.generator
    }

    pub fn guard(&self) -> &LoopGuard {
        &self.guard
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Handle a request the static server could not satisfy.
    pub async fn handle_miss(&self, request: &ImageRequest) -> MissOutcome {
        let outcome = self.run(request).await;
        self.hooks.on_outcome(request, &outcome);
        outcome
    }

    async fn run(&self, request: &ImageRequest) -> MissOutcome {
        if self.guard.is_signed(request.path(), request.query()) {
            debug!(path = request.path(), "Self-request missed, not regenerating");
            return MissOutcome::PassThrough(PassReason::SelfRequest);
        }

        if !request.is_upload() {
            return MissOutcome::PassThrough(PassReason::OutsideUploads);
        }

        // Parsed
        let image = request.image();
        let Some((spec, candidate)) =
            parse_size_spec(request.path()).and_then(|spec| {
                let candidate = spec.master_path(&image)?;
                Some((spec, candidate))
            })
        else {
            debug!(path = request.path(), "Not a derivative path");
            return MissOutcome::PassThrough(PassReason::NotAThumbnail);
        };

        // MasterValidated
        let master = match self.resolver.resolve(request, &candidate, &self.hooks).await {
            Ok(master) => master,
            Err(e) => {
                match &e {
                    ResolveError::Store(StoreError::Io(_)) => {
                        error!(master = %candidate, error = %e, "Metadata lookup failed")
                    }
                    _ => debug!(master = %candidate, error = %e, "Master not found"),
                }
                return MissOutcome::PassThrough(PassReason::MasterNotFound);
            }
        };

        // Generated
        let thumbnail = match self.generator.generate(&master.relative_path, &spec).await {
            Ok(thumbnail) => thumbnail,
            Err(e) => {
                warn!(
                    master = %master.relative_path,
                    width = spec.width,
                    height = spec.height,
                    error = %e,
                    "Derivative generation failed"
                );
                return MissOutcome::PassThrough(PassReason::GenerationFailed);
            }
        };

        // Streamed
        let result = match self.derivative_url(request, &image, &thumbnail) {
            Ok(url) => self.streamer.stream(&self.guard.sign(url)).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(response) => {
                info!(
                    path = request.path(),
                    derivative = %thumbnail.relative_path,
                    status = response.status().as_u16(),
                    "Served generated derivative"
                );
                MissOutcome::Streamed(response)
            }
            Err(e) => {
                warn!(
                    derivative = %thumbnail.relative_path,
                    error = %e,
                    "Failed to stream generated derivative"
                );
                MissOutcome::PassThrough(PassReason::StreamFailed)
            }
        }
    }

    /// URL of the stored derivative: the requested image with its basename
    /// replaced by the name the codec chose, on the self origin.
    fn derivative_url(
        &self,
        request: &ImageRequest,
        image: &str,
        thumbnail: &GeneratedThumbnail,
    ) -> Result<Url, StreamError> {
        let dir = image.rsplit_once('/').map_or(image, |(dir, _)| dir);
        let location = format!("{}/{}", dir, urlencoding::encode(&thumbnail.file_name));
        let absolute = request.absolute(&location);

        let url = Url::parse(&absolute)
            .map_err(|e| StreamError::InvalidUrl(format!("{absolute}: {e}")))?;
        let url = self.hooks.image_url(url, request);
        Ok(self.hooks.prepare_request_url(url, request))
    }
}
