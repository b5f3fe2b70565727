//! # thumb-streamer
//!
//! An on-demand thumbnail cache for an upload directory served over HTTP.
//!
//! Clients request derivatives by name (`photos/sunset-150x150.jpg`). Files
//! that exist are served directly. A miss runs a short pipeline: parse the
//! size from the path, confirm the master exists and is a registered asset,
//! crop it to the exact box, store the result next to the master and stream
//! it back. Every later request is a plain static hit.
//!
//! ## Features
//!
//! - **Path grammar**: `<stem>[-e<editor>]-<W>x<H>.<ext>`, parsed by an explicit tokenizer
//! - **No upscaling**: masters smaller than the box are never enlarged
//! - **Atomic stores**: derivatives appear under their final name only when complete
//! - **Loop-safe self-requests**: every outbound URL goes to a configured origin and
//!   carries a marker, optionally HMAC-keyed
//! - **Extension hooks**: strategy objects can rewrite URLs and paths or observe outcomes
//!
//! ## Architecture
//!
//! - [`request`] - Per-request facts, size parsing and the loop guard
//! - [`master`] - Master probing and the metadata store
//! - [`thumbnail`] - Size policy, codecs and derivative generation
//! - [`pipeline`] - The miss state machine and its hooks
//! - [`server`] - Axum router, handlers and the response streamer
//! - [`io`] - Outbound HTTP and atomic file writes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use thumb_streamer::{
//!     create_http_client, create_router, HttpUpstream, ImageCrateCodec, LoopGuard,
//!     MasterResolver, MemoryMetadataStore, Pipeline, ResponseStreamer, RouterConfig,
//!     ThumbnailGenerator, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = create_http_client(DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)?;
//!     let upstream = Arc::new(HttpUpstream::new(client));
//!     let store = MemoryMetadataStore::new().with_entry("photos/sunset.jpg", "42");
//!     let guard = LoopGuard::default();
//!
//!     let pipeline = Pipeline::new(
//!         MasterResolver::new(upstream.clone(), Arc::new(store), guard.clone()),
//!         ThumbnailGenerator::new("/srv/uploads", Arc::new(ImageCrateCodec::new())),
//!         ResponseStreamer::new(upstream),
//!         guard,
//!     );
//!
//!     // Self-requests go to this origin, never to the client's Host
//!     let origin = url::Url::parse("http://127.0.0.1:3000")?;
//!     let config = RouterConfig::new("/uploads", "/srv/uploads", origin);
//!     let router = create_router(pipeline, config);
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod io;
pub mod master;
pub mod pipeline;
pub mod request;
pub mod server;
pub mod thumbnail;

// Re-export commonly used types
pub use config::{Cli, Command, EditorSpec, GenerateConfig, GenerationArgs, ServeConfig};
pub use error::{
    CodecError, GenerateError, ResolveError, ServerError, StoreError, StreamError, UpstreamError,
};
pub use io::{
    create_http_client, write_atomic, HttpUpstream, Upstream, UpstreamResponse,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
};
pub use master::{
    AttachmentId, JsonMetadataStore, MasterImage, MasterResolver, MemoryMetadataStore,
    MetadataStore,
};
pub use pipeline::{Hooks, MissOutcome, PassReason, Pipeline, PipelineHook};
pub use request::{
    parse_size_spec, ImageRequest, LoopGuard, SignedUrl, SizeSpec, DEFAULT_LOOP_TOKEN,
};
pub use server::{
    create_router, health_handler, miss_handler, sizes_handler, AppState, ErrorResponse,
    HealthResponse, PassThrough, ResponseStreamer, RouterConfig, SizesResponse,
};
pub use thumbnail::{
    parse_filter, GeneratedThumbnail, ImageCodec, ImageCrateCodec, NamedSize, SizePolicy,
    SizeRegistry, ThumbnailGenerator, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
