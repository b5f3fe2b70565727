//! HTTP host for the upload directory.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │              GET {upload_prefix}/photos/a-150x150.jpg           │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  ServeDir   │─►│  handlers   │─►│        streamer         │  │
//! │  │ (hit)       │  │ (miss)      │  │  (relay derivative)     │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;
pub mod streamer;

pub use handlers::{
    health_handler, miss_handler, sizes_handler, AppState, ErrorResponse, HealthResponse,
    PassThrough, SizesResponse,
};
pub use routes::{create_router, RouterConfig};
pub use streamer::ResponseStreamer;
