//! Derivative generation.
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │             ThumbnailGenerator             │
//! │  size policy → editor select → codec call  │
//! └──────────────┬──────────────────┬──────────┘
//!                │                  │
//!                ▼                  ▼
//!       ┌────────────────┐  ┌──────────────────┐
//!       │  SizeRegistry  │  │    ImageCodec    │
//!       │ (named sizes)  │  │ (resize + store) │
//!       └────────────────┘  └──────────────────┘
//! ```

mod codec;
mod generator;
mod sizes;

pub use codec::{
    parse_filter, ImageCodec, ImageCrateCodec, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY,
    MIN_JPEG_QUALITY,
};
pub use generator::{GeneratedThumbnail, ThumbnailGenerator};
pub use sizes::{NamedSize, SizePolicy, SizeRegistry};
