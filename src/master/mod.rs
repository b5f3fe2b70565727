//! Master image lookup.
//!
//! ```text
//! candidate ──► HEAD probe (signed) ──► 2xx? ──► MetadataStore ──► MasterImage
//!                       │                              │
//!                       └────── NotFound ◄─────────────┘
//! ```

mod resolver;
mod store;

pub use resolver::{MasterImage, MasterResolver};
pub use store::{AttachmentId, JsonMetadataStore, MemoryMetadataStore, MetadataStore};
