//! Metadata stores mapping upload-relative paths to asset identifiers.
//!
//! Only files registered in a store may be used as masters. A file that
//! exists on disk but has no record is not a media asset.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;

/// Opaque identifier of a registered media asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentId(String);

impl AttachmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Empty and zero ids do not identify an asset.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty() || self.0 == "0"
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read-only lookup of asset identifiers by upload-relative path.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Return the asset bound to `relative_path`, or `None`.
    ///
    /// # Arguments
    /// * `relative_path` - Path under the upload root, without a leading `/`
    ///   (e.g. `photos/sunset.jpg`)
    async fn attachment_id(&self, relative_path: &str)
        -> Result<Option<AttachmentId>, StoreError>;
}

// =============================================================================
// In-memory store
// =============================================================================

/// Store backed by a map, populated up front.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetadataStore {
    entries: HashMap<String, AttachmentId>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, relative_path: impl Into<String>, id: impl Into<String>) -> Self {
        self.insert(relative_path, id);
        self
    }

    pub fn insert(&mut self, relative_path: impl Into<String>, id: impl Into<String>) {
        self.entries
            .insert(relative_path.into(), AttachmentId::new(id));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn attachment_id(
        &self,
        relative_path: &str,
    ) -> Result<Option<AttachmentId>, StoreError> {
        Ok(self.entries.get(relative_path).cloned())
    }
}

// =============================================================================
// JSON manifest store
// =============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum ManifestId {
    Number(u64),
    Text(String),
}

/// Store loaded once from a JSON manifest.
///
/// The manifest is an object mapping upload-relative paths to ids:
///
/// ```json
/// {
///   "photos/sunset.jpg": 42,
///   "photos/tree.png": "tree-asset"
/// }
/// ```
#[derive(Debug, Clone)]
pub struct JsonMetadataStore {
    path: PathBuf,
    inner: MemoryMetadataStore,
}

impl JsonMetadataStore {
    /// Load and parse the manifest at `path`.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let raw = tokio::fs::read(&path)
            .await
            .map_err(|e| StoreError::Io(format!("{}: {}", path.display(), e)))?;

        let inner = Self::parse(&raw)?;
        debug!(
            manifest = %path.display(),
            entries = inner.len(),
            "Loaded metadata manifest"
        );

        Ok(Self { path, inner })
    }

    /// Parse manifest bytes.
    pub fn parse(raw: &[u8]) -> Result<MemoryMetadataStore, StoreError> {
        let manifest: HashMap<String, ManifestId> =
            serde_json::from_slice(raw).map_err(|e| StoreError::Invalid(e.to_string()))?;

        let mut store = MemoryMetadataStore::new();
        for (relative_path, id) in manifest {
            let relative_path = relative_path.trim_start_matches('/').to_string();
            let id = match id {
                ManifestId::Number(n) => n.to_string(),
                ManifestId::Text(s) => s,
            };
            store.insert(relative_path, id);
        }
        Ok(store)
    }

    /// Location of the manifest this store was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl MetadataStore for JsonMetadataStore {
    async fn attachment_id(
        &self,
        relative_path: &str,
    ) -> Result<Option<AttachmentId>, StoreError> {
        self.inner.attachment_id(relative_path).await
    }
}
