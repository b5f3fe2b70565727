//! Derivative generation.
//!
//! The generator turns an upload-relative master path and a [`SizeSpec`]
//! into a stored derivative. It owns three decisions:
//!
//! - whether the box is allowed ([`SizePolicy`])
//! - which codec serves the request (default, the one bound to the editor id,
//!   or the default's editor variant when nothing is bound)
//! - where the master lives on disk (under the upload root, never outside it)
//!
//! The codec runs on a blocking thread. There is no lock around a given
//! derivative: concurrent misses for the same box both generate, and the
//! atomic rename in the codec keeps the stored file whole.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use image::ImageFormat;
use tracing::{debug, info};

use crate::error::GenerateError;
use crate::request::SizeSpec;

use super::codec::ImageCodec;
use super::sizes::{SizePolicy, SizeRegistry};

/// Derivatives are always hard-cropped to the exact box.
const CROP: bool = true;

/// A derivative that was stored under the upload root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedThumbnail {
    /// File name chosen by the codec (e.g. `sunset-150x150.jpg`)
    pub file_name: String,

    /// Path under the upload root (e.g. `photos/sunset-150x150.jpg`)
    pub relative_path: String,

    pub width: u32,
    pub height: u32,

    /// MIME type implied by the derivative's extension
    pub mime_type: &'static str,
}

/// Generates and stores derivatives of registered masters.
#[derive(Clone)]
pub struct ThumbnailGenerator {
    upload_dir: PathBuf,
    codec: Arc<dyn ImageCodec>,
    editors: HashMap<String, Arc<dyn ImageCodec>>,
    sizes: Arc<SizeRegistry>,
    policy: SizePolicy,
}

impl ThumbnailGenerator {
    /// Create a generator writing under `upload_dir` with `codec` as the
    /// default strategy and no size restriction.
    pub fn new(upload_dir: impl Into<PathBuf>, codec: Arc<dyn ImageCodec>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            codec,
            editors: HashMap::new(),
            sizes: Arc::new(SizeRegistry::new()),
            policy: SizePolicy::Any,
        }
    }

    /// Bind an alternate codec to an editor id (`-e<id>-` in the path).
    pub fn with_editor(mut self, editor_id: impl Into<String>, codec: Arc<dyn ImageCodec>) -> Self {
        self.editors.insert(editor_id.into(), codec);
        self
    }

    /// Restrict generation according to `policy` over `sizes`.
    pub fn with_sizes(mut self, sizes: Arc<SizeRegistry>, policy: SizePolicy) -> Self {
        self.sizes = sizes;
        self.policy = policy;
        self
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn sizes(&self) -> &Arc<SizeRegistry> {
        &self.sizes
    }

    pub fn policy(&self) -> SizePolicy {
        self.policy
    }

    /// Absolute path of an upload-relative file.
    ///
    /// Rejects empty paths and anything that is not a plain sequence of
    /// normal components, so the result always stays under the upload root.
    pub fn absolute_path(&self, relative_path: &str) -> Result<PathBuf, GenerateError> {
        let relative = Path::new(relative_path);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));

        if relative_path.is_empty() || !plain {
            return Err(GenerateError::InvalidPath(relative_path.to_string()));
        }

        Ok(self.upload_dir.join(relative))
    }

    /// Generate the derivative of `master_relative_path` described by `spec`.
    pub async fn generate(
        &self,
        master_relative_path: &str,
        spec: &SizeSpec,
    ) -> Result<GeneratedThumbnail, GenerateError> {
        if !self.policy.allows(&self.sizes, spec.width, spec.height) {
            return Err(GenerateError::SizeNotAllowed {
                width: spec.width,
                height: spec.height,
            });
        }

        let codec = match &spec.editor_id {
            None => Arc::clone(&self.codec),
            Some(id) => self
                .editors
                .get(id)
                .cloned()
                .or_else(|| self.codec.editor_variant(id))
                .ok_or_else(|| GenerateError::UnknownEditor(id.clone()))?,
        };

        let source = self.absolute_path(master_relative_path)?;
        let (width, height) = (spec.width, spec.height);

        debug!(
            master = %source.display(),
            width,
            height,
            editor = ?spec.editor_id,
            "Generating derivative"
        );

        let file_name = tokio::task::spawn_blocking(move || codec.resize(&source, width, height, CROP))
            .await
            .map_err(|e| GenerateError::Task(e.to_string()))??;

        let relative_path = match master_relative_path.rsplit_once('/') {
            Some((dir, _)) => format!("{}/{}", dir, file_name),
            None => file_name.clone(),
        };

        let mime_type = ImageFormat::from_path(&file_name)
            .map(|f| f.to_mime_type())
            .unwrap_or("application/octet-stream");

        info!(
            master = master_relative_path,
            derivative = %relative_path,
            width,
            height,
            "Generated derivative"
        );

        Ok(GeneratedThumbnail {
            file_name,
            relative_path,
            width,
            height,
            mime_type,
        })
    }
}
