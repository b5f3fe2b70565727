//! Master image resolution.
//!
//! A master is usable only when both checks pass:
//!
//! 1. A live HEAD probe of its URL answers with a 2xx status. The probe goes
//!    over HTTP, not a filesystem stat, because the master may be remote.
//! 2. The metadata store knows an asset id for its upload-relative path.

use std::sync::Arc;

use tracing::debug;
use url::Url;

use crate::error::ResolveError;
use crate::io::Upstream;
use crate::pipeline::Hooks;
use crate::request::{ImageRequest, LoopGuard};

use super::store::{AttachmentId, MetadataStore};

/// A master image that passed both existence checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterImage {
    /// Absolute URL the master was probed at (without the loop marker)
    pub url: Url,

    /// Path under the upload root, decoded (e.g. `photos/sunset.jpg`)
    pub relative_path: String,

    /// Asset id from the metadata store
    pub attachment_id: AttachmentId,
}

/// Confirms that a candidate master exists and is a registered asset.
#[derive(Clone)]
pub struct MasterResolver {
    upstream: Arc<dyn Upstream>,
    store: Arc<dyn MetadataStore>,
    guard: LoopGuard,
}

impl MasterResolver {
    pub fn new(
        upstream: Arc<dyn Upstream>,
        store: Arc<dyn MetadataStore>,
        guard: LoopGuard,
    ) -> Self {
        Self {
            upstream,
            store,
            guard,
        }
    }

    /// Resolve `candidate`, a scheme-less or absolute location of the master
    /// (e.g. `example.com/uploads/photos/sunset.jpg`).
    pub async fn resolve(
        &self,
        request: &ImageRequest,
        candidate: &str,
        hooks: &Hooks,
    ) -> Result<MasterImage, ResolveError> {
        let absolute = request.absolute(candidate);
        let url =
            Url::parse(&absolute).map_err(|e| ResolveError::InvalidUrl(format!("{absolute}: {e}")))?;
        let url = hooks.prepare_request_url(url, request);

        let signed = self.guard.sign(url.clone());
        let probe = self.upstream.head(&signed).await;
        let status = probe.as_ref().ok().copied();
        let reachable = status.is_some_and(|s| s.is_success());

        if !hooks.master_exists(reachable, status, request) {
            debug!(master = %url, status = ?status, "Master probe failed");
            return Err(match probe {
                Ok(status) => ResolveError::ProbeStatus {
                    status: status.as_u16(),
                },
                Err(e) => ResolveError::Probe(e),
            });
        }

        let relative = request.relative_to_uploads(candidate);
        let relative = urlencoding::decode(&relative)
            .map_err(|e| ResolveError::InvalidUrl(format!("{relative}: {e}")))?
            .into_owned();
        let relative_path = hooks.image_path(relative, request);

        match self.store.attachment_id(&relative_path).await? {
            Some(attachment_id) if !attachment_id.is_empty() => Ok(MasterImage {
                url,
                relative_path,
                attachment_id,
            }),
            _ => {
                debug!(path = %relative_path, "Master is not a registered asset");
                Err(ResolveError::NotRegistered { relative_path })
            }
        }
    }
}
