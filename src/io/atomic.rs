//! Atomic file writes.
//!
//! Derivatives are stored through a temporary file in the destination
//! directory followed by a rename, so the static file server never serves a
//! half-written image.

use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// Write `bytes` to `path` so readers only ever see the old or the new file.
///
/// The data goes to a temporary file in the destination directory, is synced,
/// and is then renamed over `path`. Concurrent writers of the same path race
/// on the rename; the last one wins and no partial file is ever visible.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    Ok(())
}
