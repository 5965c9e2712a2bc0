//! Atomic file writes for cache entries.
//!
//! Writes go to a uniquely named temp file in the target directory, are
//! synced to disk, then renamed over the target. Readers see either the old
//! file or the new one, never a partial write.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use tracing::{debug, warn};

use crate::error::{LocateError, Result};

/// Suffix shared by all in-flight temp files.
pub const TEMP_SUFFIX: &str = "tmp";

/// Write `bytes` to `path` atomically, creating the parent directory.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| LocateError::cache_write(parent, e))?;
    }

    let temp_path = temp_path_for(path);
    if let Err(e) = write_synced(&temp_path, bytes) {
        discard(&temp_path);
        return Err(LocateError::cache_write(&temp_path, e));
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        discard(&temp_path);
        return Err(LocateError::cache_write(path, e));
    }

    debug!(path = %path.display(), bytes = bytes.len(), "Atomically wrote cache file");
    Ok(())
}

/// Read a whole file, mapping "not found" to `None`.
pub fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Unique sibling temp path: `<name>.<ext>.<pid>.<nonce>.tmp`.
fn temp_path_for(path: &Path) -> PathBuf {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("dat");
    let nonce: u64 = rand::random();
    path.with_extension(format!(
        "{}.{}.{:016x}.{}",
        ext,
        process::id(),
        nonce,
        TEMP_SUFFIX
    ))
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(bytes)?;
    file.flush()?;
    file.sync_all()
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove temp file");
        }
    }
}
