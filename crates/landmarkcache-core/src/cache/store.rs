use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::atomic::{atomic_write, read_optional, TEMP_SUFFIX};
use super::entry::{CacheEntry, ImageBlob};
use crate::config::LocatorConfig;
use crate::error::{LocateError, Result};
use crate::geo::QuerySignature;
use crate::models::Landmark;

const LANDMARKS_DIR: &str = "landmarks";
const IMAGES_DIR: &str = "images";
const ENTRY_EXT: &str = "json";
const IMAGE_EXT: &str = "img";

/// Counts reported by [`CacheStore::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub landmark_entries: usize,
    pub stale_entries: usize,
    pub images: usize,
    pub image_bytes: u64,
}

/// Files removed by [`CacheStore::sweep_expired`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub landmark_entries: usize,
    pub images: usize,
}

/// Durable landmark and image cache for one namespace directory.
///
/// Holds only paths and TTLs, so clones are cheap and can be used from any
/// thread. Cross-process safety comes from atomic renames: last writer wins.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    landmark_ttl: Duration,
    image_ttl: Duration,
}

impl CacheStore {
    pub fn new(root: PathBuf, landmark_ttl: Duration, image_ttl: Duration) -> Result<Self> {
        for dir in [root.join(LANDMARKS_DIR), root.join(IMAGES_DIR)] {
            fs::create_dir_all(&dir).map_err(|e| LocateError::cache_write(&dir, e))?;
        }
        Ok(Self {
            root,
            landmark_ttl,
            image_ttl,
        })
    }

    /// Store rooted at the configured mode's namespace directory.
    pub fn for_config(config: &LocatorConfig) -> Result<Self> {
        let root = config
            .namespace_dir()
            .map_err(|e| LocateError::Config(format!("{:#}", e)))?;
        Self::new(root, config.landmark_ttl(), config.image_ttl())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn landmark_ttl(&self) -> Duration {
        self.landmark_ttl
    }

    pub fn image_ttl(&self) -> Duration {
        self.image_ttl
    }

    fn landmark_path(&self, signature: &QuerySignature) -> PathBuf {
        self.root
            .join(LANDMARKS_DIR)
            .join(format!("{}.{}", hash_key(signature.as_str()), ENTRY_EXT))
    }

    fn image_path(&self, image_id: &str) -> PathBuf {
        self.root
            .join(IMAGES_DIR)
            .join(format!("{}.{}", hash_key(image_id), IMAGE_EXT))
    }

    // ===== Landmarks =====

    /// Exact-signature lookup. Unreadable or corrupt entries count as a miss.
    pub fn get(&self, signature: &QuerySignature) -> Option<CacheEntry> {
        let path = self.landmark_path(signature);
        let data = match read_optional(&path) {
            Ok(Some(data)) => data,
            Ok(None) => return None,
            Err(e) => {
                warn!(%signature, path = %path.display(), error = %e, "Failed to read cache entry");
                return None;
            }
        };

        match serde_json::from_slice::<CacheEntry>(&data) {
            Ok(entry) if entry.signature == *signature => Some(entry),
            Ok(entry) => {
                warn!(
                    %signature,
                    stored = %entry.signature,
                    "Cache entry signature mismatch, ignoring"
                );
                None
            }
            Err(e) => {
                warn!(%signature, path = %path.display(), error = %e, "Corrupt cache entry, treating as miss");
                None
            }
        }
    }

    /// Replace the entry for `signature` with `landmarks`, stamped now.
    pub fn put(&self, signature: &QuerySignature, landmarks: &[Landmark]) -> Result<CacheEntry> {
        let entry = CacheEntry::new(signature.clone(), landmarks.to_vec(), self.landmark_ttl);
        let path = self.landmark_path(signature);
        let contents = serde_json::to_vec_pretty(&entry)
            .map_err(|e| LocateError::cache_write(&path, io::Error::new(io::ErrorKind::InvalidData, e)))?;
        atomic_write(&path, &contents)?;
        debug!(%signature, count = landmarks.len(), "Cached landmarks");
        Ok(entry)
    }

    pub fn is_fresh(&self, entry: &CacheEntry) -> bool {
        entry.is_fresh()
    }

    /// Remove the entry for `signature`. Returns whether one existed.
    pub fn invalidate(&self, signature: &QuerySignature) -> Result<bool> {
        let path = self.landmark_path(signature);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(%signature, "Invalidated cache entry");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LocateError::cache_write(path, e)),
        }
    }

    // ===== Images =====

    pub fn get_image(&self, image_id: &str) -> Option<Vec<u8>> {
        self.get_image_blob(image_id).map(|blob| blob.bytes)
    }

    pub fn get_image_blob(&self, image_id: &str) -> Option<ImageBlob> {
        let path = self.image_path(image_id);
        let data = match read_optional(&path) {
            Ok(data) => data?,
            Err(e) => {
                warn!(image_id, error = %e, "Failed to read cached image");
                return None;
            }
        };

        match ImageBlob::decode(&data) {
            Ok(blob) if blob.image_id == image_id => Some(blob),
            Ok(_) => {
                warn!(image_id, "Cached image id mismatch, ignoring");
                None
            }
            Err(e) => {
                warn!(image_id, error = %e, "Corrupt cached image, treating as miss");
                None
            }
        }
    }

    pub fn put_image(&self, image_id: &str, bytes: &[u8]) -> Result<()> {
        let blob = ImageBlob::new(image_id, bytes.to_vec());
        atomic_write(&self.image_path(image_id), &blob.encode())?;
        debug!(image_id, bytes = bytes.len(), "Cached image");
        Ok(())
    }

    // ===== Maintenance =====

    /// Delete every landmark entry and image in this namespace.
    pub fn clear_all(&self) -> Result<()> {
        for name in [LANDMARKS_DIR, IMAGES_DIR] {
            let dir = self.root.join(name);
            match fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(LocateError::cache_write(dir, e)),
            }
            fs::create_dir_all(&dir).map_err(|e| LocateError::cache_write(&dir, e))?;
        }
        info!(root = %self.root.display(), "Cleared cache");
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();

        for path in list_files(&self.root.join(LANDMARKS_DIR), ENTRY_EXT) {
            stats.landmark_entries += 1;
            let stale = read_entry(&path).map_or(true, |entry| !entry.is_fresh());
            if stale {
                stats.stale_entries += 1;
            }
        }

        for path in list_files(&self.root.join(IMAGES_DIR), IMAGE_EXT) {
            stats.images += 1;
            stats.image_bytes += fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        }

        stats
    }

    /// Remove landmark entries and images older than their TTL, plus
    /// orphaned temp files. Never called from the read path.
    pub fn sweep_expired(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let now = Utc::now();

        for path in list_files(&self.root.join(LANDMARKS_DIR), ENTRY_EXT) {
            let expired = read_entry(&path).map_or(true, |entry| !entry.is_fresh_at(now));
            if expired && remove_if_present(&path)? {
                report.landmark_entries += 1;
            }
        }

        for path in list_files(&self.root.join(IMAGES_DIR), IMAGE_EXT) {
            let expired = fs::read(&path)
                .ok()
                .and_then(|data| ImageBlob::decode(&data).ok())
                .map_or(true, |blob| blob.is_expired(self.image_ttl));
            if expired && remove_if_present(&path)? {
                report.images += 1;
            }
        }

        for name in [LANDMARKS_DIR, IMAGES_DIR] {
            for path in list_files(&self.root.join(name), TEMP_SUFFIX) {
                if is_abandoned(&path) {
                    remove_if_present(&path)?;
                }
            }
        }

        if report != SweepReport::default() {
            info!(
                landmark_entries = report.landmark_entries,
                images = report.images,
                "Swept expired cache files"
            );
        }
        Ok(report)
    }
}

/// Lowercase hex sha256 of a cache key, used as the file stem.
fn hash_key(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

fn read_entry(path: &Path) -> Option<CacheEntry> {
    let data = fs::read(path).ok()?;
    serde_json::from_slice(&data).ok()
}

fn list_files(dir: &Path, ext: &str) -> Vec<PathBuf> {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return Vec::new();
    };
    read_dir
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(ext))
        .collect()
}

fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(LocateError::cache_write(path, e)),
    }
}

/// Temp files older than an hour belong to a writer that died mid-write.
fn is_abandoned(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age.as_secs() > 3600)
}
