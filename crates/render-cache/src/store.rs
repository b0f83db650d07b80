//! Two-tier rendition store: a bounded in-memory LRU for thumbnails in
//! front of a plain keyed file store holding both rendition kinds.
//!
//! On-disk layout is load-bearing for the orphan sweep and must not
//! change: `<uuid>.jpg` for thumbnails, `<uuid>_preview.jpg` for
//! previews, one catalog-scoped directory at a time.

use std::collections::HashSet;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use core_types::{AssetId, RenditionKind};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use thiserror::Error;
use tracing::{debug, warn};

use crate::lru::LruCache;

/// Fixed encode quality for all cached renditions.
pub const RENDITION_JPEG_QUALITY: u8 = 35;

const PREVIEW_SUFFIX: &str = "_preview";
const RENDITION_EXT: &str = "jpg";

pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image encode error: {0}")]
    Image(#[from] image::ImageError),
}

/// Bounds for the in-memory thumbnail tier.
#[derive(Debug, Clone, Copy)]
pub struct CacheLimits {
    pub max_entries: usize,
    pub max_bytes: usize,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            max_entries: 512,
            max_bytes: 64 * 1024 * 1024,
        }
    }
}

pub struct RenditionCache {
    dir: RwLock<PathBuf>,
    memory: Mutex<LruCache<AssetId, Vec<u8>>>,
}

impl RenditionCache {
    pub fn new(dir: PathBuf, limits: CacheLimits) -> Self {
        Self {
            dir: RwLock::new(dir),
            memory: Mutex::new(LruCache::new(limits.max_entries, limits.max_bytes)),
        }
    }

    pub fn active_dir(&self) -> PathBuf {
        self.dir.read().expect("cache dir poisoned").clone()
    }

    /// Swaps the backing directory for a different catalog and drops the
    /// whole memory tier (thumbnail keys belong to one identifier space).
    pub fn switch_directory(&self, dir: PathBuf) {
        let mut guard = self.dir.write().expect("cache dir poisoned");
        *guard = dir;
        self.memory.lock().expect("cache memory poisoned").clear();
    }

    /// Encodes and stores one rendition, creating the backing directory on
    /// first use. Thumbnails are additionally kept resident in memory;
    /// previews are disk-only.
    pub fn put(&self, id: AssetId, kind: RenditionKind, image: &DynamicImage) -> Result<()> {
        let bytes = encode_jpeg(image)?;
        let path = self.rendition_path(id, kind);

        let dir = self.active_dir();
        fs::create_dir_all(&dir)?;

        // Write-then-rename keeps readers from observing partial bytes.
        let tmp = dir.join(format!(".{}.tmp", file_name(id, kind)));
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &path)?;
        debug!(asset = %id, ?kind, bytes = bytes.len(), "stored rendition");

        if kind == RenditionKind::Thumbnail {
            let cost = bytes.len();
            self.memory
                .lock()
                .expect("cache memory poisoned")
                .insert(id, bytes, cost);
        }
        Ok(())
    }

    /// Fetches rendition bytes, memory first for thumbnails, then disk.
    /// Disk hits for thumbnails backfill the memory tier.
    pub fn get(&self, id: AssetId, kind: RenditionKind) -> Result<Option<Vec<u8>>> {
        if kind == RenditionKind::Thumbnail {
            let mut memory = self.memory.lock().expect("cache memory poisoned");
            if let Some(bytes) = memory.get(&id) {
                return Ok(Some(bytes.clone()));
            }
        }

        let path = self.rendition_path(id, kind);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        if kind == RenditionKind::Thumbnail {
            let cost = bytes.len();
            self.memory
                .lock()
                .expect("cache memory poisoned")
                .insert(id, bytes.clone(), cost);
        }
        Ok(Some(bytes))
    }

    /// Existence check mirroring [`RenditionCache::get`]'s search order
    /// without loading bytes.
    pub fn contains(&self, id: AssetId, kind: RenditionKind) -> bool {
        if kind == RenditionKind::Thumbnail
            && self
                .memory
                .lock()
                .expect("cache memory poisoned")
                .contains(&id)
        {
            return true;
        }
        self.rendition_path(id, kind).exists()
    }

    /// Removes both rendition kinds for an identifier. Missing files are a
    /// no-op, not an error.
    pub fn remove(&self, id: AssetId) -> Result<()> {
        for kind in [RenditionKind::Thumbnail, RenditionKind::Preview] {
            match fs::remove_file(self.rendition_path(id, kind)) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        self.memory
            .lock()
            .expect("cache memory poisoned")
            .remove(&id);
        Ok(())
    }

    /// Deletes every rendition file whose identifier is not in `valid`,
    /// returning the number of files removed. Files that do not follow the
    /// rendition naming scheme are left alone. O(files-on-disk); meant for
    /// periodic maintenance, not the hot path.
    pub fn purge_orphans(&self, valid: &HashSet<AssetId>) -> Result<usize> {
        let dir = self.active_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let Some(id) = parse_rendition_file(&path) else {
                continue;
            };
            if valid.contains(&id) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(asset = %id, path = %path.display(), "purged orphaned rendition");
                    removed += 1;
                }
                Err(err) => {
                    warn!(path = %path.display(), %err, "failed to purge orphaned rendition");
                }
            }
        }

        self.memory
            .lock()
            .expect("cache memory poisoned")
            .retain(|id| valid.contains(id));
        Ok(removed)
    }

    fn rendition_path(&self, id: AssetId, kind: RenditionKind) -> PathBuf {
        self.active_dir().join(file_name(id, kind))
    }
}

fn file_name(id: AssetId, kind: RenditionKind) -> String {
    match kind {
        RenditionKind::Thumbnail => format!("{id}.{RENDITION_EXT}"),
        RenditionKind::Preview => format!("{id}{PREVIEW_SUFFIX}.{RENDITION_EXT}"),
    }
}

/// Recovers the asset identifier from a rendition file name, or `None`
/// when the name does not follow the scheme.
fn parse_rendition_file(path: &Path) -> Option<AssetId> {
    if path.extension().and_then(|e| e.to_str()) != Some(RENDITION_EXT) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let raw = stem.strip_suffix(PREVIEW_SUFFIX).unwrap_or(stem);
    raw.parse().ok()
}

fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>> {
    // JPEG has no alpha channel; flatten before encoding.
    let rgb = image.to_rgb8();
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(Cursor::new(&mut out), RENDITION_JPEG_QUALITY);
    encoder.encode_image(&rgb)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use tempfile::tempdir;

    fn test_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            image::Rgba([90, 120, 30, 255]),
        ))
    }

    #[test]
    fn put_then_get_round_trips_pixel_dimensions() {
        let dir = tempdir().unwrap();
        let cache = RenditionCache::new(dir.path().join("renditions"), CacheLimits::default());
        let id = AssetId::new();

        cache
            .put(id, RenditionKind::Thumbnail, &test_image(120, 80))
            .unwrap();
        let bytes = cache.get(id, RenditionKind::Thumbnail).unwrap().unwrap();

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (120, 80));
    }

    #[test]
    fn previews_are_disk_only() {
        let dir = tempdir().unwrap();
        let cache = RenditionCache::new(dir.path().join("renditions"), CacheLimits::default());
        let id = AssetId::new();

        cache
            .put(id, RenditionKind::Preview, &test_image(64, 64))
            .unwrap();

        assert!(dir
            .path()
            .join("renditions")
            .join(format!("{id}_preview.jpg"))
            .exists());
        assert!(!dir.path().join("renditions").join(format!("{id}.jpg")).exists());
        // The preview is readable even though nothing sits in memory.
        assert!(cache.get(id, RenditionKind::Preview).unwrap().is_some());
        assert!(cache.get(id, RenditionKind::Thumbnail).unwrap().is_none());
    }

    #[test]
    fn directory_is_created_lazily() {
        let dir = tempdir().unwrap();
        let backing = dir.path().join("renditions");
        let cache = RenditionCache::new(backing.clone(), CacheLimits::default());
        assert!(!backing.exists());

        cache
            .put(AssetId::new(), RenditionKind::Thumbnail, &test_image(8, 8))
            .unwrap();
        assert!(backing.exists());
    }

    #[test]
    fn remove_tolerates_missing_entries() {
        let dir = tempdir().unwrap();
        let cache = RenditionCache::new(dir.path().to_path_buf(), CacheLimits::default());
        cache.remove(AssetId::new()).unwrap();
    }

    #[test]
    fn orphan_sweep_removes_exactly_the_invalid_ids() {
        let dir = tempdir().unwrap();
        let cache = RenditionCache::new(dir.path().to_path_buf(), CacheLimits::default());
        let (a, b, c) = (AssetId::new(), AssetId::new(), AssetId::new());

        for id in [a, b, c] {
            cache.put(id, RenditionKind::Thumbnail, &test_image(8, 8)).unwrap();
            cache.put(id, RenditionKind::Preview, &test_image(16, 16)).unwrap();
        }
        std::fs::write(dir.path().join("unrelated.txt"), b"keep me").unwrap();

        let valid: HashSet<AssetId> = [a, c].into_iter().collect();
        let removed = cache.purge_orphans(&valid).unwrap();
        assert_eq!(removed, 2);

        assert!(cache.contains(a, RenditionKind::Thumbnail));
        assert!(cache.contains(c, RenditionKind::Preview));
        assert!(!cache.contains(b, RenditionKind::Thumbnail));
        assert!(!cache.contains(b, RenditionKind::Preview));
        assert!(dir.path().join("unrelated.txt").exists());
    }

    #[test]
    fn switch_directory_invalidates_memory_tier() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        let cache = RenditionCache::new(first.path().to_path_buf(), CacheLimits::default());
        let id = AssetId::new();

        cache.put(id, RenditionKind::Thumbnail, &test_image(8, 8)).unwrap();
        cache.switch_directory(second.path().to_path_buf());

        // Memory was dropped with the old identifier space and the new
        // directory holds nothing for this id.
        assert!(cache.get(id, RenditionKind::Thumbnail).unwrap().is_none());
    }

    #[test]
    fn disk_hit_backfills_memory_for_thumbnails() {
        let dir = tempdir().unwrap();
        let cache = RenditionCache::new(dir.path().to_path_buf(), CacheLimits::default());
        let id = AssetId::new();
        cache.put(id, RenditionKind::Thumbnail, &test_image(8, 8)).unwrap();

        // Simulate a cold start by clearing memory only.
        cache.memory.lock().unwrap().clear();
        assert!(cache.get(id, RenditionKind::Thumbnail).unwrap().is_some());
        assert!(cache.memory.lock().unwrap().contains(&id));
    }
}
