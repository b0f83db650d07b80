//! Rendition caching for catalog assets.
//!
//! Renditions are quality-reduced JPEG derivatives keyed by asset
//! identifier. The store keeps everything on disk and holds the small
//! thumbnail tier in a bounded LRU so grid scrolling does not hit the
//! filesystem for every cell.

pub mod lru;
pub mod store;

pub use lru::LruCache;
pub use store::{CacheError, CacheLimits, RenditionCache, RENDITION_JPEG_QUALITY};
