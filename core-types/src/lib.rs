use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod raw_jpeg;

/// Opaque identifier of one imported asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub Uuid);

impl AssetId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AssetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for AssetId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Opaque identifier of one catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogId(pub Uuid);

impl CatalogId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CatalogId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for CatalogId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Broad classification of an imported asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

/// Target size class of a generated rendition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenditionKind {
    Thumbnail,
    Preview,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AssetFlags: u8 {
        const FLAGGED  = 0b0000_0001;
        const REJECTED = 0b0000_0010;
    }
}

/// Extensions that import as `MediaKind::Image`.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "tiff", "tif", "heif", "heic", "dng", "cr2", "nef", "raf", "arw",
];

/// Extensions that import as `MediaKind::Video`.
pub const VIDEO_EXTENSIONS: &[&str] = &["mov", "mp4", "m4v", "avi"];

/// Extensions whose renditions come from an embedded JPEG preview rather
/// than a full decode.
pub const RAW_EXTENSIONS: &[&str] = &["dng", "cr2", "nef", "raf", "arw"];

/// Classify a file extension against the allow-lists. Matching is
/// case-insensitive; anything outside both lists is never imported.
pub fn media_kind_for_extension(ext: &str) -> Option<MediaKind> {
    if IMAGE_EXTENSIONS.iter().any(|c| c.eq_ignore_ascii_case(ext)) {
        Some(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.iter().any(|c| c.eq_ignore_ascii_case(ext)) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

pub fn is_raw_extension(ext: &str) -> bool {
    RAW_EXTENSIONS.iter().any(|c| c.eq_ignore_ascii_case(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_classification_is_case_insensitive() {
        assert_eq!(media_kind_for_extension("JPG"), Some(MediaKind::Image));
        assert_eq!(media_kind_for_extension("cr2"), Some(MediaKind::Image));
        assert_eq!(media_kind_for_extension("MOV"), Some(MediaKind::Video));
        assert_eq!(media_kind_for_extension("txt"), None);
    }

    #[test]
    fn asset_id_round_trips_through_string() {
        let id = AssetId::new();
        let parsed: AssetId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
