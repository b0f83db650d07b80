//! Ingestion and derived-asset pipeline: scanning, metadata extraction,
//! catalog import, and background rendition generation.

pub mod cancel;
pub mod error;
pub mod import;
pub mod metadata;
pub mod render;
pub mod scan;

pub use cancel::CancellationFlag;
pub use error::ImportError;
pub use import::{ImportOutcome, Importer, IMPORT_COMMIT_BATCH};
pub use metadata::{
    ExifMetadataReader, MetadataBatchReader, MetadataReader, ParsedMetadata, METADATA_CHUNK_SIZE,
};
pub use render::{
    ImageRenderer, RenderQueue, RenderQueueStatus, Renderer, PREVIEW_MAX_DIM, THUMBNAIL_MAX_DIM,
};
pub use scan::{scan, AssetPath};
