//! Catalog import: scan, read metadata in chunks, then insert records in
//! sub-batch transactions so a cancelled run keeps everything committed so
//! far and loses at most the current sub-batch.

use std::collections::HashSet;
use std::path::PathBuf;

use catalog::{AssetMetadata, AssetRecord, CatalogStore};
use chrono::Utc;
use core_types::{AssetFlags, AssetId, CatalogId, MediaKind};
use tracing::{debug, info};

use crate::cancel::CancellationFlag;
use crate::error::ImportError;
use crate::metadata::{MetadataBatchReader, MetadataReader};
use crate::scan::{scan, AssetPath};

/// Records inserted per catalog transaction.
pub const IMPORT_COMMIT_BATCH: usize = 100;

// Progress is split across phases: scanning is cheap and gets the first
// slice, metadata extraction the bulk, record insertion the rest.
const METADATA_PHASE_START: f32 = 0.10;
const METADATA_PHASE_END: f32 = 0.80;

/// What an import run produced. `render_queue` lists the image assets
/// that still need renditions generated.
#[derive(Debug, Default)]
pub struct ImportOutcome {
    pub created: Vec<AssetId>,
    pub render_queue: Vec<AssetId>,
    pub skipped_duplicates: usize,
}

pub struct Importer<'a> {
    store: CatalogStore,
    reader: &'a dyn MetadataReader,
}

impl<'a> Importer<'a> {
    pub fn new(store: CatalogStore, reader: &'a dyn MetadataReader) -> Self {
        Self { store, reader }
    }

    /// Imports every supported file reachable from `inputs` into the given
    /// catalog. Files whose original path is already catalogued are
    /// skipped. `on_progress` receives monotonically non-decreasing values
    /// in `[0.0, 1.0]`, ending at `1.0` on success.
    pub fn import_assets(
        &self,
        inputs: &[PathBuf],
        catalog_id: CatalogId,
        cancel: &CancellationFlag,
        mut on_progress: impl FnMut(f32),
    ) -> Result<ImportOutcome, ImportError> {
        self.store
            .find_catalog(catalog_id)?
            .ok_or(ImportError::NotFound(catalog_id))?;

        on_progress(0.0);
        let candidates = scan(inputs);
        if candidates.is_empty() {
            on_progress(1.0);
            return Ok(ImportOutcome::default());
        }
        debug!(count = candidates.len(), "scan finished");
        on_progress(METADATA_PHASE_START);

        let paths: Vec<PathBuf> = candidates.iter().map(|c| c.path.clone()).collect();
        let span = METADATA_PHASE_END - METADATA_PHASE_START;
        let metadata = MetadataBatchReader::new(self.reader).read_batch(
            &paths,
            cancel,
            |done, total| {
                on_progress(METADATA_PHASE_START + span * done as f32 / total as f32);
            },
        )?;

        let mut session = self.store.session()?;
        let existing: HashSet<String> = AssetRecord::list_paths_for_catalog(session.db(), catalog_id)?
            .into_iter()
            .collect();

        let mut outcome = ImportOutcome::default();
        let total = candidates.len();
        let mut in_batch = 0;

        for (index, candidate) in candidates.iter().enumerate() {
            // Dropping the session here rolls back only the open sub-batch.
            if cancel.is_cancelled() {
                return Err(ImportError::Cancelled);
            }

            let path_str = candidate.path.to_string_lossy().to_string();
            if existing.contains(&path_str) {
                outcome.skipped_duplicates += 1;
                continue;
            }

            let parsed = metadata.get(&candidate.path);
            let record = build_record(catalog_id, candidate, parsed);
            record.insert(session.db())?;

            if candidate.media_kind == MediaKind::Image {
                if let Some(parsed) = parsed {
                    asset_metadata_from(record.id, parsed).upsert(session.db())?;
                }
                outcome.render_queue.push(record.id);
            }
            outcome.created.push(record.id);
            in_batch += 1;

            if in_batch >= IMPORT_COMMIT_BATCH {
                if cancel.is_cancelled() {
                    return Err(ImportError::Cancelled);
                }
                session.commit_batch()?;
                in_batch = 0;
                on_progress(
                    METADATA_PHASE_END
                        + (1.0 - METADATA_PHASE_END) * (index + 1) as f32 / total as f32,
                );
            }
        }

        // A cancel that lands after the last record still discards the open
        // sub-batch; everything committed so far stays.
        if cancel.is_cancelled() {
            return Err(ImportError::Cancelled);
        }
        session.commit()?;
        on_progress(1.0);
        info!(
            created = outcome.created.len(),
            duplicates = outcome.skipped_duplicates,
            "import finished"
        );
        Ok(outcome)
    }
}

fn build_record(
    catalog_id: CatalogId,
    candidate: &AssetPath,
    parsed: Option<&crate::metadata::ParsedMetadata>,
) -> AssetRecord {
    let now = Utc::now();
    let filename = candidate
        .path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| candidate.path.to_string_lossy().to_string());

    AssetRecord {
        id: AssetId::new(),
        catalog_id,
        original_path: candidate.path.to_string_lossy().to_string(),
        filename,
        filesize: candidate.size,
        media_kind: candidate.media_kind,
        width: parsed.and_then(|m| m.width),
        height: parsed.and_then(|m| m.height),
        orientation: parsed.and_then(|m| m.orientation),
        captured_at: parsed
            .and_then(|m| m.captured_at)
            .or(candidate.created_at),
        imported_at: now,
        modified_at: candidate.modified_at,
        rating: None,
        flags: AssetFlags::empty(),
        color_label: None,
        available: true,
        created_at: now,
        updated_at: now,
    }
}

fn asset_metadata_from(id: AssetId, parsed: &crate::metadata::ParsedMetadata) -> AssetMetadata {
    AssetMetadata {
        asset_id: id,
        camera_make: parsed.camera_make.clone(),
        camera_model: parsed.camera_model.clone(),
        lens_model: parsed.lens_model.clone(),
        focal_length: parsed.focal_length,
        aperture: parsed.aperture,
        shutter_speed: parsed.shutter_speed,
        iso: parsed.iso,
        gps_latitude: parsed.gps_latitude,
        gps_longitude: parsed.gps_longitude,
        gps_altitude: parsed.gps_altitude,
        title: parsed.title.clone(),
        caption: parsed.caption.clone(),
        raw_properties: parsed.raw_properties.clone(),
        updated_at: Utc::now(),
    }
}
