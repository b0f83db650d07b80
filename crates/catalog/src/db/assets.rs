use crate::db::{
    parse_datetime, parse_datetime_opt, query_all, query_optional, to_rfc3339, to_rfc3339_opt,
    to_uuid, DbHandle, DbResult,
};
use anyhow::Context;
use chrono::{DateTime, Utc};
use core_types::{AssetFlags, AssetId, CatalogId, MediaKind};
use rusqlite::params;
use serde::{Deserialize, Serialize};

const ASSET_COLUMNS: &str = "id, catalog_id, original_path, filename, filesize, media_kind, \
     width, height, orientation, captured_at, imported_at, modified_at, \
     rating, flags, color_label, available, created_at, updated_at";

/// The persisted representation of one imported asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: AssetId,
    pub catalog_id: CatalogId,
    pub original_path: String,
    pub filename: String,
    pub filesize: i64,
    pub media_kind: MediaKind,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub orientation: Option<i64>,
    pub captured_at: Option<DateTime<Utc>>,
    pub imported_at: DateTime<Utc>,
    pub modified_at: Option<DateTime<Utc>>,
    pub rating: Option<i64>,
    pub flags: AssetFlags,
    pub color_label: Option<String>,
    pub available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AssetRecord {
    pub fn insert<H: DbHandle>(&self, db: &H) -> DbResult<()> {
        db.execute(
            "INSERT INTO assets (
                id, catalog_id, original_path, filename, filesize, media_kind,
                width, height, orientation, captured_at, imported_at, modified_at,
                rating, flags, color_label, available, created_at, updated_at
             ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10, ?11, ?12,
                ?13, ?14, ?15, ?16, ?17, ?18
             )",
            params![
                self.id.to_string(),
                self.catalog_id.to_string(),
                self.original_path,
                self.filename,
                self.filesize,
                self.media_kind.as_str(),
                self.width,
                self.height,
                self.orientation,
                to_rfc3339_opt(self.captured_at),
                to_rfc3339(self.imported_at),
                to_rfc3339_opt(self.modified_at),
                self.rating,
                self.flags.bits() as i64,
                self.color_label,
                self.available,
                to_rfc3339(self.created_at),
                to_rfc3339(self.updated_at)
            ],
        )
        .with_context(|| format!("failed to insert asset path={}", self.original_path))?;
        Ok(())
    }

    pub fn load<H: DbHandle>(db: &H, id: AssetId) -> DbResult<Option<Self>> {
        query_optional(
            db,
            &format!("SELECT {ASSET_COLUMNS} FROM assets WHERE id = ?1"),
            params![id.to_string()],
            AssetRecord::from_row,
        )
        .with_context(|| format!("failed to load asset id={id}"))
    }

    /// The batched existence query backing import dedup: every original path
    /// already present in the catalog, in one round trip.
    pub fn list_paths_for_catalog<H: DbHandle>(db: &H, catalog: CatalogId) -> DbResult<Vec<String>> {
        query_all(
            db,
            "SELECT original_path FROM assets WHERE catalog_id = ?1",
            params![catalog.to_string()],
            |row| Ok(row.get::<_, String>(0)?),
        )
        .with_context(|| format!("failed to list asset paths for catalog {catalog}"))
    }

    pub fn list_for_catalog<H: DbHandle>(db: &H, catalog: CatalogId) -> DbResult<Vec<Self>> {
        query_all(
            db,
            &format!(
                "SELECT {ASSET_COLUMNS} FROM assets
                 WHERE catalog_id = ?1
                 ORDER BY captured_at IS NULL, captured_at, original_path"
            ),
            params![catalog.to_string()],
            AssetRecord::from_row,
        )
        .with_context(|| format!("failed to list assets for catalog {catalog}"))
    }

    pub fn ids_for_catalog<H: DbHandle>(db: &H, catalog: CatalogId) -> DbResult<Vec<AssetId>> {
        query_all(
            db,
            "SELECT id FROM assets WHERE catalog_id = ?1",
            params![catalog.to_string()],
            |row| Ok(AssetId(to_uuid(row.get::<_, String>(0)?, "assets.id")?)),
        )
        .with_context(|| format!("failed to list asset ids for catalog {catalog}"))
    }

    pub fn image_ids_for_catalog<H: DbHandle>(db: &H, catalog: CatalogId) -> DbResult<Vec<AssetId>> {
        query_all(
            db,
            "SELECT id FROM assets WHERE catalog_id = ?1 AND media_kind = 'image'
             ORDER BY imported_at, original_path",
            params![catalog.to_string()],
            |row| Ok(AssetId(to_uuid(row.get::<_, String>(0)?, "assets.id")?)),
        )
        .with_context(|| format!("failed to list image asset ids for catalog {catalog}"))
    }

    pub fn recently_imported<H: DbHandle>(
        db: &H,
        catalog: CatalogId,
        limit: usize,
    ) -> DbResult<Vec<Self>> {
        query_all(
            db,
            &format!(
                "SELECT {ASSET_COLUMNS} FROM assets
                 WHERE catalog_id = ?1
                 ORDER BY imported_at DESC
                 LIMIT ?2"
            ),
            params![catalog.to_string(), limit as i64],
            AssetRecord::from_row,
        )
        .context("failed to list recently imported assets")
    }

    pub fn count_for_catalog<H: DbHandle>(db: &H, catalog: CatalogId) -> DbResult<i64> {
        crate::db::query_one(
            db,
            "SELECT COUNT(*) FROM assets WHERE catalog_id = ?1",
            params![catalog.to_string()],
            |row| Ok(row.get::<_, i64>(0)?),
        )
        .context("failed to count assets")
    }

    pub fn set_available<H: DbHandle>(db: &H, id: AssetId, available: bool) -> DbResult<()> {
        db.execute(
            "UPDATE assets SET available = ?1, updated_at = ?2 WHERE id = ?3",
            params![available, to_rfc3339(Utc::now()), id.to_string()],
        )
        .with_context(|| format!("failed to update availability for asset {id}"))?;
        Ok(())
    }

    /// Back-fills what the render step discovered: pixel dimensions always,
    /// orientation when discovered, capture date only when still unknown.
    pub fn apply_render_info<H: DbHandle>(
        db: &H,
        id: AssetId,
        width: i64,
        height: i64,
        orientation: Option<i64>,
        captured_at: Option<DateTime<Utc>>,
    ) -> DbResult<()> {
        db.execute(
            "UPDATE assets SET
                width = ?1,
                height = ?2,
                orientation = COALESCE(?3, orientation),
                captured_at = COALESCE(captured_at, ?4),
                updated_at = ?5
             WHERE id = ?6",
            params![
                width,
                height,
                orientation,
                to_rfc3339_opt(captured_at),
                to_rfc3339(Utc::now()),
                id.to_string()
            ],
        )
        .with_context(|| format!("failed to apply render info for asset {id}"))?;
        Ok(())
    }

    pub fn delete<H: DbHandle>(db: &H, id: AssetId) -> DbResult<()> {
        db.execute("DELETE FROM assets WHERE id = ?1", params![id.to_string()])
            .with_context(|| format!("failed to delete asset id={id}"))?;
        Ok(())
    }

    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> DbResult<Self> {
        let kind_raw: String = row.get(5)?;
        let media_kind = MediaKind::parse(&kind_raw)
            .with_context(|| format!("unknown media_kind value: {kind_raw}"))?;
        Ok(Self {
            id: AssetId(to_uuid(row.get::<_, String>(0)?, "assets.id")?),
            catalog_id: CatalogId(to_uuid(row.get::<_, String>(1)?, "assets.catalog_id")?),
            original_path: row.get(2)?,
            filename: row.get(3)?,
            filesize: row.get(4)?,
            media_kind,
            width: row.get(6)?,
            height: row.get(7)?,
            orientation: row.get(8)?,
            captured_at: parse_datetime_opt(row.get::<_, Option<String>>(9)?, "captured_at")?,
            imported_at: parse_datetime(row.get::<_, String>(10)?, "imported_at")?,
            modified_at: parse_datetime_opt(row.get::<_, Option<String>>(11)?, "modified_at")?,
            rating: row.get(12)?,
            flags: AssetFlags::from_bits_truncate(row.get::<_, i64>(13)? as u8),
            color_label: row.get(14)?,
            available: row.get(15)?,
            created_at: parse_datetime(row.get::<_, String>(16)?, "created_at")?,
            updated_at: parse_datetime(row.get::<_, String>(17)?, "updated_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Catalog, CatalogDb};

    fn db_with_catalog() -> (CatalogDb, CatalogId) {
        let db = CatalogDb::in_memory().unwrap();
        let now = Utc::now();
        let catalog = Catalog {
            id: CatalogId::new(),
            name: "Test".into(),
            created_at: now,
            updated_at: now,
        };
        catalog.insert(&db).unwrap();
        (db, catalog.id)
    }

    fn sample_asset(catalog_id: CatalogId, path: &str) -> AssetRecord {
        let now = Utc::now();
        AssetRecord {
            id: AssetId::new(),
            catalog_id,
            original_path: path.into(),
            filename: path.rsplit('/').next().unwrap().into(),
            filesize: 1024,
            media_kind: MediaKind::Image,
            width: None,
            height: None,
            orientation: None,
            captured_at: None,
            imported_at: now,
            modified_at: None,
            rating: None,
            flags: AssetFlags::empty(),
            color_label: None,
            available: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn insert_and_load_round_trip() {
        let (db, catalog_id) = db_with_catalog();
        let asset = sample_asset(catalog_id, "/photos/2024/img0001.cr2");
        asset.insert(&db).unwrap();

        let loaded = AssetRecord::load(&db, asset.id).unwrap().expect("present");
        assert_eq!(loaded.original_path, "/photos/2024/img0001.cr2");
        assert_eq!(loaded.filename, "img0001.cr2");
        assert_eq!(loaded.media_kind, MediaKind::Image);
        assert!(loaded.available);

        assert!(AssetRecord::load(&db, AssetId::new()).unwrap().is_none());
    }

    #[test]
    fn batched_path_listing_covers_whole_catalog() {
        let (db, catalog_id) = db_with_catalog();
        sample_asset(catalog_id, "/a.jpg").insert(&db).unwrap();
        sample_asset(catalog_id, "/b.jpg").insert(&db).unwrap();

        let mut paths = AssetRecord::list_paths_for_catalog(&db, catalog_id).unwrap();
        paths.sort();
        assert_eq!(paths, vec!["/a.jpg".to_string(), "/b.jpg".to_string()]);
    }

    #[test]
    fn delete_cascades_to_the_metadata_sub_record() {
        let (db, catalog_id) = db_with_catalog();
        let asset = sample_asset(catalog_id, "/d.jpg");
        asset.insert(&db).unwrap();
        crate::db::AssetMetadata {
            asset_id: asset.id,
            camera_make: Some("ACME".into()),
            camera_model: None,
            lens_model: None,
            focal_length: None,
            aperture: None,
            shutter_speed: None,
            iso: None,
            gps_latitude: None,
            gps_longitude: None,
            gps_altitude: None,
            title: None,
            caption: None,
            raw_properties: None,
            updated_at: Utc::now(),
        }
        .upsert(&db)
        .unwrap();

        AssetRecord::delete(&db, asset.id).unwrap();
        assert!(AssetRecord::load(&db, asset.id).unwrap().is_none());
        assert!(crate::db::AssetMetadata::load(&db, asset.id)
            .unwrap()
            .is_none());
    }

    #[test]
    fn render_info_backfills_without_clobbering_capture_date() {
        let (db, catalog_id) = db_with_catalog();
        let mut asset = sample_asset(catalog_id, "/c.jpg");
        let taken = Utc::now();
        asset.captured_at = Some(taken);
        asset.insert(&db).unwrap();

        AssetRecord::apply_render_info(&db, asset.id, 640, 480, Some(6), None).unwrap();
        let loaded = AssetRecord::load(&db, asset.id).unwrap().unwrap();
        assert_eq!(loaded.width, Some(640));
        assert_eq!(loaded.height, Some(480));
        assert_eq!(loaded.orientation, Some(6));
        // COALESCE keeps the original capture date.
        assert_eq!(
            loaded.captured_at.map(|t| t.timestamp_millis()),
            Some(taken.timestamp_millis())
        );
    }
}
