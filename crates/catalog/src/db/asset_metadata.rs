use crate::db::{
    from_json, parse_datetime, query_optional, to_json, to_rfc3339, to_uuid, DbHandle, DbResult,
};
use anyhow::Context;
use chrono::{DateTime, Utc};
use core_types::AssetId;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Optional one-to-one metadata sub-record. Image assets get one when
/// embedded metadata was readable; video assets never do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetMetadata {
    pub asset_id: AssetId,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub lens_model: Option<String>,
    pub focal_length: Option<f64>,
    pub aperture: Option<f64>,
    pub shutter_speed: Option<f64>,
    pub iso: Option<i64>,
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,
    pub gps_altitude: Option<f64>,
    pub title: Option<String>,
    pub caption: Option<String>,
    pub raw_properties: Option<Value>,
    pub updated_at: DateTime<Utc>,
}

impl AssetMetadata {
    pub fn upsert<H: DbHandle>(&self, db: &H) -> DbResult<()> {
        let raw_properties_json = self.raw_properties.as_ref().map(to_json).transpose()?;
        db.execute(
            "INSERT INTO asset_metadata (
                asset_id, camera_make, camera_model, lens_model, focal_length,
                aperture, shutter_speed, iso, gps_latitude, gps_longitude,
                gps_altitude, title, caption, raw_properties_json, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(asset_id) DO UPDATE SET
                camera_make = excluded.camera_make,
                camera_model = excluded.camera_model,
                lens_model = excluded.lens_model,
                focal_length = excluded.focal_length,
                aperture = excluded.aperture,
                shutter_speed = excluded.shutter_speed,
                iso = excluded.iso,
                gps_latitude = excluded.gps_latitude,
                gps_longitude = excluded.gps_longitude,
                gps_altitude = excluded.gps_altitude,
                title = excluded.title,
                caption = excluded.caption,
                raw_properties_json = excluded.raw_properties_json,
                updated_at = excluded.updated_at",
            params![
                self.asset_id.to_string(),
                self.camera_make,
                self.camera_model,
                self.lens_model,
                self.focal_length,
                self.aperture,
                self.shutter_speed,
                self.iso,
                self.gps_latitude,
                self.gps_longitude,
                self.gps_altitude,
                self.title,
                self.caption,
                raw_properties_json,
                to_rfc3339(self.updated_at)
            ],
        )
        .with_context(|| format!("failed to upsert metadata for asset {}", self.asset_id))?;
        Ok(())
    }

    pub fn load<H: DbHandle>(db: &H, asset_id: AssetId) -> DbResult<Option<Self>> {
        query_optional(
            db,
            "SELECT asset_id, camera_make, camera_model, lens_model, focal_length,
                    aperture, shutter_speed, iso, gps_latitude, gps_longitude,
                    gps_altitude, title, caption, raw_properties_json, updated_at
             FROM asset_metadata WHERE asset_id = ?1",
            params![asset_id.to_string()],
            AssetMetadata::from_row,
        )
        .with_context(|| format!("failed to load metadata for asset {asset_id}"))
    }

    fn from_row(row: &rusqlite::Row<'_>) -> DbResult<Self> {
        Ok(Self {
            asset_id: AssetId(to_uuid(row.get::<_, String>(0)?, "asset_metadata.asset_id")?),
            camera_make: row.get(1)?,
            camera_model: row.get(2)?,
            lens_model: row.get(3)?,
            focal_length: row.get(4)?,
            aperture: row.get(5)?,
            shutter_speed: row.get(6)?,
            iso: row.get(7)?,
            gps_latitude: row.get(8)?,
            gps_longitude: row.get(9)?,
            gps_altitude: row.get(10)?,
            title: row.get(11)?,
            caption: row.get(12)?,
            raw_properties: {
                let raw: Option<String> = row.get(13)?;
                match raw {
                    Some(json) => Some(from_json(&json)?),
                    None => None,
                }
            },
            updated_at: parse_datetime(row.get::<_, String>(14)?, "updated_at")?,
        })
    }
}
