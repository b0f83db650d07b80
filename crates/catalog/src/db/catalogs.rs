use crate::db::{
    parse_datetime, query_all, query_optional, to_rfc3339, to_uuid, DbHandle, DbResult,
};
use anyhow::Context;
use chrono::{DateTime, Utc};
use core_types::CatalogId;
use rusqlite::params;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub id: CatalogId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Catalog {
    pub fn insert<H: DbHandle>(&self, db: &H) -> DbResult<()> {
        db.execute(
            "INSERT INTO catalogs (id, name, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                self.id.to_string(),
                self.name,
                to_rfc3339(self.created_at),
                to_rfc3339(self.updated_at)
            ],
        )
        .with_context(|| format!("failed to insert catalog name={}", self.name))?;
        Ok(())
    }

    pub fn load<H: DbHandle>(db: &H, id: CatalogId) -> DbResult<Option<Self>> {
        query_optional(
            db,
            "SELECT id, name, created_at, updated_at FROM catalogs WHERE id = ?1",
            params![id.to_string()],
            Catalog::from_row,
        )
        .with_context(|| format!("failed to load catalog id={id}"))
    }

    pub fn find_by_name<H: DbHandle>(db: &H, name: &str) -> DbResult<Option<Self>> {
        query_optional(
            db,
            "SELECT id, name, created_at, updated_at FROM catalogs WHERE name = ?1",
            params![name],
            Catalog::from_row,
        )
        .with_context(|| format!("failed to find catalog name={name}"))
    }

    pub fn load_all<H: DbHandle>(db: &H) -> DbResult<Vec<Self>> {
        query_all(
            db,
            "SELECT id, name, created_at, updated_at FROM catalogs ORDER BY name",
            [],
            Catalog::from_row,
        )
    }

    pub fn delete<H: DbHandle>(db: &H, id: CatalogId) -> DbResult<()> {
        db.execute(
            "DELETE FROM catalogs WHERE id = ?1",
            params![id.to_string()],
        )
        .with_context(|| format!("failed to delete catalog id={id}"))?;
        Ok(())
    }

    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> DbResult<Self> {
        Ok(Self {
            id: CatalogId(to_uuid(row.get::<_, String>(0)?, "catalogs.id")?),
            name: row.get(1)?,
            created_at: parse_datetime(row.get::<_, String>(2)?, "created_at")?,
            updated_at: parse_datetime(row.get::<_, String>(3)?, "updated_at")?,
        })
    }
}
