use anyhow::Result;
use catalog::{AssetRecord, Catalog};
use clap::Args;

use super::CliContext;

/// Deletes the selected catalog and every asset in it. Asset rows go with
/// the catalog via cascade; renditions are swept from the cache afterwards.
#[derive(Debug, Args)]
pub struct RemoveCatalogArgs {}

pub fn execute(_args: RemoveCatalogArgs, ctx: &CliContext) -> Result<()> {
    let session = ctx.store.session()?;
    let ids = AssetRecord::ids_for_catalog(session.db(), ctx.catalog.id)?;
    Catalog::delete(session.db(), ctx.catalog.id)?;
    session.commit()?;

    for id in &ids {
        ctx.cache.remove(*id)?;
    }
    println!(
        "Removed catalog '{}' ({} assets)",
        ctx.catalog.name,
        ids.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::{AssetFlags, AssetId, MediaKind};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn removes_the_catalog_and_its_assets() {
        let dir = tempdir().unwrap();
        let store = catalog::CatalogStore::open(&dir.path().join("catalog.db")).unwrap();
        let catalog = store.create_catalog("Doomed").unwrap();
        let cache = Arc::new(render_cache::RenditionCache::new(
            dir.path().join("renditions"),
            render_cache::CacheLimits::default(),
        ));

        let now = Utc::now();
        let record = AssetRecord {
            id: AssetId::new(),
            catalog_id: catalog.id,
            original_path: "/shoot/one.jpg".into(),
            filename: "one.jpg".into(),
            filesize: 1,
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
        };
        store.with_db(|db| record.insert(db)).unwrap();

        let ctx = CliContext {
            store: store.clone(),
            catalog: catalog.clone(),
            cache,
        };
        execute(RemoveCatalogArgs {}, &ctx).unwrap();

        assert!(store.find_catalog(catalog.id).unwrap().is_none());
        // The asset rows went with the catalog.
        assert!(store
            .with_db(|db| AssetRecord::load(db, record.id))
            .unwrap()
            .is_none());
    }
}
