use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use catalog::AssetRecord;
use clap::Args;
use core_types::AssetId;

use super::CliContext;

#[derive(Debug, Args)]
pub struct PurgeArgs {
    /// Only report what would be removed.
    #[arg(long)]
    pub dry_run: bool,

    /// Delete records whose source file is gone instead of marking them
    /// unavailable. Their renditions are removed as well.
    #[arg(long)]
    pub remove_missing: bool,
}

pub fn execute(args: PurgeArgs, ctx: &CliContext) -> Result<()> {
    let records = ctx
        .store
        .with_db(|db| AssetRecord::list_for_catalog(db, ctx.catalog.id))?;

    let (present, missing): (Vec<_>, Vec<_>) = records
        .into_iter()
        .partition(|r| Path::new(&r.original_path).exists());

    if args.dry_run {
        println!(
            "{} assets in '{}' ({} missing on disk); orphan sweep skipped (dry run)",
            present.len() + missing.len(),
            ctx.catalog.name,
            missing.len()
        );
        return Ok(());
    }

    if args.remove_missing {
        let session = ctx.store.session()?;
        for record in &missing {
            AssetRecord::delete(session.db(), record.id)?;
        }
        session.commit()?;
        for record in &missing {
            ctx.cache.remove(record.id)?;
        }
        println!("Removed {} assets with missing source files", missing.len());
    } else {
        // Availability refresh: flag records whose source file is gone so
        // the library view can grey them out.
        let mut changed = 0;
        for record in missing.iter().filter(|r| r.available) {
            ctx.store
                .with_db(|db| AssetRecord::set_available(db, record.id, false))?;
            changed += 1;
        }
        for record in present.iter().filter(|r| !r.available) {
            ctx.store
                .with_db(|db| AssetRecord::set_available(db, record.id, true))?;
            changed += 1;
        }
        println!("Updated availability for {changed} assets");
    }

    let valid: HashSet<AssetId> = if args.remove_missing {
        present.iter().map(|r| r.id).collect()
    } else {
        present.iter().chain(missing.iter()).map(|r| r.id).collect()
    };
    let removed = ctx.cache.purge_orphans(&valid)?;
    println!("Removed {removed} orphaned rendition files");
    Ok(())
}
