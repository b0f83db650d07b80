use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use catalog::AssetRecord;
use clap::Args;
use core_types::RenditionKind;
use pipeline::{ExifMetadataReader, ImageRenderer, RenderQueue};

use super::CliContext;

#[derive(Debug, Args)]
pub struct RenderArgs {
    /// Regenerate renditions even when they already exist.
    #[arg(long)]
    pub force: bool,

    /// Give up waiting after this many seconds.
    #[arg(long, default_value = "600")]
    pub timeout: u64,
}

pub fn execute(args: RenderArgs, ctx: &CliContext) -> Result<()> {
    let ids = ctx
        .store
        .with_db(|db| AssetRecord::image_ids_for_catalog(db, ctx.catalog.id))?;

    let missing: Vec<_> = ids
        .into_iter()
        .filter(|id| args.force || !ctx.cache.contains(*id, RenditionKind::Thumbnail))
        .collect();

    if missing.is_empty() {
        println!("All renditions are up to date");
        return Ok(());
    }

    let queue = RenderQueue::new(
        ctx.store.clone(),
        Arc::clone(&ctx.cache),
        Arc::new(ImageRenderer),
        Arc::new(ExifMetadataReader),
    );
    let count = missing.len();
    queue.enqueue(missing);
    println!("Rendering {count} assets...");

    if !queue.wait_until_idle(Duration::from_secs(args.timeout)) {
        bail!("rendition generation did not finish within {}s", args.timeout);
    }

    let status = queue.status();
    if status.failed > 0 {
        println!("Done, {} renditions failed", status.failed);
    } else {
        println!("Done");
    }
    Ok(())
}
