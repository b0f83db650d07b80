use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Args;
use pipeline::{
    CancellationFlag, ExifMetadataReader, ImageRenderer, Importer, RenderQueue,
};

use super::CliContext;

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Files or directories to import.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Skip rendition generation after the import.
    #[arg(long)]
    pub no_render: bool,

    /// Give up waiting for renditions after this many seconds.
    #[arg(long, default_value = "600")]
    pub render_timeout: u64,
}

pub fn execute(args: ImportArgs, ctx: &CliContext) -> Result<()> {
    let reader = ExifMetadataReader;
    let importer = Importer::new(ctx.store.clone(), &reader);

    let mut last_percent = -1;
    let outcome = importer.import_assets(
        &args.inputs,
        ctx.catalog.id,
        &CancellationFlag::default(),
        |progress| {
            let percent = (progress * 100.0) as i32;
            if percent > last_percent {
                last_percent = percent;
                eprint!("\rImporting... {percent}%");
            }
        },
    )?;
    eprintln!();

    println!(
        "Imported {} assets into '{}' ({} duplicates skipped)",
        outcome.created.len(),
        ctx.catalog.name,
        outcome.skipped_duplicates
    );

    if args.no_render || outcome.render_queue.is_empty() {
        return Ok(());
    }

    let queue = RenderQueue::new(
        ctx.store.clone(),
        Arc::clone(&ctx.cache),
        Arc::new(ImageRenderer),
        Arc::new(ExifMetadataReader),
    );
    let count = outcome.render_queue.len();
    queue.enqueue(outcome.render_queue);
    println!("Rendering {count} assets...");

    if !queue.wait_until_idle(Duration::from_secs(args.render_timeout)) {
        bail!("rendition generation did not finish within {}s", args.render_timeout);
    }

    let status = queue.status();
    if status.failed > 0 {
        println!("Done, {} renditions failed", status.failed);
    } else {
        println!("Done");
    }
    Ok(())
}
