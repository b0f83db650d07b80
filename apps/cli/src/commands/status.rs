use anyhow::Result;
use catalog::AssetRecord;
use clap::Args;

use super::CliContext;

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Number of recent imports to show.
    #[arg(long, short = 'n', default_value = "10")]
    pub recent: usize,
}

pub fn execute(args: StatusArgs, ctx: &CliContext) -> Result<()> {
    let catalogs = ctx.store.list_catalogs()?;
    for cat in &catalogs {
        let count = ctx
            .store
            .with_db(|db| AssetRecord::count_for_catalog(db, cat.id))?;
        let marker = if cat.id == ctx.catalog.id { "*" } else { " " };
        println!("{marker} {} ({count} assets)", cat.name);
    }

    let recent = ctx
        .store
        .with_db(|db| AssetRecord::recently_imported(db, ctx.catalog.id, args.recent))?;
    if recent.is_empty() {
        return Ok(());
    }

    println!("\nRecent imports in '{}':", ctx.catalog.name);
    for record in recent {
        let kind = record.media_kind.as_str();
        let availability = if record.available { "" } else { " [missing]" };
        println!(
            "  {}  {kind:5}  {}{availability}",
            record.imported_at.format("%Y-%m-%d %H:%M"),
            record.filename
        );
    }
    Ok(())
}
