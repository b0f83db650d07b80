use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use app_settings::SettingsStore;
use catalog::{Catalog, CatalogStore};
use clap::{Parser, Subcommand};
use render_cache::{CacheLimits, RenditionCache};

pub mod import;
pub mod purge;
pub mod remove_catalog;
pub mod render;
pub mod status;

/// Lumina catalog and rendition tooling.
#[derive(Debug, Parser)]
#[command(name = "lumina")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the catalog database file. Falls back to the last catalog
    /// recorded in the application settings.
    #[arg(long, env = "LUMINA_CATALOG", global = true)]
    pub catalog_path: Option<PathBuf>,

    /// Catalog name inside the database file.
    #[arg(long, default_value = "Library", global = true)]
    pub catalog: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan folders and add their media files to the catalog.
    Import(import::ImportArgs),
    /// Generate missing thumbnails and previews.
    Render(render::RenderArgs),
    /// Remove orphaned renditions and refresh file availability.
    Purge(purge::PurgeArgs),
    /// Show catalog contents and recent imports.
    Status(status::StatusArgs),
    /// Delete the selected catalog, its assets, and their renditions.
    RemoveCatalog(remove_catalog::RemoveCatalogArgs),
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let ctx = CliContext::resolve(&self)?;
        match self.command {
            Commands::Import(args) => import::execute(args, &ctx),
            Commands::Render(args) => render::execute(args, &ctx),
            Commands::Purge(args) => purge::execute(args, &ctx),
            Commands::Status(args) => status::execute(args, &ctx),
            Commands::RemoveCatalog(args) => remove_catalog::execute(args, &ctx),
        }
    }
}

/// Everything the subcommands share: the opened store, the catalog row,
/// and the rendition cache rooted next to the catalog file.
pub struct CliContext {
    pub store: CatalogStore,
    pub catalog: Catalog,
    pub cache: Arc<RenditionCache>,
}

impl CliContext {
    fn resolve(cli: &Cli) -> Result<Self> {
        let settings = SettingsStore::load().context("failed to load application settings")?;
        let catalog_path = match cli.catalog_path.clone().or_else(|| settings.active_catalog()) {
            Some(path) => path,
            None => bail!("no catalog selected; pass --catalog-path or set LUMINA_CATALOG"),
        };

        let store = CatalogStore::open(&catalog_path)
            .with_context(|| format!("failed to open catalog at {}", catalog_path.display()))?;
        let catalog = store.open_or_create_catalog(&cli.catalog)?;

        settings
            .record_catalog(&catalog_path)
            .context("failed to record catalog in settings")?;

        let cache_dir = settings
            .cache_dir()
            .unwrap_or_else(|| renditions_dir_for(&catalog_path));
        let cache = Arc::new(RenditionCache::new(cache_dir, CacheLimits::default()));

        Ok(Self {
            store,
            catalog,
            cache,
        })
    }
}

fn renditions_dir_for(catalog_path: &std::path::Path) -> PathBuf {
    let mut name = catalog_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "catalog".to_string());
    name.push_str(".renditions");
    catalog_path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renditions_dir_sits_next_to_the_catalog() {
        let dir = renditions_dir_for(std::path::Path::new("/library/main.lumina"));
        assert_eq!(dir, PathBuf::from("/library/main.lumina.renditions"));
    }
}
