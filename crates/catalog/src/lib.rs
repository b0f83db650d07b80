pub mod db;
pub mod schema;
pub mod store;

use thiserror::Error;

pub use db::{AssetMetadata, AssetRecord, Catalog, CatalogDb};
pub use store::{CatalogStore, StoreSession};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog storage failure: {0}")]
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for CatalogError {
    fn from(err: anyhow::Error) -> Self {
        CatalogError::Internal(err)
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
