use core_types::CatalogId;
use thiserror::Error;

/// Failure modes an import run can end with. Anything already committed in
/// earlier sub-batches stays committed regardless of the outcome.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("catalog {0} not found")]
    NotFound(CatalogId),

    #[error("import was cancelled")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] catalog::CatalogError),
}

// Record-level helpers return bare `anyhow` errors; route them through the
// store variant so `?` works across both layers.
impl From<anyhow::Error> for ImportError {
    fn from(err: anyhow::Error) -> Self {
        Self::Store(catalog::CatalogError::from(err))
    }
}
