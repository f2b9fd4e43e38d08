use crate::acquire::error::AcquireError;
use crate::catalogue::error::CatalogueError;
use crate::fetch::error::FetchError;
use crate::store::error::StoreError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum BmrsError {
    #[error(transparent)]
    Acquire(#[from] AcquireError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Catalogue(#[from] CatalogueError),

    #[error("Failed to resolve a data directory for the cache")]
    DataDirResolution(#[source] std::io::Error),

    #[error("Failed to create data directory at {0}")]
    DataDirCreation(PathBuf, #[source] std::io::Error),
}
