use polars::error::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to create data directory '{0}'")]
    DirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to stage artifact write next to '{0}'")]
    TempFile(PathBuf, #[source] std::io::Error),

    #[error("Failed to replace artifact file '{0}'")]
    Replace(PathBuf, #[source] std::io::Error),

    #[error("Encoding error writing parquet file '{0}'")]
    ParquetWrite(PathBuf, #[source] PolarsError),

    #[error("Failed to scan parquet file '{0}'")]
    ParquetScan(PathBuf, #[source] PolarsError),

    #[error("Failed to collect parquet file '{0}'")]
    ParquetCollect(PathBuf, #[source] PolarsError),

    #[error("Failed to write empty marker '{0}'")]
    EmptyMarkerWrite(PathBuf, #[source] std::io::Error),

    #[error("Failed to remove stale artifact '{0}'")]
    StaleArtifactRemoval(PathBuf, #[source] std::io::Error),

    #[error("Failed to list artifact directory '{0}'")]
    ArtifactListing(PathBuf, #[source] std::io::Error),

    #[error("Failed processing DataFrame: {0}")]
    DataFrameProcessing(#[from] PolarsError),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}
