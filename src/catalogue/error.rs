use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogueError {
    #[error("Failed to read catalogue file '{0}'")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse catalogue file '{0}'")]
    Parse(PathBuf, #[source] serde_json::Error),

    #[error("Failed to serialize catalogue")]
    Serialize(#[source] serde_json::Error),

    #[error("Catalogue path '{0}' has no parent directory")]
    NoParentDir(PathBuf),

    #[error("Failed to stage catalogue write next to '{0}'")]
    TempFile(PathBuf, #[source] std::io::Error),

    #[error("Failed to replace catalogue file '{0}'")]
    Replace(PathBuf, #[source] std::io::Error),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}
