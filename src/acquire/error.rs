use crate::catalogue::error::CatalogueError;
use crate::store::error::StoreError;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error(transparent)]
    Catalogue(#[from] CatalogueError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
}
