mod acquire;
mod bmrs;
mod catalogue;
mod error;
mod fetch;
mod store;
mod utils;

pub use bmrs::*;
pub use error::BmrsError;

pub use acquire::error::AcquireError;
pub use acquire::orchestrator::{AcquireOutcome, AcquireReport};

pub use catalogue::error::CatalogueError;
pub use catalogue::record::{Catalogue, DateStatus};

pub use fetch::client::{DayFetcher, FetchClient, FetchConfig, DEFAULT_BASE_URL};
pub use fetch::error::FetchError;
pub use fetch::observation::{FetchOutcome, ObservationRow, RawObservation};

pub use store::artifact_store::Store;
pub use store::error::StoreError;
pub use store::resample::{
    settlement_period_start, PERIODS_PER_DAY, SETTLEMENT_PERIOD_MINUTES,
};
