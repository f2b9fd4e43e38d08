//! This module provides the main entry point for fetching per-unit generation
//! data from the BMRS B1610 reporting endpoint. It wires the HTTP fetch client,
//! the on-disk artifact store, and the acquisition orchestrator together behind
//! a single client struct.

use crate::acquire::orchestrator::{AcquireOutcome, AcquireSettings, Orchestrator};
use crate::error::BmrsError;
use crate::fetch::client::{FetchClient, FetchConfig, DEFAULT_TIMEOUT};
use crate::store::artifact_store::Store;
use crate::utils::{ensure_dir_exists, get_data_dir};
use bon::bon;
use chrono::NaiveDate;
use polars::prelude::LazyFrame;
use std::path::PathBuf;
use std::time::Duration;

/// Default number of dates resolved between catalogue checkpoints.
pub const DEFAULT_CHUNK_SIZE: usize = 32;
/// Default number of concurrent in-flight requests.
pub const DEFAULT_WORKERS: usize = 4;
/// Default number of days a date stays eligible for retry after a failed
/// or empty attempt.
pub const DEFAULT_STALENESS_DAYS: i64 = 14;

/// The main client struct for acquiring BM unit generation data.
///
/// This struct downloads per-settlement-date generation volumes (`LazyFrame`s
/// from Polars) for individual BM units and caches them on disk, so repeated
/// requests over the same date range only touch the network for dates that
/// have not yet been resolved.
///
/// Create an instance using [`Bmrs::builder()`]; only the API key is required.
///
/// # Examples
///
/// ```rust
/// # use bmrs::{Bmrs, BmrsError};
/// # async fn run() -> Result<(), BmrsError> {
/// // Create a client using the default data directory
/// let client = Bmrs::builder().api_key("my-key".to_string()).build().await?;
/// // Now you can use the client to acquire generation data
/// # Ok(())
/// # }
/// ```
pub struct Bmrs {
    fetcher: FetchClient,
    store: Store,
    settings: AcquireSettings,
}

#[bon]
impl Bmrs {
    /// Creates a new `Bmrs` client instance.
    ///
    /// This method uses a builder pattern.
    ///
    /// # Arguments
    ///
    /// * `.api_key(String)`: **Required.** The Elexon API key sent with every request.
    /// * `.data_folder(PathBuf)`: Optional. Directory for downloaded artifacts and
    ///   catalogues. Defaults to a `bmrs_cache` folder inside the system cache
    ///   directory (e.g. `~/.cache/bmrs_cache` on Linux). Created if absent.
    /// * `.base_url(String)`: Optional. Overrides the B1610 endpoint, mainly for testing.
    /// * `.timeout(Duration)`: Optional. Per-request timeout. Defaults to 30 seconds.
    /// * `.chunk_size(usize)`: Optional. Dates resolved between catalogue checkpoints.
    ///   Defaults to `32`.
    /// * `.workers(usize)`: Optional. Concurrent in-flight requests. Defaults to `4`.
    /// * `.staleness_days(i64)`: Optional. How many days a failed or empty date stays
    ///   eligible for retry. Defaults to `14`.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Bmrs` client on success, or a [`BmrsError`]
    /// if the data directory cannot be resolved or created, or if the HTTP
    /// client cannot be built.
    ///
    /// # Errors
    ///
    /// Returns [`BmrsError::DataDirResolution`] if no data folder was given and the
    /// system cache directory cannot be found.
    /// Returns [`BmrsError::DataDirCreation`] if the data directory cannot be created.
    /// Returns [`BmrsError::Fetch`] if the underlying HTTP client fails to build.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use bmrs::{Bmrs, BmrsError};
    /// # use std::path::PathBuf;
    /// # async fn run() -> Result<(), BmrsError> {
    /// let client = Bmrs::builder()
    ///     .api_key("my-key".to_string())
    ///     .data_folder(PathBuf::from("/tmp/bmrs_data"))
    ///     .workers(8)
    ///     .build()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub async fn new(
        api_key: String,
        data_folder: Option<PathBuf>,
        base_url: Option<String>,
        timeout: Option<Duration>,
        chunk_size: Option<usize>,
        workers: Option<usize>,
        staleness_days: Option<i64>,
    ) -> Result<Self, BmrsError> {
        let data_folder = match data_folder {
            Some(folder) => folder,
            None => get_data_dir().map_err(BmrsError::DataDirResolution)?,
        };
        ensure_dir_exists(&data_folder)
            .await
            .map_err(|e| BmrsError::DataDirCreation(data_folder.clone(), e))?;

        let mut config = FetchConfig::new(api_key);
        if let Some(base_url) = base_url {
            config.base_url = base_url;
        }
        config.timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);

        Ok(Self {
            fetcher: FetchClient::new(config).map_err(BmrsError::Fetch)?,
            store: Store::new(&data_folder),
            settings: AcquireSettings {
                chunk_size: chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE).max(1),
                workers: workers.unwrap_or(DEFAULT_WORKERS).max(1),
                staleness: chrono::Duration::days(
                    staleness_days.unwrap_or(DEFAULT_STALENESS_DAYS),
                ),
            },
        })
    }

    /// Acquires generation data for one BM unit over an inclusive date range.
    ///
    /// Dates already resolved (or known to be empty) in a previous run are
    /// skipped; only missing dates are fetched from the remote. Every fetched
    /// date is written to disk and recorded in the unit's catalogue before the
    /// consolidated series is rebuilt, so an interrupted run resumes where it
    /// left off.
    ///
    /// This method uses a builder pattern.
    ///
    /// # Arguments
    ///
    /// * `.unit(&str)`: **Required.** The NGC BM unit identifier (e.g. `"T_DRAXX-1"`).
    /// * `.start(NaiveDate)`: **Required.** First settlement date, inclusive.
    /// * `.end(NaiveDate)`: **Required.** Last settlement date, inclusive.
    /// * `.redo(bool)`: Optional. When `true`, every date in the range is refetched
    ///   regardless of catalogue state and the consolidated file is rebuilt from
    ///   scratch. Defaults to `false`.
    ///
    /// # Returns
    ///
    /// A `Result` containing an [`AcquireOutcome`]: the consolidated half-hourly
    /// series as a `LazyFrame` plus a per-run [`AcquireReport`](crate::AcquireReport)
    /// with resolved/empty/failed/skipped counts.
    ///
    /// # Errors
    ///
    /// Returns [`BmrsError::Acquire`] if the range is inverted, or if persisting
    /// artifacts or the catalogue fails. Individual fetch failures do not abort
    /// the run; they are counted in the report and retried on a later run.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use bmrs::{Bmrs, BmrsError};
    /// # use chrono::NaiveDate;
    /// # async fn run() -> Result<(), BmrsError> {
    /// # let client = Bmrs::builder().api_key("my-key".to_string()).build().await?;
    /// let outcome = client
    ///     .acquire()
    ///     .unit("T_DRAXX-1")
    ///     .start(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap())
    ///     .end(NaiveDate::from_ymd_opt(2023, 1, 31).unwrap())
    ///     .call()
    ///     .await?;
    /// println!(
    ///     "resolved {} dates, {} empty",
    ///     outcome.report.resolved, outcome.report.empty
    /// );
    /// let frame = outcome.frame.collect();
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub async fn acquire(
        &self,
        unit: &str,
        start: NaiveDate,
        end: NaiveDate,
        redo: Option<bool>,
    ) -> Result<AcquireOutcome, BmrsError> {
        let orchestrator = Orchestrator::new(&self.fetcher, &self.store, self.settings);
        orchestrator
            .run(unit, start, end, redo.unwrap_or(false))
            .await
            .map_err(BmrsError::from)
    }

    /// Returns the consolidated series for a unit without touching the network.
    ///
    /// # Returns
    ///
    /// `Ok(Some(LazyFrame))` if a consolidated file exists on disk for the unit,
    /// `Ok(None)` if nothing has been acquired for it yet.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use bmrs::{Bmrs, BmrsError};
    /// # async fn run() -> Result<(), BmrsError> {
    /// # let client = Bmrs::builder().api_key("my-key".to_string()).build().await?;
    /// if let Some(frame) = client.consolidated("T_DRAXX-1").await? {
    ///     let df = frame.collect();
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn consolidated(&self, unit: &str) -> Result<Option<LazyFrame>, BmrsError> {
        self.store
            .load_consolidated(unit)
            .await
            .map_err(BmrsError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn client_in(dir: &std::path::Path) -> Bmrs {
        Bmrs::builder()
            .api_key("test-key".to_string())
            .data_folder(dir.to_path_buf())
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn builder_creates_data_folder() {
        let dir = tempdir().unwrap();
        let data_folder = dir.path().join("nested").join("cache");
        let _client = Bmrs::builder()
            .api_key("test-key".to_string())
            .data_folder(data_folder.clone())
            .build()
            .await
            .unwrap();
        assert!(data_folder.is_dir());
    }

    #[tokio::test]
    async fn builder_rejects_file_at_data_folder_path() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("taken");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let result = Bmrs::builder()
            .api_key("test-key".to_string())
            .data_folder(blocker)
            .build()
            .await;
        assert!(matches!(result, Err(BmrsError::DataDirCreation(_, _))));
    }

    #[tokio::test]
    async fn consolidated_is_none_for_unknown_unit() {
        let dir = tempdir().unwrap();
        let client = client_in(dir.path()).await;
        let frame = client.consolidated("T_NOSUCH-1").await.unwrap();
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn acquire_rejects_inverted_range() {
        let dir = tempdir().unwrap();
        let client = client_in(dir.path()).await;
        let result = client
            .acquire()
            .unit("T_TEST-1")
            .start(NaiveDate::from_ymd_opt(2023, 2, 1).unwrap())
            .end(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap())
            .call()
            .await;
        assert!(result.is_err());
    }
}
