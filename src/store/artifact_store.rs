//! Durable storage: one parquet artifact per (unit, settlement date), a
//! lightweight marker for confirmed-empty dates, and one consolidated
//! half-hourly parquet per unit.

use crate::fetch::observation::{ObservationRow, RawObservation};
use crate::store::error::StoreError;
use crate::store::resample::{day_grid, GridSlot};
use chrono::{Duration, NaiveDate};
use log::{debug, info};
use polars::df;
use polars::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::task;

const RAW_DIR_NAME: &str = "raw_gen_data";
const CONSOLIDATED_DIR_NAME: &str = "preprocessed_data";
const CATALOGUE_DIR_NAME: &str = "catalogues";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArtifactKind {
    Raw,
    EmptyMarker,
}

pub struct Store {
    data_dir: PathBuf,
}

impl Store {
    pub fn new(data_dir: impl Into<PathBuf>) -> Store {
        Store {
            data_dir: data_dir.into(),
        }
    }

    fn raw_dir(&self, unit: &str) -> PathBuf {
        self.data_dir.join(RAW_DIR_NAME).join(unit)
    }

    fn raw_path(&self, unit: &str, date: NaiveDate) -> PathBuf {
        self.raw_dir(unit).join(format!("{date}.parquet"))
    }

    fn empty_marker_path(&self, unit: &str, date: NaiveDate) -> PathBuf {
        self.raw_dir(unit).join(format!("{date}.empty"))
    }

    fn consolidated_path(&self, unit: &str) -> PathBuf {
        self.data_dir
            .join(CONSOLIDATED_DIR_NAME)
            .join(unit)
            .join(format!("{unit}_generation.parquet"))
    }

    pub(crate) async fn ensure_catalogue_dir(&self) -> Result<PathBuf, StoreError> {
        let dir = self.data_dir.join(CATALOGUE_DIR_NAME);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::DirCreation(dir.clone(), e))?;
        Ok(dir)
    }

    /// Writes one parquet artifact for the observation. Re-writing an already
    /// persisted date is a silent overwrite with identical content, so the
    /// operation is idempotent. A stale empty marker for the date, left by an
    /// earlier run that saw no data, is removed.
    pub async fn persist_raw(&self, observation: &RawObservation) -> Result<(), StoreError> {
        let dir = self.raw_dir(&observation.unit);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::DirCreation(dir.clone(), e))?;
        self.remove_if_present(self.empty_marker_path(&observation.unit, observation.date))
            .await?;

        let path = self.raw_path(&observation.unit, observation.date);
        let rows = observation.rows.clone();
        task::spawn_blocking(move || {
            let df = observation_to_frame(&rows)?;
            write_parquet_atomic(df, &path)
        })
        .await??;
        debug!(
            "Persisted {} rows for {} on {}",
            observation.rows.len(),
            observation.unit,
            observation.date
        );
        Ok(())
    }

    /// Writes the lightweight marker that distinguishes "provider confirmed
    /// no data for this date" from "never attempted". A stale raw artifact
    /// for the date is removed so a later rebuild cannot resurrect it.
    pub async fn persist_empty_marker(
        &self,
        unit: &str,
        date: NaiveDate,
    ) -> Result<(), StoreError> {
        let dir = self.raw_dir(unit);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::DirCreation(dir.clone(), e))?;
        self.remove_if_present(self.raw_path(unit, date)).await?;

        let path = self.empty_marker_path(unit, date);
        tokio::fs::write(&path, b"")
            .await
            .map_err(|e| StoreError::EmptyMarkerWrite(path.clone(), e))?;
        Ok(())
    }

    async fn remove_if_present(&self, path: PathBuf) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::StaleArtifactRemoval(path, e)),
        }
    }

    /// Reads one raw artifact back into typed rows.
    pub(crate) async fn read_raw(
        &self,
        unit: &str,
        date: NaiveDate,
    ) -> Result<RawObservation, StoreError> {
        let path = self.raw_path(unit, date);
        let unit = unit.to_string();
        task::spawn_blocking(move || {
            let df = LazyFrame::scan_parquet(&path, Default::default())
                .map_err(|e| StoreError::ParquetScan(path.clone(), e))?
                .collect()
                .map_err(|e| StoreError::ParquetCollect(path.clone(), e))?;
            let rows = frame_to_rows(&df)?;
            Ok(RawObservation { unit, date, rows })
        })
        .await?
    }

    /// Scans the artifact directory for per-date files. This is the one-time
    /// migration path for data directories that predate the catalogue; normal
    /// runs never list the directory.
    pub(crate) async fn scan_artifacts(
        &self,
        unit: &str,
    ) -> Result<Vec<(NaiveDate, ArtifactKind)>, StoreError> {
        let dir = self.raw_dir(unit);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::ArtifactListing(dir, e)),
        };
        let mut found = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::ArtifactListing(dir.clone(), e))?
        {
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(date) = NaiveDate::parse_from_str(stem, "%Y-%m-%d") else {
                continue;
            };
            match path.extension().and_then(|s| s.to_str()) {
                Some("parquet") => found.push((date, ArtifactKind::Raw)),
                Some("empty") => found.push((date, ArtifactKind::EmptyMarker)),
                _ => {}
            }
        }
        found.sort_by_key(|(date, _)| *date);
        Ok(found)
    }

    /// The consolidated half-hourly series for `unit`, if one has been built.
    pub async fn load_consolidated(&self, unit: &str) -> Result<Option<LazyFrame>, StoreError> {
        let path = self.consolidated_path(unit);
        if tokio::fs::metadata(&path).await.is_err() {
            return Ok(None);
        }
        let frame = LazyFrame::scan_parquet(&path, Default::default())
            .map_err(|e| StoreError::ParquetScan(path.clone(), e))?;
        Ok(Some(frame))
    }

    async fn load_consolidated_eager(&self, unit: &str) -> Result<Option<DataFrame>, StoreError> {
        let path = self.consolidated_path(unit);
        if tokio::fs::metadata(&path).await.is_err() {
            return Ok(None);
        }
        let df = task::spawn_blocking(move || {
            LazyFrame::scan_parquet(&path, Default::default())
                .map_err(|e| StoreError::ParquetScan(path.clone(), e))?
                .collect()
                .map_err(|e| StoreError::ParquetCollect(path.clone(), e))
        })
        .await??;
        Ok(Some(df))
    }

    /// Resamples `observations` onto the canonical grid, merges with the
    /// existing consolidated series keeping the newest value per slot, and
    /// saves the result durably before returning it.
    ///
    /// With `rebuild` the base series is recomputed from the raw artifacts on
    /// disk instead of the existing consolidated file (the redo path, and the
    /// first consolidation of a data directory that predates the catalogue).
    pub async fn merge_and_save(
        &self,
        unit: &str,
        observations: &[RawObservation],
        rebuild: bool,
    ) -> Result<LazyFrame, StoreError> {
        let mut grid = if rebuild {
            self.grid_from_artifacts(unit).await?
        } else {
            match self.load_consolidated_eager(unit).await? {
                Some(df) => frame_to_grid(&df)?,
                None => BTreeMap::new(),
            }
        };
        for observation in observations {
            grid.extend(day_grid(observation));
        }

        let path = self.consolidated_path(unit);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StoreError::DirCreation(dir.to_path_buf(), e))?;
        }
        let slots = grid.len();
        let write_path = path.clone();
        task::spawn_blocking(move || {
            let df = grid_to_frame(&grid)?;
            write_parquet_atomic(df, &write_path)
        })
        .await??;
        info!("Saved consolidated series for {unit}: {slots} grid slots");

        LazyFrame::scan_parquet(&path, Default::default())
            .map_err(|e| StoreError::ParquetScan(path, e))
    }

    async fn grid_from_artifacts(&self, unit: &str) -> Result<BTreeMap<i64, GridSlot>, StoreError> {
        let mut grid = BTreeMap::new();
        for (date, kind) in self.scan_artifacts(unit).await? {
            if kind != ArtifactKind::Raw {
                continue;
            }
            let observation = self.read_raw(unit, date).await?;
            // Legacy zero-row artifacts stand for confirmed-empty dates and
            // contribute no grid slots.
            if !observation.rows.is_empty() {
                grid.extend(day_grid(&observation));
            }
        }
        Ok(grid)
    }

    /// A consolidated frame with the right schema and no rows, for callers
    /// that need a series before anything has been acquired.
    pub(crate) fn empty_frame() -> Result<LazyFrame, StoreError> {
        let df = grid_to_frame(&BTreeMap::new())?;
        Ok(df.lazy())
    }
}

fn epoch() -> NaiveDate {
    NaiveDate::default() // 1970-01-01
}

fn observation_to_frame(rows: &[ObservationRow]) -> PolarsResult<DataFrame> {
    let days: Vec<i32> = rows
        .iter()
        .map(|r| r.settlement_date.signed_duration_since(epoch()).num_days() as i32)
        .collect();
    let periods: Vec<i32> = rows.iter().map(|r| r.settlement_period as i32).collect();
    let quantities: Vec<f64> = rows.iter().map(|r| r.quantity_mw).collect();
    let df = df!(
        "settlement_date" => days,
        "settlement_period" => periods,
        "quantity_mw" => quantities,
    )?;
    df.lazy()
        .with_column(col("settlement_date").cast(DataType::Date))
        .collect()
}

fn frame_to_rows(df: &DataFrame) -> Result<Vec<ObservationRow>, StoreError> {
    let dates = df.column("settlement_date")?.date()?;
    let periods = df.column("settlement_period")?.i32()?;
    let quantities = df.column("quantity_mw")?.f64()?;
    let mut rows = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        let (Some(days), Some(period), Some(quantity)) =
            (dates.get(idx), periods.get(idx), quantities.get(idx))
        else {
            continue;
        };
        rows.push(ObservationRow {
            settlement_date: epoch() + Duration::days(days as i64),
            settlement_period: period as u32,
            quantity_mw: quantity,
        });
    }
    Ok(rows)
}

fn frame_to_grid(df: &DataFrame) -> Result<BTreeMap<i64, GridSlot>, StoreError> {
    let times = df.column("utc_time")?.datetime()?;
    let periods = df.column("settlement_period")?.i32()?;
    let quantities = df.column("quantity_mw")?.f64()?;
    let mut grid = BTreeMap::new();
    for idx in 0..df.height() {
        let (Some(time), Some(period)) = (times.get(idx), periods.get(idx)) else {
            continue;
        };
        grid.insert(
            time,
            GridSlot {
                period: period as u32,
                quantity_mw: quantities.get(idx),
            },
        );
    }
    Ok(grid)
}

fn grid_to_frame(grid: &BTreeMap<i64, GridSlot>) -> PolarsResult<DataFrame> {
    let times: Vec<i64> = grid.keys().copied().collect();
    let periods: Vec<i32> = grid.values().map(|s| s.period as i32).collect();
    let quantities: Vec<Option<f64>> = grid.values().map(|s| s.quantity_mw).collect();
    let df = df!(
        "utc_time" => times,
        "settlement_period" => periods,
        "quantity_mw" => quantities,
    )?;
    df.lazy()
        .with_column(col("utc_time").cast(DataType::Datetime(TimeUnit::Milliseconds, None)))
        .collect()
}

fn write_parquet_atomic(mut df: DataFrame, path: &Path) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp =
        NamedTempFile::new_in(dir).map_err(|e| StoreError::TempFile(path.to_path_buf(), e))?;
    ParquetWriter::new(tmp.as_file())
        .with_compression(ParquetCompression::Snappy)
        .finish(&mut df)
        .map_err(|e| StoreError::ParquetWrite(path.to_path_buf(), e))?;
    tmp.persist(path)
        .map_err(|e| StoreError::Replace(path.to_path_buf(), e.error))?;
    Ok(())
}
