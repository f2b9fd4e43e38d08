//! The per-unit catalogue: a durable record of which settlement dates have
//! been attempted, which resolved to data, and which the provider confirmed
//! as empty. The catalogue is the single source of truth for incremental
//! re-fetch decisions; the raw artifact directory is only scanned once, as a
//! migration path for data directories that predate the catalogue file.

use crate::catalogue::error::CatalogueError;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::task;

/// Acquisition status of a single (unit, settlement date) pair.
///
/// `Resolved` and `Empty` imply that the date has been attempted; they are
/// terminal and are never downgraded by a later failed attempt. Only a redo
/// run, which re-fetches the date and records the fresh outcome, can move a
/// date out of a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateStatus {
    /// Never fetched (also the status of any date absent from the catalogue).
    Unattempted,
    /// Fetched at least once, but the provider returned neither data nor a
    /// confirmed-empty payload (transport failure, malformed payload).
    Attempted,
    /// Fetched successfully; a raw artifact exists for this date.
    Resolved,
    /// The provider confirmed there is no data for this date.
    Empty,
}

impl DateStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DateStatus::Resolved | DateStatus::Empty)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DateRecord {
    pub status: DateStatus,
    pub last_attempt: Option<DateTime<Utc>>,
}

/// Durable date-status record for one BM unit.
///
/// One catalogue file per unit, owned by a single acquisition run at a time;
/// concurrent runs against the same unit are a caller error and are not
/// protected against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalogue {
    unit: String,
    dates: BTreeMap<NaiveDate, DateRecord>,
    #[serde(skip)]
    path: PathBuf,
    #[serde(skip)]
    needs_migration: bool,
}

impl Catalogue {
    fn file_path(dir: &Path, unit: &str) -> PathBuf {
        dir.join(format!("{unit}_catalogue.json"))
    }

    /// Loads the catalogue for `unit` from `dir`.
    ///
    /// A missing file is not an error: it yields an empty catalogue flagged
    /// as needing a one-time artifact-directory migration scan.
    pub async fn load(dir: &Path, unit: &str) -> Result<Catalogue, CatalogueError> {
        let path = Self::file_path(dir, unit);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No catalogue file at {:?}, starting empty", path);
                return Ok(Catalogue {
                    unit: unit.to_string(),
                    dates: BTreeMap::new(),
                    path,
                    needs_migration: true,
                });
            }
            Err(e) => return Err(CatalogueError::Read(path, e)),
        };
        let mut catalogue: Catalogue = serde_json::from_slice(&bytes)
            .map_err(|e| CatalogueError::Parse(path.clone(), e))?;
        catalogue.path = path;
        catalogue.needs_migration = false;
        Ok(catalogue)
    }

    /// Durably writes the catalogue, staging to a temporary file in the same
    /// directory and renaming over the final path so a crash never leaves a
    /// half-written catalogue visible.
    pub async fn save(&self) -> Result<(), CatalogueError> {
        let bytes = serde_json::to_vec_pretty(self).map_err(CatalogueError::Serialize)?;
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let dir = path
                .parent()
                .ok_or_else(|| CatalogueError::NoParentDir(path.clone()))?;
            let mut tmp = NamedTempFile::new_in(dir)
                .map_err(|e| CatalogueError::TempFile(path.clone(), e))?;
            tmp.write_all(&bytes)
                .map_err(|e| CatalogueError::TempFile(path.clone(), e))?;
            tmp.as_file()
                .sync_all()
                .map_err(|e| CatalogueError::TempFile(path.clone(), e))?;
            tmp.persist(&path)
                .map_err(|e| CatalogueError::Replace(path.clone(), e.error))?;
            Ok::<(), CatalogueError>(())
        })
        .await??;
        Ok(())
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// True when no catalogue file existed on load and the raw artifact
    /// directory should be scanned once to reconstruct statuses.
    pub fn needs_migration(&self) -> bool {
        self.needs_migration
    }

    pub(crate) fn migration_done(&mut self) {
        self.needs_migration = false;
    }

    pub fn status(&self, date: NaiveDate) -> DateStatus {
        self.dates
            .get(&date)
            .map(|record| record.status)
            .unwrap_or(DateStatus::Unattempted)
    }

    /// Ordered dates within `start..=end` (inclusive) that still need a fetch.
    ///
    /// With `redo` every date in range is returned regardless of status.
    /// Otherwise unattempted dates are always included, terminal dates never,
    /// and an `Attempted` date is re-admitted only while its last attempt was
    /// made within `staleness` of the target date itself: provider data can
    /// arrive late, so recent dates are worth retrying, but once a date has
    /// been attempted more than `staleness` after the fact it is treated as
    /// permanently unavailable.
    pub fn missing_dates(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        redo: bool,
        staleness: Duration,
    ) -> Vec<NaiveDate> {
        let mut missing = Vec::new();
        let mut day = start;
        while day <= end {
            if redo || self.needs_fetch(day, staleness) {
                missing.push(day);
            }
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
        missing
    }

    fn needs_fetch(&self, date: NaiveDate, staleness: Duration) -> bool {
        match self.dates.get(&date) {
            None => true,
            Some(record) => match record.status {
                DateStatus::Unattempted => true,
                DateStatus::Resolved | DateStatus::Empty => false,
                DateStatus::Attempted => match record.last_attempt {
                    Some(attempt) => {
                        attempt.date_naive().signed_duration_since(date) <= staleness
                    }
                    None => true,
                },
            },
        }
    }

    /// Records a fetch attempt. Terminal statuses are preserved; only the
    /// attempt timestamp is refreshed for them.
    pub fn mark_attempted(&mut self, date: NaiveDate) {
        let now = Some(Utc::now());
        self.dates
            .entry(date)
            .and_modify(|record| {
                if !record.status.is_terminal() {
                    record.status = DateStatus::Attempted;
                }
                record.last_attempt = now;
            })
            .or_insert(DateRecord {
                status: DateStatus::Attempted,
                last_attempt: now,
            });
    }

    pub fn mark_resolved(&mut self, date: NaiveDate) {
        self.dates.insert(
            date,
            DateRecord {
                status: DateStatus::Resolved,
                last_attempt: Some(Utc::now()),
            },
        );
    }

    pub fn mark_empty(&mut self, date: NaiveDate) {
        self.dates.insert(
            date,
            DateRecord {
                status: DateStatus::Empty,
                last_attempt: Some(Utc::now()),
            },
        );
    }

    #[cfg(test)]
    pub(crate) fn set_last_attempt(&mut self, date: NaiveDate, at: DateTime<Utc>) {
        if let Some(record) = self.dates.get_mut(&date) {
            record.last_attempt = Some(at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn absent_dates_are_unattempted() {
        let catalogue = Catalogue {
            unit: "T_TEST-1".to_string(),
            dates: BTreeMap::new(),
            path: PathBuf::new(),
            needs_migration: false,
        };
        assert_eq!(catalogue.status(day(2021, 1, 1)), DateStatus::Unattempted);
    }

    #[test]
    fn terminal_status_survives_a_later_failed_attempt() {
        let mut catalogue = Catalogue {
            unit: "T_TEST-1".to_string(),
            dates: BTreeMap::new(),
            path: PathBuf::new(),
            needs_migration: false,
        };
        let date = day(2021, 1, 1);
        catalogue.mark_resolved(date);
        catalogue.mark_attempted(date);
        assert_eq!(catalogue.status(date), DateStatus::Resolved);

        let date2 = day(2021, 1, 2);
        catalogue.mark_empty(date2);
        catalogue.mark_attempted(date2);
        assert_eq!(catalogue.status(date2), DateStatus::Empty);
    }

    #[test]
    fn missing_dates_skips_terminal_and_includes_unattempted() {
        let mut catalogue = Catalogue {
            unit: "T_TEST-1".to_string(),
            dates: BTreeMap::new(),
            path: PathBuf::new(),
            needs_migration: false,
        };
        catalogue.mark_resolved(day(2021, 1, 1));
        catalogue.mark_empty(day(2021, 1, 3));

        let missing = catalogue.missing_dates(
            day(2021, 1, 1),
            day(2021, 1, 4),
            false,
            Duration::days(14),
        );
        assert_eq!(missing, vec![day(2021, 1, 2), day(2021, 1, 4)]);
    }

    #[test]
    fn redo_readmits_every_date_in_range() {
        let mut catalogue = Catalogue {
            unit: "T_TEST-1".to_string(),
            dates: BTreeMap::new(),
            path: PathBuf::new(),
            needs_migration: false,
        };
        catalogue.mark_resolved(day(2021, 1, 1));
        catalogue.mark_empty(day(2021, 1, 2));

        let missing =
            catalogue.missing_dates(day(2021, 1, 1), day(2021, 1, 2), true, Duration::days(14));
        assert_eq!(missing.len(), 2);
    }

    #[test]
    fn staleness_window_bounds_retries_of_attempted_dates() {
        let mut catalogue = Catalogue {
            unit: "T_TEST-1".to_string(),
            dates: BTreeMap::new(),
            path: PathBuf::new(),
            needs_migration: false,
        };
        let date = day(2021, 1, 1);
        catalogue.mark_attempted(date);

        // Attempt made 3 days after the date: still inside the window, retried.
        let recent = Utc.with_ymd_and_hms(2021, 1, 4, 12, 0, 0).unwrap();
        catalogue.set_last_attempt(date, recent);
        let missing = catalogue.missing_dates(date, date, false, Duration::days(14));
        assert_eq!(missing, vec![date]);

        // Attempt made 30 days after the date: data never arrived; give up.
        let old = Utc.with_ymd_and_hms(2021, 1, 31, 12, 0, 0).unwrap();
        catalogue.set_last_attempt(date, old);
        let missing = catalogue.missing_dates(date, date, false, Duration::days(14));
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn save_and_load_round_trip() -> Result<(), CatalogueError> {
        let dir = tempdir().unwrap();
        let mut catalogue = Catalogue::load(dir.path(), "T_TEST-1").await?;
        assert!(catalogue.needs_migration());

        catalogue.mark_resolved(day(2021, 1, 1));
        catalogue.mark_empty(day(2021, 1, 2));
        catalogue.mark_attempted(day(2021, 1, 3));
        catalogue.save().await?;

        let reloaded = Catalogue::load(dir.path(), "T_TEST-1").await?;
        assert!(!reloaded.needs_migration());
        assert_eq!(reloaded.unit(), "T_TEST-1");
        assert_eq!(reloaded.status(day(2021, 1, 1)), DateStatus::Resolved);
        assert_eq!(reloaded.status(day(2021, 1, 2)), DateStatus::Empty);
        assert_eq!(reloaded.status(day(2021, 1, 3)), DateStatus::Attempted);
        Ok(())
    }

    #[tokio::test]
    async fn save_replaces_rather_than_truncates() -> Result<(), CatalogueError> {
        let dir = tempdir().unwrap();
        let mut catalogue = Catalogue::load(dir.path(), "T_TEST-1").await?;
        catalogue.mark_resolved(day(2021, 1, 1));
        catalogue.save().await?;
        catalogue.mark_resolved(day(2021, 1, 2));
        catalogue.save().await?;

        let reloaded = Catalogue::load(dir.path(), "T_TEST-1").await?;
        assert_eq!(reloaded.status(day(2021, 1, 1)), DateStatus::Resolved);
        assert_eq!(reloaded.status(day(2021, 1, 2)), DateStatus::Resolved);
        Ok(())
    }
}
