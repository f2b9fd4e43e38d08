//! The acquisition run: scan the catalogue for missing dates, fetch them over
//! a bounded worker pool in checkpointed chunks, then consolidate.
//!
//! Per-date fetch failures never escape a run; they become catalogue status
//! transitions. Persistence failures do escape: the run aborts, but every raw
//! artifact written before the failure is already durable, so the next run
//! picks up where this one stopped.

use crate::acquire::error::AcquireError;
use crate::catalogue::record::Catalogue;
use crate::fetch::client::DayFetcher;
use crate::fetch::error::FetchError;
use crate::fetch::observation::{FetchOutcome, RawObservation};
use crate::store::artifact_store::{ArtifactKind, Store};
use crate::store::error::StoreError;
use chrono::{Duration, NaiveDate};
use futures_util::{stream, StreamExt};
use log::{info, warn};
use polars::prelude::LazyFrame;

/// Counts reported by a finished acquisition run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquireReport {
    /// Dates fetched this run that yielded data.
    pub resolved: usize,
    /// Dates the provider confirmed as having no data this run.
    pub empty: usize,
    /// Dates attempted this run that failed (transport or parse) and remain
    /// eligible for retry, subject to the staleness policy.
    pub failed: usize,
    /// Dates in range that needed no fetch at all.
    pub skipped: usize,
}

/// Result of an acquisition run: the consolidated half-hourly series plus the
/// per-date outcome counts.
pub struct AcquireOutcome {
    pub frame: LazyFrame,
    pub report: AcquireReport,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct AcquireSettings {
    pub chunk_size: usize,
    pub workers: usize,
    pub staleness: Duration,
}

enum DateResult {
    Resolved(RawObservation),
    Empty,
    Failed(FetchError),
}

pub(crate) struct Orchestrator<'a, F> {
    fetcher: &'a F,
    store: &'a Store,
    settings: AcquireSettings,
}

impl<'a, F: DayFetcher + Sync> Orchestrator<'a, F> {
    pub(crate) fn new(fetcher: &'a F, store: &'a Store, settings: AcquireSettings) -> Self {
        Orchestrator {
            fetcher,
            store,
            settings,
        }
    }

    pub(crate) async fn run(
        &self,
        unit: &str,
        start: NaiveDate,
        end: NaiveDate,
        redo: bool,
    ) -> Result<AcquireOutcome, AcquireError> {
        if start > end {
            return Err(AcquireError::InvalidDateRange { start, end });
        }

        let catalogue_dir = self.store.ensure_catalogue_dir().await?;
        let mut catalogue = Catalogue::load(&catalogue_dir, unit).await?;
        let migrated = self.migrate_if_needed(unit, &mut catalogue).await?;

        let missing = catalogue.missing_dates(start, end, redo, self.settings.staleness);
        let range_days = end.signed_duration_since(start).num_days() as usize + 1;
        let mut report = AcquireReport {
            skipped: range_days - missing.len(),
            ..Default::default()
        };

        if missing.is_empty() && !migrated {
            info!("Nothing to fetch for {unit} in {start}..{end}");
            let frame = match self.store.load_consolidated(unit).await? {
                Some(frame) => frame,
                None => Store::empty_frame()?,
            };
            return Ok(AcquireOutcome { frame, report });
        }

        info!(
            "Fetching {} missing dates for {unit} in {start}..{end} ({} already satisfied)",
            missing.len(),
            report.skipped
        );

        let mut new_observations: Vec<RawObservation> = Vec::new();
        for chunk in missing.chunks(self.settings.chunk_size) {
            let mut results = stream::iter(
                chunk
                    .iter()
                    .copied()
                    .map(|date| self.resolve_date(unit, date)),
            )
            .buffer_unordered(self.settings.workers);

            while let Some(completed) = results.next().await {
                let (date, outcome) = completed?;
                match outcome {
                    DateResult::Resolved(observation) => {
                        catalogue.mark_resolved(date);
                        report.resolved += 1;
                        new_observations.push(observation);
                    }
                    DateResult::Empty => {
                        catalogue.mark_empty(date);
                        report.empty += 1;
                    }
                    DateResult::Failed(err) => {
                        warn!("Fetch failed for {unit} on {date}: {err}");
                        catalogue.mark_attempted(date);
                        report.failed += 1;
                    }
                }
            }
            drop(results);

            // Checkpoint before the next chunk starts: a crash from here on
            // loses at most one chunk of catalogue progress, and the raw
            // artifacts for this chunk are already durable.
            catalogue.save().await?;
        }

        let frame = if redo || migrated {
            self.store.merge_and_save(unit, &[], true).await?
        } else if !new_observations.is_empty() {
            self.store
                .merge_and_save(unit, &new_observations, false)
                .await?
        } else {
            match self.store.load_consolidated(unit).await? {
                Some(frame) => frame,
                None => Store::empty_frame()?,
            }
        };

        info!(
            "Acquisition for {unit} in {start}..{end} done: {} resolved, {} empty, {} still missing, {} already satisfied",
            report.resolved, report.empty, report.failed, report.skipped
        );
        Ok(AcquireOutcome { frame, report })
    }

    /// One date, end to end: fetch, then persist the outcome. Fetch errors are
    /// data, not failures, at this level; only persistence errors propagate.
    async fn resolve_date(
        &self,
        unit: &str,
        date: NaiveDate,
    ) -> Result<(NaiveDate, DateResult), StoreError> {
        match self.fetcher.fetch_day(unit, date).await {
            Ok(FetchOutcome::Data(observation)) => {
                self.store.persist_raw(&observation).await?;
                Ok((date, DateResult::Resolved(observation)))
            }
            Ok(FetchOutcome::Empty) => {
                self.store.persist_empty_marker(unit, date).await?;
                Ok((date, DateResult::Empty))
            }
            Err(err) => Ok((date, DateResult::Failed(err))),
        }
    }

    /// One-time reconstruction of catalogue statuses from the artifact
    /// directory, for data directories that predate the catalogue file.
    async fn migrate_if_needed(
        &self,
        unit: &str,
        catalogue: &mut Catalogue,
    ) -> Result<bool, AcquireError> {
        if !catalogue.needs_migration() {
            return Ok(false);
        }
        let artifacts = self.store.scan_artifacts(unit).await?;
        for (date, kind) in &artifacts {
            match kind {
                ArtifactKind::Raw => catalogue.mark_resolved(*date),
                ArtifactKind::EmptyMarker => catalogue.mark_empty(*date),
            }
        }
        catalogue.migration_done();
        if artifacts.is_empty() {
            return Ok(false);
        }
        info!(
            "Migrated {} artifact entries into the catalogue for {unit}",
            artifacts.len()
        );
        catalogue.save().await?;
        Ok(true)
    }
}
