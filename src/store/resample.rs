//! Mapping raw settlement-period rows onto the canonical half-hourly grid.

use crate::fetch::observation::RawObservation;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::BTreeMap;

pub const SETTLEMENT_PERIOD_MINUTES: i64 = 30;
pub const PERIODS_PER_DAY: u32 = 48;

/// Start of settlement period `period` (1-based) on `date`: an offset of
/// `(period - 1) * 30` minutes from the date's start of day, UTC.
pub fn settlement_period_start(date: NaiveDate, period: u32) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
        + Duration::minutes(SETTLEMENT_PERIOD_MINUTES * (i64::from(period) - 1))
}

pub(crate) fn slot_millis(date: NaiveDate, period: u32) -> i64 {
    settlement_period_start(date, period)
        .and_utc()
        .timestamp_millis()
}

/// One grid slot of the consolidated series. A `None` quantity marks a slot
/// inside a resolved day for which no row survived coercion; it keeps the
/// grid gap-free without inventing a value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct GridSlot {
    pub period: u32,
    pub quantity_mw: Option<f64>,
}

/// Resamples one observation onto the grid: the full 48-slot day is laid out
/// first, then rows land on their slots with the last row winning when more
/// than one maps to the same slot.
pub(crate) fn day_grid(observation: &RawObservation) -> BTreeMap<i64, GridSlot> {
    let mut grid = BTreeMap::new();
    for period in 1..=PERIODS_PER_DAY {
        grid.insert(
            slot_millis(observation.date, period),
            GridSlot {
                period,
                quantity_mw: None,
            },
        );
    }
    for row in &observation.rows {
        grid.insert(
            slot_millis(row.settlement_date, row.settlement_period),
            GridSlot {
                period: row.settlement_period,
                quantity_mw: Some(row.quantity_mw),
            },
        );
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::observation::ObservationRow;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()
    }

    #[test]
    fn period_maps_to_half_hour_offset() {
        let start = settlement_period_start(date(), 1);
        assert_eq!(start, date().and_hms_opt(0, 0, 0).unwrap());

        let third = settlement_period_start(date(), 3);
        assert_eq!(third, date().and_hms_opt(1, 0, 0).unwrap());

        let last = settlement_period_start(date(), PERIODS_PER_DAY);
        assert_eq!(last, date().and_hms_opt(23, 30, 0).unwrap());
    }

    #[test]
    fn day_grid_is_gap_free() {
        let observation = RawObservation {
            unit: "T_TEST-1".to_string(),
            date: date(),
            rows: vec![ObservationRow {
                settlement_date: date(),
                settlement_period: 5,
                quantity_mw: 12.0,
            }],
        };
        let grid = day_grid(&observation);
        assert_eq!(grid.len(), PERIODS_PER_DAY as usize);
        let populated: Vec<_> = grid.values().filter(|s| s.quantity_mw.is_some()).collect();
        assert_eq!(populated.len(), 1);
        assert_eq!(populated[0].period, 5);
    }

    #[test]
    fn last_row_wins_within_a_slot() {
        let observation = RawObservation {
            unit: "T_TEST-1".to_string(),
            date: date(),
            rows: vec![
                ObservationRow {
                    settlement_date: date(),
                    settlement_period: 1,
                    quantity_mw: 1.0,
                },
                ObservationRow {
                    settlement_date: date(),
                    settlement_period: 1,
                    quantity_mw: 2.0,
                },
            ],
        };
        let grid = day_grid(&observation);
        let first = grid.get(&slot_millis(date(), 1)).unwrap();
        assert_eq!(first.quantity_mw, Some(2.0));
    }
}
