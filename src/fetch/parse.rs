//! Structural validation of the delimited generation payload.
//!
//! The provider's CSV answers have a preamble line, then a header row naming
//! the columns, then one row per settlement period, and sometimes a trailing
//! `<EOF>` marker. Only three columns matter here: the settlement date, the
//! period index and the metered quantity.

use crate::fetch::error::FetchError;
use crate::fetch::observation::{FetchOutcome, ObservationRow, RawObservation};
use chrono::NaiveDate;
use log::debug;

const COL_SETTLEMENT_DATE: &str = "Settlement Date";
const COL_SETTLEMENT_PERIOD: &str = "SP";
const COL_QUANTITY: &str = "Quantity (MW)";

// Long days under clock changes reach 50 periods; anything beyond is noise.
const MAX_SETTLEMENT_PERIOD: u32 = 50;

pub(crate) fn parse_generation_csv(
    unit: &str,
    date: NaiveDate,
    body: &str,
) -> Result<FetchOutcome, FetchError> {
    // Drop the preamble line; the header row follows it.
    let Some((_preamble, rest)) = body.split_once('\n') else {
        return Err(FetchError::Payload {
            unit: unit.to_string(),
            date,
            reason: "response has no header row".to_string(),
        });
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(rest.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| FetchError::Csv {
            unit: unit.to_string(),
            date,
            source: e,
        })?
        .clone();

    let column = |name: &'static str| -> Result<usize, FetchError> {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or(FetchError::MissingColumn {
                unit: unit.to_string(),
                date,
                column: name,
            })
    };
    let date_idx = column(COL_SETTLEMENT_DATE)?;
    let period_idx = column(COL_SETTLEMENT_PERIOD)?;
    let quantity_idx = column(COL_QUANTITY)?;

    let mut rows = Vec::new();
    let mut data_rows = 0usize;
    for record in reader.records() {
        let record = record.map_err(|e| FetchError::Csv {
            unit: unit.to_string(),
            date,
            source: e,
        })?;
        if record.is_empty() || record.get(0).map(str::trim) == Some("<EOF>") {
            continue;
        }
        data_rows += 1;
        match parse_row(&record, date_idx, period_idx, quantity_idx) {
            Some(row) => rows.push(row),
            None => {
                debug!("Dropping unparseable row for unit {unit} on {date}: {record:?}");
            }
        }
    }

    if data_rows == 0 {
        return Ok(FetchOutcome::Empty);
    }
    if rows.is_empty() {
        // Rows were present but none survived coercion; the payload shape is
        // not what we expect, so surface it rather than confirming "empty".
        return Err(FetchError::Payload {
            unit: unit.to_string(),
            date,
            reason: format!("none of the {data_rows} data rows could be parsed"),
        });
    }

    Ok(FetchOutcome::Data(RawObservation {
        unit: unit.to_string(),
        date,
        rows,
    }))
}

fn parse_row(
    record: &csv::StringRecord,
    date_idx: usize,
    period_idx: usize,
    quantity_idx: usize,
) -> Option<ObservationRow> {
    let settlement_date =
        NaiveDate::parse_from_str(record.get(date_idx)?.trim(), "%Y-%m-%d").ok()?;
    let settlement_period: u32 = record.get(period_idx)?.trim().parse().ok()?;
    if settlement_period == 0 || settlement_period > MAX_SETTLEMENT_PERIOD {
        return None;
    }
    let quantity_mw: f64 = record.get(quantity_idx)?.trim().parse().ok()?;
    Some(ObservationRow {
        settlement_date,
        settlement_period,
        quantity_mw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()
    }

    fn payload(rows: &[&str]) -> String {
        let mut body = String::from("HDR,B1610,ActualGenerationOutputPerGenerationUnit\n");
        body.push_str("Document Type,Settlement Date,SP,Quantity (MW),Registered Resource Name\n");
        for row in rows {
            body.push_str(row);
            body.push('\n');
        }
        body.push_str("<EOF>\n");
        body
    }

    #[test]
    fn parses_valid_rows() {
        let body = payload(&[
            "B1610,2021-01-01,1,42.5,T_TEST-1",
            "B1610,2021-01-01,2,43.0,T_TEST-1",
        ]);
        let outcome = parse_generation_csv("T_TEST-1", date(), &body).unwrap();
        match outcome {
            FetchOutcome::Data(observation) => {
                assert_eq!(observation.unit, "T_TEST-1");
                assert_eq!(observation.rows.len(), 2);
                assert_eq!(observation.rows[0].settlement_period, 1);
                assert_eq!(observation.rows[0].quantity_mw, 42.5);
                assert_eq!(observation.rows[1].settlement_date, date());
            }
            other => panic!("expected data, got {other:?}"),
        }
    }

    #[test]
    fn zero_data_rows_is_empty_not_error() {
        let body = payload(&[]);
        let outcome = parse_generation_csv("T_TEST-1", date(), &body).unwrap();
        assert_eq!(outcome, FetchOutcome::Empty);
    }

    #[test]
    fn unparseable_row_is_dropped_not_fatal() {
        let body = payload(&[
            "B1610,2021-01-01,1,42.5,T_TEST-1",
            "B1610,2021-01-01,two,not-a-number,T_TEST-1",
            "B1610,2021-01-01,99,1.0,T_TEST-1",
        ]);
        let outcome = parse_generation_csv("T_TEST-1", date(), &body).unwrap();
        match outcome {
            FetchOutcome::Data(observation) => assert_eq!(observation.rows.len(), 1),
            other => panic!("expected data, got {other:?}"),
        }
    }

    #[test]
    fn all_rows_unparseable_is_a_payload_error() {
        let body = payload(&["B1610,garbage,one,nope,T_TEST-1"]);
        let err = parse_generation_csv("T_TEST-1", date(), &body).unwrap_err();
        assert!(matches!(err, FetchError::Payload { .. }));
        assert!(!err.is_transport());
    }

    #[test]
    fn missing_required_column_is_a_parse_error() {
        let body = "HDR\nDocument Type,Settlement Date,Quantity (MW)\nB1610,2021-01-01,42.5\n";
        let err = parse_generation_csv("T_TEST-1", date(), body).unwrap_err();
        assert!(matches!(
            err,
            FetchError::MissingColumn { column: "SP", .. }
        ));
    }

    #[test]
    fn body_without_header_row_is_a_parse_error() {
        let err = parse_generation_csv("T_TEST-1", date(), "").unwrap_err();
        assert!(matches!(err, FetchError::Payload { .. }));
    }
}
