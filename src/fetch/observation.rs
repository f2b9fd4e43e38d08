use chrono::NaiveDate;

/// One validated row of a generation payload: the provider's settlement date,
/// the 1-based half-hour settlement period within that date, and the metered
/// quantity in MW.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationRow {
    pub settlement_date: NaiveDate,
    pub settlement_period: u32,
    pub quantity_mw: f64,
}

/// The validated result of fetching one (unit, date): an ordered, non-empty
/// set of settlement-period rows. Immutable once persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObservation {
    pub unit: String,
    pub date: NaiveDate,
    pub rows: Vec<ObservationRow>,
}

/// Outcome of a single fetch. A well-formed zero-row payload is a legitimate
/// "no data for this date" answer, not an error, so it gets its own variant
/// rather than being smuggled through the error channel.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Data(RawObservation),
    Empty,
}
