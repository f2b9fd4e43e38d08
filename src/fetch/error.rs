use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to build HTTP client")]
    ClientBuild(#[source] reqwest::Error),

    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to read response body for {0}")]
    BodyRead(String, #[source] reqwest::Error),

    #[error("Column '{column}' missing from payload for unit '{unit}' on {date}")]
    MissingColumn {
        unit: String,
        date: NaiveDate,
        column: &'static str,
    },

    #[error("Failed to read CSV payload for unit '{unit}' on {date}")]
    Csv {
        unit: String,
        date: NaiveDate,
        #[source]
        source: csv::Error,
    },

    #[error("Malformed payload for unit '{unit}' on {date}: {reason}")]
    Payload {
        unit: String,
        date: NaiveDate,
        reason: String,
    },
}

impl FetchError {
    /// Transport-level failures (connection, timeout, non-2xx). The remainder
    /// are parse failures; both leave the date eligible for a later retry.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            FetchError::NetworkRequest(..)
                | FetchError::HttpStatus { .. }
                | FetchError::BodyRead(..)
        )
    }
}
