use crate::fetch::error::FetchError;
use crate::fetch::observation::FetchOutcome;
use crate::fetch::parse::parse_generation_csv;
use chrono::NaiveDate;
use log::{debug, warn};
use reqwest::Client;
use std::future::Future;
use std::time::Duration;

/// Default endpoint for per-unit actual generation output, B1610 shape.
pub const DEFAULT_BASE_URL: &str = "https://api.bmreports.com/BMRS/B1610/v2";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Explicit fetch configuration. The API key lives here and nowhere else;
/// there is no process-wide credential state.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl FetchConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        FetchConfig {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// The seam between the acquisition orchestrator and the network: one bounded
/// call per (unit, date), no internal retries. Retry policy belongs to the
/// caller.
pub trait DayFetcher {
    fn fetch_day(
        &self,
        unit: &str,
        date: NaiveDate,
    ) -> impl Future<Output = Result<FetchOutcome, FetchError>> + Send;
}

/// HTTP client for the generation endpoint.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    pub fn new(config: FetchConfig) -> Result<FetchClient, FetchError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(FetchError::ClientBuild)?;
        Ok(FetchClient { http, config })
    }

    /// Performs exactly one network round trip for (unit, date) and validates
    /// the payload. A timeout surfaces as a transport error like any other
    /// connection failure.
    pub async fn fetch(&self, unit: &str, date: NaiveDate) -> Result<FetchOutcome, FetchError> {
        let date_str = date.format("%Y-%m-%d").to_string();
        // Key is sent as a query parameter but kept out of logs and errors.
        let display_url = format!(
            "{}?SettlementDate={}&NGCBMUnitID={}",
            self.config.base_url, date_str, unit
        );
        debug!("Requesting generation data for {unit} on {date_str}");

        let response = self
            .http
            .get(&self.config.base_url)
            .query(&[
                ("APIKey", self.config.api_key.as_str()),
                ("SettlementDate", date_str.as_str()),
                ("Period", "*"),
                ("NGCBMUnitID", unit),
                ("ServiceType", "csv"),
            ])
            .send()
            .await
            .map_err(|e| FetchError::NetworkRequest(display_url.clone(), e))?;

        let response = match response.error_for_status() {
            Ok(resp) => resp,
            Err(e) => {
                warn!("HTTP error for {display_url}: {e:?}");
                return Err(if let Some(status) = e.status() {
                    FetchError::HttpStatus {
                        url: display_url,
                        status,
                        source: e,
                    }
                } else {
                    FetchError::NetworkRequest(display_url, e)
                });
            }
        };

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::BodyRead(display_url, e))?;
        parse_generation_csv(unit, date, &body)
    }
}

impl DayFetcher for FetchClient {
    fn fetch_day(
        &self,
        unit: &str,
        date: NaiveDate,
    ) -> impl Future<Output = Result<FetchOutcome, FetchError>> + Send {
        self.fetch(unit, date)
    }
}
