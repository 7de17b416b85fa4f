//! External FX rate sources
//!
//! Each source turns one upstream payload shape into [`RateRecord`]s:
//! - ECB: CSV with daily and monthly reference rates
//! - apilayer: JSON time series, daily only, quota limited
//! - investing: monthly closes per instrument, returned without dates

pub mod apilayer;
pub mod ecb;
pub mod investing;

pub use apilayer::{ApilayerSource, QuotaStatus, QUOTA_KEY};
pub use ecb::EcbSource;
pub use investing::{InstrumentMatch, InvestingSource};

use crate::cache::ResponseCache;
use crate::error::{FxError, Result};
use crate::types::{RateRecord, Source};
use chrono::NaiveDate;
use hashbrown::HashSet;
use reqwest::{Client, Response};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;

/// Dates of one fetch, as seen by the run that issued it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub date_from: NaiveDate,
    /// Inclusive, never after `today`
    pub date_to: NaiveDate,
    /// The run's current date; decides whether a response can still change
    pub today: NaiveDate,
}

impl FetchWindow {
    pub fn new(date_from: NaiveDate, date_to: NaiveDate, today: NaiveDate) -> Self {
        Self {
            date_from,
            date_to,
            today,
        }
    }

    /// True when data ending at `end` may still be revised upstream
    pub fn is_live(&self, end: NaiveDate) -> bool {
        end >= self.today
    }
}

/// A source of normalized rate records
pub trait RateSource: Send + Sync {
    /// Provenance tag of every record this source emits
    fn source(&self) -> Source;

    /// Fetch every observation of the window (both ends inclusive)
    fn fetch(
        &self,
        window: &FetchWindow,
    ) -> impl Future<Output = Result<Vec<RateRecord>>> + Send;
}

/// HTTP client shared by one source, with a bounded timeout
pub(crate) fn http_client(origin: Source, timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("fx-report/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| {
            FxError::unavailable(origin, format!("Failed to create HTTP client: {}", e))
        })
}

/// Deterministic cache key: source prefix plus the serialized request parameters
pub(crate) fn cache_key<T: Serialize>(origin: Source, params: &T) -> Result<String> {
    Ok(format!("{}:{}", origin, serde_json::to_string(params)?))
}

/// Store a successful response, as volatile when it covers data up to the run's today
pub(crate) fn store_response(
    cache: &dyn ResponseCache,
    key: &str,
    body: Vec<u8>,
    window: &FetchWindow,
    end: NaiveDate,
) {
    if window.is_live(end) {
        cache.put_volatile(key, body);
    } else {
        cache.put(key, body);
    }
}

/// Map a transport failure (connect, timeout, body read) to a source failure
pub(crate) fn transport_error(origin: Source, err: reqwest::Error) -> FxError {
    if err.is_timeout() {
        FxError::unavailable(origin, format!("request timed out: {}", err))
    } else {
        FxError::unavailable(origin, format!("HTTP request failed: {}", err))
    }
}

/// Reject any non-2xx response
pub(crate) fn check_status(origin: Source, response: &Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(FxError::unavailable(
            origin,
            format!("upstream returned {}", status),
        ))
    }
}

/// Read the whole body of a successful response
pub(crate) async fn read_body(origin: Source, response: Response) -> Result<Vec<u8>> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| transport_error(origin, e))?;
    Ok(bytes.to_vec())
}

/// Keep the first of any repeated `(currency, ts, freq)` within one source's output
pub(crate) fn dedup_records(records: Vec<RateRecord>) -> Vec<RateRecord> {
    let mut seen = HashSet::with_capacity(records.len());
    let before = records.len();

    let kept: Vec<RateRecord> = records
        .into_iter()
        .filter(|r| seen.insert((r.currency.clone(), r.ts.clone(), r.freq)))
        .collect();

    if kept.len() != before {
        log::warn!("dropped {} duplicate observations", before - kept.len());
    }
    kept
}
