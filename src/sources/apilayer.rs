//! apilayer.com exchangerates_data time series
//!
//! Daily rates only, returned as `rates: {date: {currency: value}}`. The free plan is
//! limited per month; the remaining quota is published through the cache so a
//! front end can display it.

use super::{
    cache_key, check_status, dedup_records, http_client, read_body, store_response,
    transport_error, FetchWindow, RateSource,
};
use crate::cache::ResponseCache;
use crate::config::Settings;
use crate::error::{FxError, Result};
use crate::types::{RateRecord, Source};
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Well-known cache key of the latest [`QuotaStatus`]
pub const QUOTA_KEY: &str = "apilayer_quota";

const REMAINING_HEADER: &str = "x-ratelimit-remaining-month";
const LIMIT_HEADER: &str = "x-ratelimit-limit-month";

/// Monthly request quota reported by apilayer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub remaining: u32,
    pub limit: u32,
}

impl QuotaStatus {
    /// Read the quota headers, treating absent or unparsable values as zero
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0)
        };

        Self {
            remaining: read(REMAINING_HEADER),
            limit: read(LIMIT_HEADER),
        }
    }

    /// Last published quota, if any
    pub fn load(cache: &dyn ResponseCache) -> Option<Self> {
        cache
            .get(QUOTA_KEY)
            .and_then(|blob| serde_json::from_slice(&blob).ok())
    }

    /// Best effort; a serialization failure only loses the display value
    pub fn publish(&self, cache: &dyn ResponseCache) {
        match serde_json::to_vec(self) {
            Ok(blob) => cache.put(QUOTA_KEY, blob),
            Err(e) => log::warn!("apilayer: quota not stored: {}", e),
        }
    }

    /// Remaining share of the quota, 0 to 100
    pub fn percent(&self) -> u32 {
        if self.limit == 0 {
            0
        } else {
            (u64::from(self.remaining.min(self.limit)) * 100 / u64::from(self.limit)) as u32
        }
    }

    /// `remaining / limit`
    pub fn label(&self) -> String {
        format!("{} / {}", self.remaining, self.limit)
    }
}

/// apilayer exchange rates source
pub struct ApilayerSource {
    settings: Arc<Settings>,
    cache: Arc<dyn ResponseCache>,
    client: Client,
}

#[derive(Debug, Serialize)]
struct TimeseriesQuery<'a> {
    start_date: String,
    end_date: String,
    base: &'a str,
    symbols: String,
}

#[derive(Debug, Deserialize)]
struct TimeseriesResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    rates: Option<BTreeMap<String, BTreeMap<String, Option<f64>>>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl ApilayerSource {
    pub fn new(settings: Arc<Settings>, cache: Arc<dyn ResponseCache>) -> Result<Self> {
        let client = http_client(Source::Apilayer, settings.request_timeout())?;
        Ok(Self {
            settings,
            cache,
            client,
        })
    }

    fn timeseries_url(&self) -> String {
        format!("{}timeseries", self.settings.apilayer.endpoint)
    }

    async fn fetch_json(&self, query: &TimeseriesQuery<'_>) -> Result<Vec<u8>> {
        let api_key = self.settings.apilayer_key()?;

        let response = self
            .client
            .get(self.timeseries_url())
            .header("apikey", api_key)
            .query(query)
            .send()
            .await
            .map_err(|e| transport_error(Source::Apilayer, e))?;

        check_status(Source::Apilayer, &response)?;
        let quota = QuotaStatus::from_headers(response.headers());
        let body = read_body(Source::Apilayer, response).await?;

        quota.publish(self.cache.as_ref());
        log::info!("apilayer: quota {}", quota.label());
        Ok(body)
    }
}

/// Unpivot `rates: {date: {currency: value}}` into one daily record per pair
///
/// Output is ordered by date, then currency. Null values are skipped.
pub fn parse_timeseries(body: &[u8]) -> Result<Vec<RateRecord>> {
    let response: TimeseriesResponse = serde_json::from_slice(body)
        .map_err(|e| FxError::malformed(Source::Apilayer, format!("JSON parse error: {}", e)))?;

    if response.success == Some(false) {
        let detail = response
            .error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "success=false".to_string());
        return Err(FxError::unavailable(Source::Apilayer, detail));
    }

    let rates = response
        .rates
        .ok_or_else(|| FxError::malformed(Source::Apilayer, "payload has no rates"))?;

    let mut records = Vec::new();
    for (date, by_currency) in rates {
        for (currency, value) in by_currency {
            let Some(value) = value else {
                log::debug!("apilayer: no rate for {} at {}", currency, date);
                continue;
            };
            let record = RateRecord::daily(currency, date.as_str(), value, Source::Apilayer)
                .map_err(|e| FxError::malformed(Source::Apilayer, e.to_string()))?;
            records.push(record);
        }
    }

    Ok(dedup_records(records))
}

impl RateSource for ApilayerSource {
    fn source(&self) -> Source {
        Source::Apilayer
    }

    async fn fetch(&self, window: &FetchWindow) -> Result<Vec<RateRecord>> {
        let FetchWindow {
            date_from, date_to, ..
        } = *window;
        let query = TimeseriesQuery {
            start_date: date_from.format("%Y-%m-%d").to_string(),
            end_date: date_to.format("%Y-%m-%d").to_string(),
            base: &self.settings.base,
            symbols: self.settings.apilayer.symbols.join(","),
        };
        let key = cache_key(Source::Apilayer, &query)?;

        let records = match self.cache.get(&key) {
            Some(body) => {
                log::info!(
                    "apilayer: getting data from cache ({} to {})",
                    date_from,
                    date_to
                );
                parse_timeseries(&body)?
            }
            None => {
                log::info!(
                    "apilayer: getting data via API ({} to {})",
                    date_from,
                    date_to
                );
                let body = self.fetch_json(&query).await?;
                let records = parse_timeseries(&body)?;
                store_response(self.cache.as_ref(), &key, body, window, date_to);
                records
            }
        };

        log::debug!("apilayer: {} observations", records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use reqwest::header::HeaderValue;

    const SAMPLE: &str = r#"{
        "success": true,
        "timeseries": true,
        "start_date": "2022-08-01",
        "end_date": "2022-08-02",
        "base": "EUR",
        "rates": {
            "2022-08-02": {"RSD": 117.370164, "KZT": 487.1},
            "2022-08-01": {"RSD": 117.339545, "KZT": null}
        }
    }"#;

    #[test]
    fn test_unpivot() {
        let records = parse_timeseries(SAMPLE.as_bytes()).unwrap();
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].ts, "2022-08-01");
        assert_eq!(records[0].currency, "RSD");
        assert_eq!(records[1].ts, "2022-08-02");
        assert_eq!(records[1].currency, "KZT");
        assert!((records[2].value - 117.370164).abs() < 1e-9);
        assert!(records.iter().all(|r| r.source == Source::Apilayer));
    }

    #[test]
    fn test_unsuccessful_payload() {
        let body = br#"{"success": false, "error": {"code": 104, "info": "quota reached"}}"#;
        let err = parse_timeseries(body).unwrap_err();
        assert!(matches!(err, FxError::SourceUnavailable { .. }));
        assert!(err.to_string().contains("quota reached"));
    }

    #[test]
    fn test_quota_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(REMAINING_HEADER, HeaderValue::from_static("180"));
        headers.insert(LIMIT_HEADER, HeaderValue::from_static("250"));

        let quota = QuotaStatus::from_headers(&headers);
        assert_eq!(quota, QuotaStatus { remaining: 180, limit: 250 });
        assert_eq!(quota.percent(), 72);
        assert_eq!(quota.label(), "180 / 250");

        let empty = QuotaStatus::from_headers(&HeaderMap::new());
        assert_eq!(empty, QuotaStatus { remaining: 0, limit: 0 });
        assert_eq!(empty.percent(), 0);
    }

    #[test]
    fn test_quota_side_channel() {
        let cache = MemoryCache::default();
        assert!(QuotaStatus::load(&cache).is_none());

        QuotaStatus { remaining: 3, limit: 250 }.publish(&cache);
        assert_eq!(
            QuotaStatus::load(&cache),
            Some(QuotaStatus { remaining: 3, limit: 250 })
        );
    }
}
