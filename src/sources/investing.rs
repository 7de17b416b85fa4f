//! investing.com monthly quote history
//!
//! Each configured pair maps to an investing.com instrument id. The history endpoint
//! answers with bare value arrays ordered oldest to newest, so the month of every value
//! is reconstructed from the request window. That only holds if upstream returns exactly
//! one value per calendar month; a count mismatch is rejected rather than mis-aligned.

use super::{
    check_status, dedup_records, http_client, read_body, store_response, transport_error,
    FetchWindow, RateSource,
};
use crate::cache::ResponseCache;
use crate::calendar;
use crate::config::{quote_currency, Settings};
use crate::error::{FxError, Result};
use crate::types::{RateRecord, Source};
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;

/// investing.com monthly closes source
pub struct InvestingSource {
    settings: Arc<Settings>,
    cache: Arc<dyn ResponseCache>,
    client: Client,
}

/// Full calendar months covered by a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlyWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub months: Vec<String>,
}

impl MonthlyWindow {
    /// Only complete months are requested: an end date inside a month falls back to
    /// the end of the previous month.
    pub fn new(date_from: NaiveDate, date_to: NaiveDate) -> Self {
        let from = calendar::month_start(date_from);
        let to = if calendar::is_month_end(date_to) {
            date_to
        } else {
            calendar::previous_month_end(date_to)
        };

        Self {
            from,
            to,
            months: calendar::month_labels(from, to),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }
}

#[derive(Debug, Serialize)]
struct HistoryQuery {
    symbol: u64,
    from_date: String,
    to_date: String,
    interval: &'static str,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    close: Vec<f64>,
}

#[derive(Debug, Serialize)]
struct SearchQuery<'a> {
    query: &'a str,
    limit: usize,
}

/// One hit of the instrument search
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstrumentMatch {
    /// Id to configure under `[investing.instruments]`
    #[serde(rename = "ticker", deserialize_with = "instrument_id")]
    pub id: u64,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub exchange: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

/// Ids come back as numbers or as numeric strings
fn instrument_id<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Number(u64),
        Text(String),
    }

    match Id::deserialize(deserializer)? {
        Id::Number(id) => Ok(id),
        Id::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl InvestingSource {
    pub fn new(settings: Arc<Settings>, cache: Arc<dyn ResponseCache>) -> Result<Self> {
        let client = http_client(Source::Investing, settings.request_timeout())?;
        Ok(Self {
            settings,
            cache,
            client,
        })
    }

    async fn fetch_history(&self, query: &HistoryQuery) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(&self.settings.investing.endpoint)
            .query(query)
            .send()
            .await
            .map_err(|e| transport_error(Source::Investing, e))?;

        check_status(Source::Investing, &response)?;
        read_body(Source::Investing, response).await
    }

    /// Look up instrument ids by name or ticker, e.g. `EUR/RSD`. Never cached.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<InstrumentMatch>> {
        let response = self
            .client
            .get(&self.settings.investing.search_endpoint)
            .query(&SearchQuery {
                query: query.trim(),
                limit,
            })
            .send()
            .await
            .map_err(|e| transport_error(Source::Investing, e))?;

        check_status(Source::Investing, &response)?;
        let body = read_body(Source::Investing, response).await?;
        let matches = parse_search(&body)?;

        log::info!("investing: {} matches for '{}'", matches.len(), query.trim());
        Ok(matches)
    }

    async fn fetch_instrument(
        &self,
        pair: &str,
        instrument: u64,
        window: &MonthlyWindow,
        fetch: &FetchWindow,
    ) -> Result<Vec<RateRecord>> {
        let currency = quote_currency(pair)?;
        let query = HistoryQuery {
            symbol: instrument,
            from_date: calendar::us_date(window.from),
            to_date: calendar::us_date(window.to),
            interval: "M",
        };
        let key = format!(
            "{}:M|{}|{}--{}--{}",
            Source::Investing,
            instrument,
            pair,
            query.from_date,
            query.to_date
        );

        match self.cache.get(&key) {
            Some(body) => {
                log::info!("investing: getting {} from cache", pair);
                parse_history(&body, currency, &window.months)
            }
            None => {
                log::info!("investing: getting {} via API", pair);
                let body = self.fetch_history(&query).await?;
                let records = parse_history(&body, currency, &window.months)?;
                store_response(self.cache.as_ref(), &key, body, fetch, window.to);
                Ok(records)
            }
        }
    }
}

/// Parse an instrument search answer
pub fn parse_search(body: &[u8]) -> Result<Vec<InstrumentMatch>> {
    serde_json::from_slice(body).map_err(|e| {
        FxError::malformed(Source::Investing, format!("search parse error: {}", e))
    })
}

/// Pair each close with its month, oldest first
pub fn parse_history(body: &[u8], currency: &str, months: &[String]) -> Result<Vec<RateRecord>> {
    let response: HistoryResponse = serde_json::from_slice(body).map_err(|e| {
        FxError::malformed(Source::Investing, format!("JSON parse error: {}", e))
    })?;

    if response.close.len() != months.len() {
        return Err(FxError::malformed(
            Source::Investing,
            format!(
                "{}: expected {} monthly values for {}..{}, got {}",
                currency,
                months.len(),
                months.first().map(String::as_str).unwrap_or("-"),
                months.last().map(String::as_str).unwrap_or("-"),
                response.close.len()
            ),
        ));
    }

    months
        .iter()
        .zip(response.close)
        .map(|(month, close)| {
            RateRecord::monthly(currency, month.as_str(), close, Source::Investing)
                .map_err(|e| FxError::malformed(Source::Investing, e.to_string()))
        })
        .collect()
}

impl RateSource for InvestingSource {
    fn source(&self) -> Source {
        Source::Investing
    }

    async fn fetch(&self, fetch: &FetchWindow) -> Result<Vec<RateRecord>> {
        let window = MonthlyWindow::new(fetch.date_from, fetch.date_to);
        if window.is_empty() {
            log::info!(
                "investing: no full month between {} and {}, nothing to fetch",
                fetch.date_from,
                fetch.date_to
            );
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for (pair, instrument) in &self.settings.investing.instruments {
            records.extend(
                self.fetch_instrument(pair, *instrument, &window, fetch)
                    .await?,
            );
        }

        log::debug!("investing: {} observations", records.len());
        Ok(dedup_records(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Frequency;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_window_keeps_full_months() {
        let window = MonthlyWindow::new(d(2022, 8, 1), d(2022, 9, 30));
        assert_eq!(window.to, d(2022, 9, 30));
        assert_eq!(window.months, vec!["2022-08", "2022-09"]);
    }

    #[test]
    fn test_window_drops_partial_month() {
        let window = MonthlyWindow::new(d(2022, 8, 1), d(2022, 10, 14));
        assert_eq!(window.to, d(2022, 9, 30));
        assert_eq!(window.months, vec!["2022-08", "2022-09"]);
        assert_eq!(calendar::us_date(window.to), "09/30/2022");
    }

    #[test]
    fn test_window_can_be_empty() {
        let window = MonthlyWindow::new(d(2022, 8, 1), d(2022, 8, 20));
        assert!(window.is_empty());
    }

    #[test]
    fn test_parse_history_aligns_months() {
        let months = vec!["2022-08".to_string(), "2022-09".to_string()];
        let body = br#"{"open": [117.3, 117.2], "close": [117.25, 117.31]}"#;

        let records = parse_history(body, "RSD", &months).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].ts, "2022-08");
        assert_eq!(records[1].ts, "2022-09");
        assert!((records[1].value - 117.31).abs() < 1e-9);
        assert!(records
            .iter()
            .all(|r| r.freq == Frequency::Monthly && r.source == Source::Investing));
    }

    #[test]
    fn test_parse_search_accepts_text_and_numeric_ids() {
        let body = br#"[
            {"symbol": "EUR/RSD", "full_name": "EUR/RSD", "description": "Euro Serbian Dinar",
             "type": "forex", "ticker": "1690", "exchange": "Forex"},
            {"symbol": "EUR/KZT", "ticker": 1656}
        ]"#;

        let matches = parse_search(body).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, 1690);
        assert_eq!(matches[0].kind, "forex");
        assert_eq!(matches[0].description, "Euro Serbian Dinar");
        assert_eq!(matches[1].id, 1656);
        assert!(matches[1].exchange.is_empty());
    }

    #[test]
    fn test_parse_search_rejects_bad_id() {
        let err = parse_search(br#"[{"symbol": "EUR/RSD", "ticker": "n/a"}]"#).unwrap_err();
        assert!(matches!(
            err,
            FxError::MalformedPayload {
                origin: Source::Investing,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_history_rejects_misaligned_series() {
        let months = vec!["2022-08".to_string(), "2022-09".to_string()];
        let body = br#"{"close": [117.25]}"#;

        let err = parse_history(body, "RSD", &months).unwrap_err();
        assert!(matches!(
            err,
            FxError::MalformedPayload {
                origin: Source::Investing,
                ..
            }
        ));
        assert!(err.to_string().contains("expected 2"));
    }
}
