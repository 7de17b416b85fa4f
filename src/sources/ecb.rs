//! ECB statistical data warehouse
//!
//! One call returns both daily (`D`) and monthly average (`M`) reference rates for
//! every configured currency against the base currency, as CSV.

use super::{
    cache_key, check_status, dedup_records, http_client, read_body, store_response,
    transport_error, FetchWindow, RateSource,
};
use crate::cache::ResponseCache;
use crate::config::Settings;
use crate::error::{FxError, Result};
use crate::types::{Frequency, RateRecord, Source};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// ECB exchange rate source
pub struct EcbSource {
    settings: Arc<Settings>,
    cache: Arc<dyn ResponseCache>,
    client: Client,
}

#[derive(Debug, Serialize)]
struct EcbQuery {
    format: &'static str,
    #[serde(rename = "startPeriod")]
    start_period: String,
    #[serde(rename = "endPeriod")]
    end_period: String,
}

#[derive(Serialize)]
struct EcbCacheKey<'a> {
    #[serde(flatten)]
    query: &'a EcbQuery,
    symbols: String,
    base: &'a str,
}

#[derive(Debug, Deserialize)]
struct EcbRow {
    #[serde(rename = "CURRENCY")]
    currency: String,
    #[serde(rename = "FREQ")]
    freq: String,
    #[serde(rename = "TIME_PERIOD")]
    time_period: String,
    #[serde(rename = "OBS_VALUE")]
    obs_value: Option<f64>,
}

impl EcbSource {
    pub fn new(settings: Arc<Settings>, cache: Arc<dyn ResponseCache>) -> Result<Self> {
        let client = http_client(Source::Ecb, settings.request_timeout())?;
        Ok(Self {
            settings,
            cache,
            client,
        })
    }

    /// Series key, e.g. `D+M.USD+CZK.EUR.SP00.A`
    fn series_url(&self) -> String {
        format!(
            "{}D+M.{}.{}.SP00.A",
            self.settings.ecb.endpoint,
            self.settings.ecb.symbols.join("+"),
            self.settings.base
        )
    }

    async fn fetch_csv(&self, query: &EcbQuery) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(self.series_url())
            .query(query)
            .send()
            .await
            .map_err(|e| transport_error(Source::Ecb, e))?;

        check_status(Source::Ecb, &response)?;
        read_body(Source::Ecb, response).await
    }
}

/// Parse an ECB `csvdata` payload; rows without an observation are skipped
pub fn parse_csv(body: &[u8]) -> Result<Vec<RateRecord>> {
    let mut reader = csv::Reader::from_reader(body);
    let mut records = Vec::new();

    for result in reader.deserialize() {
        let row: EcbRow = result
            .map_err(|e| FxError::malformed(Source::Ecb, format!("CSV parse error: {}", e)))?;

        let value = match row.obs_value {
            Some(value) => value,
            None => {
                log::debug!(
                    "ecb: no observation for {} at {}",
                    row.currency,
                    row.time_period
                );
                continue;
            }
        };

        let record = Frequency::from_str(&row.freq)
            .and_then(|freq| {
                RateRecord::new(row.currency, row.time_period, value, freq, Source::Ecb)
            })
            .map_err(|e| FxError::malformed(Source::Ecb, e.to_string()))?;
        records.push(record);
    }

    Ok(dedup_records(records))
}

impl RateSource for EcbSource {
    fn source(&self) -> Source {
        Source::Ecb
    }

    async fn fetch(&self, window: &FetchWindow) -> Result<Vec<RateRecord>> {
        let FetchWindow {
            date_from, date_to, ..
        } = *window;
        let query = EcbQuery {
            format: "csvdata",
            start_period: date_from.format("%Y-%m-%d").to_string(),
            end_period: date_to.format("%Y-%m-%d").to_string(),
        };
        let key = cache_key(
            Source::Ecb,
            &EcbCacheKey {
                query: &query,
                symbols: self.settings.ecb.symbols.join("+"),
                base: &self.settings.base,
            },
        )?;

        let records = match self.cache.get(&key) {
            Some(body) => {
                log::info!(
                    "ecb: getting data from cache ({} to {})",
                    date_from,
                    date_to
                );
                parse_csv(&body)?
            }
            None => {
                log::info!("ecb: getting data via API ({} to {})", date_from, date_to);
                let body = self.fetch_csv(&query).await?;
                let records = parse_csv(&body)?;
                store_response(self.cache.as_ref(), &key, body, window, date_to);
                records
            }
        };

        log::debug!("ecb: {} observations", records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
KEY,FREQ,CURRENCY,CURRENCY_DENOM,EXR_TYPE,EXR_SUFFIX,TIME_PERIOD,OBS_VALUE,OBS_STATUS
EXR.D.BGN.EUR.SP00.A,D,BGN,EUR,SP00,A,2022-08-01,1.9558,A
EXR.D.BGN.EUR.SP00.A,D,BGN,EUR,SP00,A,2022-08-02,1.9558,A
EXR.D.USD.EUR.SP00.A,D,USD,EUR,SP00,A,2022-08-01,1.0233,A
EXR.D.USD.EUR.SP00.A,D,USD,EUR,SP00,A,2022-08-02,,M
EXR.M.USD.EUR.SP00.A,M,USD,EUR,SP00,A,2022-08,1.012843,A
";

    #[test]
    fn test_csv_parsing() {
        let records = parse_csv(SAMPLE.as_bytes()).unwrap();
        assert_eq!(records.len(), 4);

        assert_eq!(records[0].currency, "BGN");
        assert_eq!(records[0].freq, Frequency::Daily);
        assert_eq!(records[0].ts, "2022-08-01");
        assert!((records[0].value - 1.9558).abs() < 1e-9);

        let monthly = records.last().unwrap();
        assert_eq!(monthly.freq, Frequency::Monthly);
        assert_eq!(monthly.ts, "2022-08");
        assert!(records.iter().all(|r| r.source == Source::Ecb));
    }

    #[test]
    fn test_mismatched_period_is_malformed() {
        let csv = "FREQ,CURRENCY,TIME_PERIOD,OBS_VALUE\nM,USD,2022-08-01,1.0\n";
        let err = parse_csv(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, FxError::MalformedPayload { origin: Source::Ecb, .. }));
    }

    #[test]
    fn test_missing_column_is_malformed() {
        let csv = "FREQ,TIME_PERIOD,OBS_VALUE\nD,2022-08-01,1.0\n";
        assert!(parse_csv(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_series_url() {
        let source = EcbSource::new(
            Arc::new(Settings::default()),
            Arc::new(crate::cache::NoCache),
        )
        .unwrap();
        assert_eq!(
            source.series_url(),
            "https://sdw-wsrest.ecb.europa.eu/service/data/EXR/D+M.USD+CZK+HUF+RON+TRY+BGN.EUR.SP00.A"
        );
    }
}
