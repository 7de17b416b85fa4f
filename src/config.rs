//! Runtime settings, loaded once and passed explicitly

use crate::error::{FxError, Result};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Currency every rate is quoted against
    pub base: String,
    pub ecb: EcbSettings,
    pub apilayer: ApilayerSettings,
    pub investing: InvestingSettings,
    /// Upper bound for every upstream HTTP call
    pub request_timeout_secs: u64,
    /// Directory the xlsx artifacts are written to
    pub output_dir: PathBuf,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EcbSettings {
    pub endpoint: String,
    /// Daily and monthly series are both available here
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApilayerSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    /// Daily only. Also drives the monthly gap-fill.
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvestingSettings {
    pub endpoint: String,
    /// Instrument lookup, used to find ids for new pairs
    pub search_endpoint: String,
    /// Pair (`EUR/RSD`) to investing.com instrument id
    pub instruments: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Lifetime of responses whose window reaches today
    pub volatile_ttl_secs: u64,
    pub max_entries: usize,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for EcbSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://sdw-wsrest.ecb.europa.eu/service/data/EXR/".to_string(),
            symbols: strings(&["USD", "CZK", "HUF", "RON", "TRY", "BGN"]),
        }
    }
}

impl Default for ApilayerSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.apilayer.com/exchangerates_data/".to_string(),
            api_key: None,
            symbols: strings(&["RSD", "KZT", "UAH", "UZS"]),
        }
    }
}

impl Default for InvestingSettings {
    fn default() -> Self {
        let instruments = [
            ("EUR/RSD", 1690),
            ("EUR/KZT", 1656),
            ("EUR/UAH", 1709),
            ("EUR/UZS", 1712),
        ]
        .into_iter()
        .map(|(pair, id)| (pair.to_string(), id))
        .collect();

        Self {
            endpoint: "https://tvc6.investing.com/history".to_string(),
            search_endpoint: "https://tvc6.investing.com/search".to_string(),
            instruments,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            volatile_ttl_secs: 3600,
            max_entries: 512,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base: "EUR".to_string(),
            ecb: EcbSettings::default(),
            apilayer: ApilayerSettings::default(),
            investing: InvestingSettings::default(),
            request_timeout_secs: 30,
            output_dir: PathBuf::from("tmp"),
            cache: CacheSettings::default(),
        }
    }
}

impl Settings {
    /// Parse settings from TOML; missing keys fall back to defaults
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(contents)
            .map_err(|e| FxError::ConfigError(format!("Failed to parse config: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from a TOML file, then apply `FX_*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => {
                let contents = fs::read_to_string(path).map_err(|e| {
                    FxError::ConfigError(format!(
                        "Failed to read config {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Self::from_toml_str(&contents)?
            }
            None => Settings::default(),
        };

        settings.apply_env(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Environment always takes priority over the file
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base) = lookup("FX_BASE") {
            self.base = base.trim().to_uppercase();
        }
        if let Some(symbols) = lookup("FX_ECB_SYMBOLS") {
            self.ecb.symbols = split_symbols(&symbols, '+');
        }
        if let Some(endpoint) = lookup("FX_ECB_ENDPOINT") {
            self.ecb.endpoint = endpoint;
        }
        if let Some(key) = lookup("FX_APILAYER_API_KEY") {
            self.apilayer.api_key = Some(key);
        }
        if let Some(symbols) = lookup("FX_APILAYER_SYMBOLS") {
            self.apilayer.symbols = split_symbols(&symbols, ',');
        }
        if let Some(endpoint) = lookup("FX_APILAYER_ENDPOINT") {
            self.apilayer.endpoint = endpoint;
        }
        if let Some(endpoint) = lookup("FX_INVESTING_ENDPOINT") {
            self.investing.endpoint = endpoint;
        }
        if let Some(endpoint) = lookup("FX_INVESTING_SEARCH_ENDPOINT") {
            self.investing.search_endpoint = endpoint;
        }
        if let Some(dir) = lookup("FX_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(secs) = lookup("FX_REQUEST_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.request_timeout_secs = secs;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.base.len() != 3 {
            return Err(FxError::ConfigError(format!(
                "base currency must be a 3-letter code, got '{}'",
                self.base
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(FxError::ConfigError(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        // records are keyed by quote currency, so two pairs may not share one
        let mut quotes: HashMap<&str, &str> = HashMap::new();
        for pair in self.investing.instruments.keys() {
            let quote = quote_currency(pair)?;
            if let Some(other) = quotes.insert(quote, pair.as_str()) {
                return Err(FxError::ConfigError(format!(
                    "instruments '{}' and '{}' both quote {}",
                    other, pair, quote
                )));
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The apilayer key, required only when that source is used
    pub fn apilayer_key(&self) -> Result<&str> {
        self.apilayer
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                FxError::ConfigError("apilayer api_key is not configured".to_string())
            })
    }

    /// Human readable pair list: `EUR/USD, EUR/CZK`
    pub fn pair_labels(&self, symbols: &[String]) -> String {
        symbols
            .iter()
            .map(|s| format!("{}/{}", self.base, s))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Quote side of a `BASE/QUOTE` pair
pub fn quote_currency(pair: &str) -> Result<&str> {
    match pair.split_once('/') {
        Some((base, quote)) if !base.is_empty() && !quote.is_empty() => Ok(quote),
        _ => Err(FxError::ConfigError(format!(
            "instrument pair must look like 'EUR/RSD', got '{}'",
            pair
        ))),
    }
}

fn split_symbols(s: &str, sep: char) -> Vec<String> {
    s.split(sep)
        .map(|x| x.trim().to_uppercase())
        .filter(|x| !x.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.base, "EUR");
        assert_eq!(settings.ecb.symbols.len(), 6);
        assert_eq!(settings.apilayer.symbols, vec!["RSD", "KZT", "UAH", "UZS"]);
        assert_eq!(settings.investing.instruments.get("EUR/RSD"), Some(&1690));
        assert_eq!(settings.request_timeout(), Duration::from_secs(30));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            base = "EUR"
            output_dir = "/tmp/fx"

            [apilayer]
            api_key = "secret"
            symbols = ["RSD", "KZT"]
            "#,
        )
        .unwrap();

        assert_eq!(settings.apilayer.symbols, vec!["RSD", "KZT"]);
        assert_eq!(settings.apilayer_key().unwrap(), "secret");
        assert_eq!(settings.ecb.symbols.len(), 6);
        assert_eq!(settings.output_dir, PathBuf::from("/tmp/fx"));
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::default();
        settings.apply_env(|key| match key {
            "FX_APILAYER_API_KEY" => Some("k3y".to_string()),
            "FX_ECB_SYMBOLS" => Some("usd+chf".to_string()),
            "FX_REQUEST_TIMEOUT_SECS" => Some("5".to_string()),
            _ => None,
        });

        assert_eq!(settings.apilayer_key().unwrap(), "k3y");
        assert_eq!(settings.ecb.symbols, vec!["USD", "CHF"]);
        assert_eq!(settings.request_timeout_secs, 5);
    }

    #[test]
    fn test_missing_api_key() {
        let settings = Settings::default();
        assert!(matches!(
            settings.apilayer_key(),
            Err(FxError::ConfigError(_))
        ));
    }

    #[test]
    fn test_bad_instrument_pair() {
        let result = Settings::from_toml_str(
            r#"
            [investing.instruments]
            "RSD" = 1690
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_shared_quote_currency_rejected() {
        let result = Settings::from_toml_str(
            r#"
            [investing.instruments]
            "EUR/RSD" = 1690
            "USD/RSD" = 2111
            "#,
        );
        match result {
            Err(FxError::ConfigError(msg)) => assert!(msg.contains("RSD")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_pair_labels() {
        let settings = Settings::default();
        let labels = settings.pair_labels(&["USD".to_string(), "CZK".to_string()]);
        assert_eq!(labels, "EUR/USD, EUR/CZK");
        assert_eq!(quote_currency("EUR/RSD").unwrap(), "RSD");
    }
}
