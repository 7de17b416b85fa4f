//! Normalized rate schema shared by every source and view

use crate::error::{FxError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder value for an expected but unavailable monthly observation
pub const MISSING_VALUE: f64 = -1.0;

/// Observation frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Frequency {
    /// One observation per business day, `ts` is `YYYY-MM-DD`
    Daily,
    /// One observation per calendar month, `ts` is `YYYY-MM`
    Monthly,
}

impl Frequency {
    /// Short code used by the upstream payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "D",
            Frequency::Monthly => "M",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "D" | "DAILY" => Ok(Frequency::Daily),
            "M" | "MONTHLY" => Ok(Frequency::Monthly),
            _ => Err(FxError::InvalidRecord(format!("Unknown frequency: {}", s))),
        }
    }

    /// Check that `ts` has exactly the layout this frequency requires
    pub fn validate_ts(&self, ts: &str) -> Result<()> {
        let ok = match self {
            Frequency::Daily => {
                ts.len() == 10 && NaiveDate::parse_from_str(ts, "%Y-%m-%d").is_ok()
            }
            Frequency::Monthly => {
                ts.len() == 7
                    && NaiveDate::parse_from_str(&format!("{}-01", ts), "%Y-%m-%d").is_ok()
            }
        };

        if ok {
            Ok(())
        } else {
            Err(FxError::InvalidRecord(format!(
                "ts '{}' does not match {} frequency",
                ts, self
            )))
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provenance of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Source {
    /// European Central Bank statistical data warehouse
    Ecb,
    /// apilayer.com exchangerates_data (commercial, quota limited)
    Apilayer,
    /// investing.com monthly quote history
    Investing,
}

impl Source {
    /// All sources in artifact naming order
    pub const ALL: [Source; 3] = [Source::Ecb, Source::Apilayer, Source::Investing];

    /// Short name written into reports and file names
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Ecb => "ecb",
            Source::Apilayer => "apilayer",
            Source::Investing => "investing",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ecb" => Ok(Source::Ecb),
            "apilayer" => Ok(Source::Apilayer),
            "investing" | "investiny" => Ok(Source::Investing),
            _ => Err(FxError::InvalidRecord(format!("Unknown source: {}", s))),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One normalized FX observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    pub currency: String,
    pub ts: String,
    pub value: f64,
    pub freq: Frequency,
    pub source: Source,
}

impl RateRecord {
    /// Create a record, rejecting a `ts` that does not match `freq` and non-finite values
    pub fn new(
        currency: impl Into<String>,
        ts: impl Into<String>,
        value: f64,
        freq: Frequency,
        source: Source,
    ) -> Result<Self> {
        let currency = currency.into();
        let ts = ts.into();

        if currency.trim().is_empty() {
            return Err(FxError::InvalidRecord("empty currency code".to_string()));
        }
        if !value.is_finite() {
            return Err(FxError::InvalidRecord(format!(
                "non-finite value for {} at {}",
                currency, ts
            )));
        }
        freq.validate_ts(&ts)?;

        Ok(Self {
            currency,
            ts,
            value,
            freq,
            source,
        })
    }

    /// Daily record
    pub fn daily(
        currency: impl Into<String>,
        ts: impl Into<String>,
        value: f64,
        source: Source,
    ) -> Result<Self> {
        Self::new(currency, ts, value, Frequency::Daily, source)
    }

    /// Monthly record
    pub fn monthly(
        currency: impl Into<String>,
        ts: impl Into<String>,
        value: f64,
        source: Source,
    ) -> Result<Self> {
        Self::new(currency, ts, value, Frequency::Monthly, source)
    }

    /// `YYYY-MM` period this record belongs to
    pub fn period(&self) -> &str {
        self.ts.get(..7).unwrap_or(&self.ts)
    }

    /// Drop the frequency, keeping the report columns
    pub fn to_row(&self) -> ViewRow {
        ViewRow {
            currency: self.currency.clone(),
            ts: self.ts.clone(),
            value: self.value,
            source: self.source,
        }
    }
}

/// A report row: a [`RateRecord`] without its frequency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRow {
    pub currency: String,
    pub ts: String,
    pub value: f64,
    pub source: Source,
}

impl ViewRow {
    /// True for gap-fill placeholders
    pub fn is_placeholder(&self) -> bool {
        self.value == MISSING_VALUE
    }
}

/// Ordered rows of one report sheet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportView {
    rows: Vec<ViewRow>,
}

impl ReportView {
    /// Column set every view exposes, empty or not
    pub const COLUMNS: [&'static str; 4] = ["currency", "ts", "value", "source"];

    pub fn new(rows: Vec<ViewRow>) -> Self {
        Self { rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &'static [&'static str] {
        &Self::COLUMNS
    }

    pub fn rows(&self) -> &[ViewRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ViewRow> {
        self.rows.iter()
    }
}

/// The three sheets of a report
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportViews {
    pub daily: ReportView,
    pub spot: ReportView,
    pub monthly: ReportView,
}

impl ReportViews {
    /// Sheet names paired with their views, in workbook order
    pub fn sheets(&self) -> [(&'static str, &ReportView); 3] {
        [
            ("daily", &self.daily),
            ("spot", &self.spot),
            ("monthly", &self.monthly),
        ]
    }
}

/// Which sources a request should use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSelection {
    pub ecb: bool,
    pub commercial: bool,
    pub quote_history: bool,
}

impl SourceSelection {
    pub fn all() -> Self {
        Self {
            ecb: true,
            commercial: true,
            quote_history: true,
        }
    }

    pub fn none() -> Self {
        Self {
            ecb: false,
            commercial: false,
            quote_history: false,
        }
    }

    pub fn only(source: Source) -> Self {
        Self {
            ecb: source == Source::Ecb,
            commercial: source == Source::Apilayer,
            quote_history: source == Source::Investing,
        }
    }

    pub fn is_enabled(&self, source: Source) -> bool {
        match source {
            Source::Ecb => self.ecb,
            Source::Apilayer => self.commercial,
            Source::Investing => self.quote_history,
        }
    }

    /// Enabled sources in naming order
    pub fn active(&self) -> Vec<Source> {
        Source::ALL
            .into_iter()
            .filter(|s| self.is_enabled(*s))
            .collect()
    }

    pub fn is_all(&self) -> bool {
        self.ecb && self.commercial && self.quote_history
    }
}

impl Default for SourceSelection {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ts_must_match_frequency() {
        assert!(RateRecord::daily("USD", "2022-08-01", 1.02, Source::Ecb).is_ok());
        assert!(RateRecord::monthly("USD", "2022-08", 1.01, Source::Ecb).is_ok());
        assert!(RateRecord::daily("USD", "2022-08", 1.02, Source::Ecb).is_err());
        assert!(RateRecord::monthly("USD", "2022-08-01", 1.02, Source::Ecb).is_err());
        assert!(RateRecord::monthly("USD", "2022-13", 1.02, Source::Ecb).is_err());
    }

    #[test]
    fn test_value_is_never_nan() {
        let err = RateRecord::daily("USD", "2022-08-01", f64::NAN, Source::Ecb);
        assert!(matches!(err, Err(FxError::InvalidRecord(_))));
    }

    #[test]
    fn test_frequency_parsing() {
        assert_eq!(Frequency::from_str("D").unwrap(), Frequency::Daily);
        assert_eq!(Frequency::from_str("m").unwrap(), Frequency::Monthly);
        assert!(Frequency::from_str("Q").is_err());
    }

    #[test]
    fn test_source_names() {
        assert_eq!(Source::Ecb.to_string(), "ecb");
        assert_eq!(Source::from_str("APILAYER").unwrap(), Source::Apilayer);
        assert_eq!(Source::from_str("investing").unwrap(), Source::Investing);
    }

    #[test]
    fn test_selection_active_order() {
        let sel = SourceSelection {
            ecb: false,
            commercial: true,
            quote_history: true,
        };
        assert_eq!(sel.active(), vec![Source::Apilayer, Source::Investing]);
        assert!(!sel.is_all());
        assert!(SourceSelection::none().active().is_empty());
    }

    #[test]
    fn test_empty_view_has_columns() {
        let view = ReportView::empty();
        assert!(view.is_empty());
        assert_eq!(view.columns(), &["currency", "ts", "value", "source"]);
    }
}
