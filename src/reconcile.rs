//! Period reconciliation: daily, spot (month-end) and monthly views
//!
//! All three views are derived from the concatenation of every source's records.
//! Cross-source duplicates are kept on purpose, each row carries its source.

use crate::types::{Frequency, RateRecord, ReportView, ReportViews, Source, MISSING_VALUE};
use hashbrown::HashSet;
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Builds report views from normalized records
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    /// Currencies expected in every monthly period; gaps become placeholders
    gap_fill_symbols: Vec<String>,
}

impl Reconciler {
    pub fn new<I, S>(gap_fill_symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut symbols: Vec<String> = Vec::new();
        for symbol in gap_fill_symbols {
            let symbol = symbol.into();
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }
        Self {
            gap_fill_symbols: symbols,
        }
    }

    pub fn gap_fill_symbols(&self) -> &[String] {
        &self.gap_fill_symbols
    }

    /// Derive all three views
    pub fn reconcile(&self, records: &[RateRecord]) -> ReportViews {
        let views = ReportViews {
            daily: daily_view(records),
            spot: spot_view(records),
            monthly: monthly_view(records, &self.gap_fill_symbols),
        };

        log::debug!(
            "reconciled {} records into daily={} spot={} monthly={}",
            records.len(),
            views.daily.len(),
            views.spot.len(),
            views.monthly.len()
        );
        views
    }
}

fn by_currency_then_ts(a: &RateRecord, b: &RateRecord) -> Ordering {
    a.currency.cmp(&b.currency).then_with(|| a.ts.cmp(&b.ts))
}

fn of_frequency(records: &[RateRecord], freq: Frequency) -> Vec<&RateRecord> {
    records.iter().filter(|r| r.freq == freq).collect()
}

fn project(records: Vec<&RateRecord>) -> ReportView {
    ReportView::new(records.into_iter().map(RateRecord::to_row).collect())
}

/// Daily records sorted by `(currency, ts)`
///
/// The sort is stable: same-day rows from different sources keep their input order.
pub fn daily_view(records: &[RateRecord]) -> ReportView {
    let mut daily = of_frequency(records, Frequency::Daily);
    daily.sort_by(|a, b| by_currency_then_ts(a, b));
    project(daily)
}

/// One daily record per `(currency, year, month)`: the latest `ts` of that month
///
/// When several sources report the latest day, the first in input order wins.
pub fn spot_view(records: &[RateRecord]) -> ReportView {
    let mut daily = of_frequency(records, Frequency::Daily);
    daily.sort_by(|a, b| b.ts.cmp(&a.ts));

    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    let mut spot: Vec<&RateRecord> = daily
        .into_iter()
        .filter(|r| seen.insert((r.currency.as_str(), r.period())))
        .collect();

    spot.sort_by(|a, b| by_currency_then_ts(a, b));
    project(spot)
}

/// Monthly records plus `-1` apilayer placeholders for every expected currency missing
/// from a period, sorted by value descending, then `(currency, ts)`
pub fn monthly_view(records: &[RateRecord], gap_fill_symbols: &[String]) -> ReportView {
    let monthly = of_frequency(records, Frequency::Monthly);

    let periods: BTreeSet<&str> = monthly.iter().map(|r| r.ts.as_str()).collect();
    let present: HashSet<(&str, &str)> = monthly
        .iter()
        .map(|r| (r.currency.as_str(), r.ts.as_str()))
        .collect();

    let placeholders: Vec<RateRecord> = gap_fill_symbols
        .iter()
        .flat_map(|currency| periods.iter().map(move |ts| (currency, *ts)))
        .filter(|(currency, ts)| !present.contains(&(currency.as_str(), *ts)))
        .map(|(currency, ts)| RateRecord {
            currency: currency.clone(),
            ts: ts.to_string(),
            value: MISSING_VALUE,
            freq: Frequency::Monthly,
            source: Source::Apilayer,
        })
        .collect();

    if !placeholders.is_empty() {
        log::info!(
            "monthly view: {} missing observations filled with {}",
            placeholders.len(),
            MISSING_VALUE
        );
    }

    let mut rows: Vec<&RateRecord> = monthly;
    rows.extend(placeholders.iter());
    rows.sort_by(|a, b| {
        b.value
            .total_cmp(&a.value)
            .then_with(|| by_currency_then_ts(a, b))
    });
    project(rows)
}
