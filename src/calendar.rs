//! Calendar-month helpers for request windows

use crate::error::{FxError, Result};
use chrono::{Datelike, Months, NaiveDate};

/// Parse a `YYYY-MM` month string into the first day of that month
pub fn parse_month(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    if s.len() != 7 {
        return Err(FxError::InvalidRange(format!(
            "expected YYYY-MM, got '{}'",
            s
        )));
    }
    NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d")
        .map_err(|e| FxError::InvalidRange(format!("invalid month '{}': {}", s, e)))
}

/// First day of the month containing `date`
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Last day of the month containing `date`
pub fn month_end(date: NaiveDate) -> NaiveDate {
    let start = month_start(date);
    start
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}

/// True when `date` is the last calendar day of its month
pub fn is_month_end(date: NaiveDate) -> bool {
    month_end(date) == date
}

/// Last day of the month before the one containing `date`
pub fn previous_month_end(date: NaiveDate) -> NaiveDate {
    month_start(date).pred_opt().unwrap_or(date)
}

/// `YYYY-MM` label of the month containing `date`
pub fn month_label(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// `MM/DD/YYYY`, as the quote-history API expects
pub fn us_date(date: NaiveDate) -> String {
    date.format("%m/%d/%Y").to_string()
}

/// Consecutive `YYYY-MM` labels from the month of `from` through the month of `to`
///
/// Returns an empty list when `to` falls in an earlier month than `from`.
pub fn month_labels(from: NaiveDate, to: NaiveDate) -> Vec<String> {
    let mut labels = Vec::new();
    let last = month_start(to);
    let mut cursor = month_start(from);

    while cursor <= last {
        labels.push(month_label(cursor));
        cursor = match cursor.checked_add_months(Months::new(1)) {
            Some(next) => next,
            None => break,
        };
    }

    labels
}

/// Month options offered to a caller: `years` back from `today`, newest first
pub fn selectable_months(today: NaiveDate, years: u32) -> Vec<String> {
    let first = today
        .checked_sub_months(Months::new(years * 12))
        .unwrap_or(today);
    let mut labels = month_labels(first, today);
    labels.reverse();
    labels
}

/// Calendar-day count of the closed interval, zero when inverted
pub fn days_inclusive(from: NaiveDate, to: NaiveDate) -> usize {
    if to < from {
        0
    } else {
        (to - from).num_days() as usize + 1
    }
}

/// Iterate over each calendar day of the closed interval
pub fn days(from: NaiveDate, to: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    from.iter_days().take_while(move |d| *d <= to)
}
