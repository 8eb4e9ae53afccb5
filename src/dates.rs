//! Date handling for note timestamps and earliest-occurrence dates.
//!
//! Dates arrive as free-form strings: ISO timestamps, `m/d/Y`, spelled-out
//! month names, sometimes with surrounding prose. We pull out the calendar
//! date and ignore time-of-day entirely; folding time back in is possible if
//! we ever need that granularity.
//!
//! The same handful of strings repeat millions of times across batch files,
//! so both the parser and the comparator memoize on the raw input.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::CountError;

/// Parses free-form date strings to `NaiveDate`, caching by exact input.
///
/// The cache is unbounded; distinct date strings are few relative to note
/// volume, so this is fine for a single batch run. Failures are not cached.
#[derive(Debug, Default)]
pub struct DateParser {
    cache: HashMap<String, NaiveDate>,
}

impl DateParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&mut self, raw: &str) -> Result<NaiveDate, CountError> {
        if let Some(date) = self.cache.get(raw) {
            return Ok(*date);
        }
        let date = extract_date(raw).ok_or_else(|| CountError::DateUnparseable {
            input: raw.to_owned(),
        })?;
        self.cache.insert(raw.to_owned(), date);
        Ok(date)
    }
}

/// Decides whether one raw date string is chronologically on or before
/// another, memoized on the exact string pair.
#[derive(Debug, Default)]
pub struct DateOrder {
    parser: DateParser,
    cache: HashMap<(String, String), bool>,
}

impl DateOrder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff `candidate` falls on or after `earliest`, comparing calendar
    /// dates only. Parse failures on either side propagate.
    pub fn on_or_after(&mut self, earliest: &str, candidate: &str) -> Result<bool, CountError> {
        let key = (earliest.to_owned(), candidate.to_owned());
        if let Some(v) = self.cache.get(&key) {
            return Ok(*v);
        }
        let v = self.parser.parse(earliest)? <= self.parser.parse(candidate)?;
        self.cache.insert(key, v);
        Ok(v)
    }
}

/// Find a calendar date anywhere in `raw`.
///
/// Patterns are tried most-specific first; year-first forms win over
/// month-first ones so ISO timestamps are never misread.
fn extract_date(raw: &str) -> Option<NaiveDate> {
    static YMD: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\b(\d{4})[-/](\d{1,2})[-/](\d{1,2})(?:\D|$)").unwrap());
    static MDY: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\b(\d{1,2})[-/](\d{1,2})[-/](\d{4})(?:\D|$)").unwrap());
    static MONTH_DAY_YEAR: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b",
        )
        .unwrap()
    });
    static DAY_MONTH_YEAR: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?\s+(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?,?\s+(\d{4})\b",
        )
        .unwrap()
    });

    if let Some(c) = YMD.captures(raw) {
        let (y, m, d) = (num(&c, 1), num(&c, 2) as u32, num(&c, 3) as u32);
        if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
            return Some(date);
        }
    }
    if let Some(c) = MONTH_DAY_YEAR.captures(raw) {
        let m = month_number(c.get(1).unwrap().as_str())?;
        let (d, y) = (num(&c, 2) as u32, num(&c, 3));
        if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
            return Some(date);
        }
    }
    if let Some(c) = DAY_MONTH_YEAR.captures(raw) {
        let m = month_number(c.get(2).unwrap().as_str())?;
        let (d, y) = (num(&c, 1) as u32, num(&c, 3));
        if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
            return Some(date);
        }
    }
    if let Some(c) = MDY.captures(raw) {
        let (a, b, y) = (num(&c, 1) as u32, num(&c, 2) as u32, num(&c, 3));
        // Month-first, swapping when the first number can't be a month.
        let (m, d) = if a > 12 && b <= 12 { (b, a) } else { (a, b) };
        if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
            return Some(date);
        }
    }
    None
}

fn num(captures: &regex::Captures, group: usize) -> i32 {
    // Guaranteed to be digits by the patterns above.
    captures.get(group).unwrap().as_str().parse().unwrap()
}

fn month_number(name: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let name = name.to_ascii_lowercase();
    MONTHS.iter().position(|m| *m == name).map(|i| i as u32 + 1)
}
