// Copyright 2025 the Rowflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Time handling for time-bearing columns.
//!
//! Time is modelled as a numeric value in **seconds** since the Unix epoch. A cell can carry
//! either a plain number (already seconds, e.g. a sensor's `Time_s[s]` column) or a calendar
//! date-time; [`Timestamp`] remembers which so output can be rendered in the same form.
//!
//! [`TimeSpan`] is the duration type used for resample buckets and as-of tolerances. It parses
//! the pandas-style offsets callers already know: `30S`, `5T`/`5min`, `1H`, `1D`.

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::numeric::{NumberFormat, format_numeric, try_parse_numeric};

/// Error returned when a [`TimeSpan`] string is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid time span `{input}`: {reason}")]
pub struct TimeSpanError {
    /// The rejected input.
    pub input: String,
    /// Why it was rejected.
    pub reason: &'static str,
}

/// Unit of a [`TimeSpan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeUnit {
    /// Seconds.
    Seconds,
    /// Minutes.
    Minutes,
    /// Hours.
    Hours,
    /// Days.
    Days,
}

impl TimeUnit {
    /// Length of one unit in seconds.
    pub fn seconds(self) -> f64 {
        match self {
            Self::Seconds => 1.0,
            Self::Minutes => 60.0,
            Self::Hours => 3_600.0,
            Self::Days => 86_400.0,
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        // `T` is the pandas alias for minutes; `M` (month) is deliberately not accepted.
        match suffix {
            "S" | "s" | "sec" | "secs" | "second" | "seconds" => Some(Self::Seconds),
            "T" | "t" | "min" | "mins" | "minute" | "minutes" => Some(Self::Minutes),
            "H" | "h" | "hour" | "hours" => Some(Self::Hours),
            "D" | "d" | "day" | "days" => Some(Self::Days),
            _ => None,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Self::Seconds => "S",
            Self::Minutes => "T",
            Self::Hours => "H",
            Self::Days => "D",
        }
    }
}

/// A positive duration expressed as `value × unit`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeSpan {
    value: f64,
    unit: TimeUnit,
}

impl TimeSpan {
    /// Creates a span; `value` must be finite and positive.
    pub fn new(value: f64, unit: TimeUnit) -> Result<Self, TimeSpanError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(TimeSpanError {
                input: format!("{}{}", format_numeric(value), unit.suffix()),
                reason: "the duration must be a positive number",
            });
        }
        Ok(Self { value, unit })
    }

    /// Span of `n` seconds.
    pub fn seconds(n: f64) -> Result<Self, TimeSpanError> {
        Self::new(n, TimeUnit::Seconds)
    }

    /// Span of `n` minutes.
    pub fn minutes(n: f64) -> Result<Self, TimeSpanError> {
        Self::new(n, TimeUnit::Minutes)
    }

    /// Span of `n` hours.
    pub fn hours(n: f64) -> Result<Self, TimeSpanError> {
        Self::new(n, TimeUnit::Hours)
    }

    /// Span of `n` days.
    pub fn days(n: f64) -> Result<Self, TimeSpanError> {
        Self::new(n, TimeUnit::Days)
    }

    /// The numeric part.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// The unit.
    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Total length in seconds.
    pub fn as_seconds(&self) -> f64 {
        self.value * self.unit.seconds()
    }
}

impl FromStr for TimeSpan {
    type Err = TimeSpanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let err = |reason| TimeSpanError {
            input: s.to_owned(),
            reason,
        };
        if trimmed.is_empty() {
            return Err(err("the span is empty"));
        }

        let split = trimmed
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(trimmed.len());
        let (number, suffix) = trimmed.split_at(split);
        let unit = TimeUnit::from_suffix(suffix.trim()).ok_or_else(|| {
            err("expected a unit of S (seconds), T/min (minutes), H (hours) or D (days)")
        })?;
        // A bare unit (`T`, `H`) means one of it.
        let value = if number.is_empty() {
            1.0
        } else {
            number
                .parse::<f64>()
                .map_err(|_| err("the duration is not a number"))?
        };
        Self::new(value, unit).map_err(|e| err(e.reason))
    }
}

impl TryFrom<String> for TimeSpan {
    type Error = TimeSpanError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeSpan> for String {
    fn from(span: TimeSpan) -> Self {
        span.to_string()
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", format_numeric(self.value), self.unit.suffix())
    }
}

/// How a timestamp was written in its source cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeForm {
    /// A bare number of seconds.
    Numeric,
    /// A calendar date or date-time.
    Calendar,
}

/// A parsed time cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timestamp {
    /// Seconds since the Unix epoch (or since an arbitrary origin for numeric cells).
    pub seconds: f64,
    /// The source representation.
    pub form: TimeForm,
}

const DATETIME_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
];

const DATE_LAYOUTS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Parses a time cell.
///
/// Numbers are taken as seconds. Otherwise RFC 3339 and a handful of common
/// `YYYY-MM-DD[ HH:MM[:SS[.fff]]]` layouts are accepted and interpreted as UTC.
pub fn try_parse_timestamp(cell: &str, format: &NumberFormat) -> Option<Timestamp> {
    if let Some(seconds) = try_parse_numeric(cell, format) {
        return Some(Timestamp {
            seconds,
            form: TimeForm::Numeric,
        });
    }

    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    let seconds = if let Ok(dt) = DateTime::parse_from_rfc3339(cell) {
        epoch_seconds(&dt.naive_utc())
    } else if let Some(ndt) = DATETIME_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(cell, layout).ok())
    {
        epoch_seconds(&ndt)
    } else {
        let date = DATE_LAYOUTS
            .iter()
            .find_map(|layout| NaiveDate::parse_from_str(cell, layout).ok())?;
        epoch_seconds(&date.and_hms_opt(0, 0, 0)?)
    };
    Some(Timestamp {
        seconds,
        form: TimeForm::Calendar,
    })
}

fn epoch_seconds(ndt: &NaiveDateTime) -> f64 {
    let utc = ndt.and_utc();
    let whole = utc.timestamp() as f64;
    whole + f64::from(utc.timestamp_subsec_nanos()) * 1e-9
}

/// Renders seconds in the given form.
///
/// Calendar output uses `YYYY-MM-DD HH:MM:SS`, with a fractional part only when one exists.
pub fn format_timestamp(seconds: f64, form: TimeForm) -> String {
    match form {
        TimeForm::Numeric => format_numeric(seconds),
        TimeForm::Calendar => {
            let whole = seconds.floor();
            let nanos = ((seconds - whole) * 1e9).round().clamp(0.0, 999_999_999.0);
            #[allow(
                clippy::cast_possible_truncation,
                reason = "whole is floored and nanos is clamped to the u32 range"
            )]
            let dt = DateTime::from_timestamp(whole as i64, nanos as u32);
            match dt {
                Some(dt) => dt.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
                None => format_numeric(seconds),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pandas_style_spans() {
        assert_eq!("5T".parse::<TimeSpan>().unwrap().as_seconds(), 300.0);
        assert_eq!("5min".parse::<TimeSpan>().unwrap().as_seconds(), 300.0);
        assert_eq!("1H".parse::<TimeSpan>().unwrap().as_seconds(), 3_600.0);
        assert_eq!("2d".parse::<TimeSpan>().unwrap().as_seconds(), 172_800.0);
        assert_eq!("30S".parse::<TimeSpan>().unwrap().as_seconds(), 30.0);
        assert_eq!("H".parse::<TimeSpan>().unwrap().as_seconds(), 3_600.0);
        assert_eq!("5T".parse::<TimeSpan>().unwrap().to_string(), "5T");
    }

    #[test]
    fn rejects_bad_spans() {
        for s in ["", "5", "5M", "0T", "-5T", "x5T", "1.2.3H"] {
            assert!(s.parse::<TimeSpan>().is_err(), "{s:?} should be rejected");
        }
    }

    #[test]
    fn numeric_cells_are_seconds() {
        let ts = try_parse_timestamp("12.5", &NumberFormat::default()).unwrap();
        assert_eq!(ts.seconds, 12.5);
        assert_eq!(ts.form, TimeForm::Numeric);
    }

    #[test]
    fn calendar_cells_are_epoch_seconds() {
        let f = NumberFormat::default();
        let a = try_parse_timestamp("1970-01-01 00:05:00", &f).unwrap();
        assert_eq!(a.seconds, 300.0);
        assert_eq!(a.form, TimeForm::Calendar);
        let b = try_parse_timestamp("1970-01-02", &f).unwrap();
        assert_eq!(b.seconds, 86_400.0);
        let c = try_parse_timestamp("1970-01-01T01:00:00+01:00", &f).unwrap();
        assert_eq!(c.seconds, 0.0);
        assert!(try_parse_timestamp("yesterday", &f).is_none());
    }

    #[test]
    fn formats_calendar_round_trip() {
        assert_eq!(
            format_timestamp(300.0, TimeForm::Calendar),
            "1970-01-01 00:05:00"
        );
        assert_eq!(format_timestamp(300.0, TimeForm::Numeric), "300");
    }
}
