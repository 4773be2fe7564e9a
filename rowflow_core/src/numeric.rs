// Copyright 2025 the Rowflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! On-demand numeric interpretation of text cells.
//!
//! Cells stay strings everywhere in Rowflow. Operators that need numbers call
//! [`try_parse_numeric`] and decide themselves whether a failure skips the cell or aborts; the
//! parser never panics and never consults global locale state.

use serde::{Deserialize, Serialize};

/// Separator characters used when reading numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberFormat {
    /// Character that separates the integer and fractional parts.
    pub decimal_separator: char,
    /// Thousands separator, removed before parsing.
    pub group_separator: Option<char>,
}

impl NumberFormat {
    /// `1,234.5`
    pub const INVARIANT: Self = Self {
        decimal_separator: '.',
        group_separator: Some(','),
    };

    /// `1.234,5`
    pub const CONTINENTAL: Self = Self {
        decimal_separator: ',',
        group_separator: Some('.'),
    };
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self::INVARIANT
    }
}

/// Returns `true` for cells that hold no value at all.
pub fn is_missing(cell: &str) -> bool {
    cell.trim().is_empty()
}

/// Parses a cell as a finite `f64`.
///
/// Leading and trailing whitespace is ignored, group separators are dropped, and the decimal
/// separator is mapped to `.`. Empty cells, malformed text, and values that parse to NaN or an
/// infinity all return `None`.
pub fn try_parse_numeric(cell: &str, format: &NumberFormat) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }

    let needs_rewrite = format.decimal_separator != '.'
        || format.group_separator.is_some_and(|g| cell.contains(g));
    let v = if needs_rewrite {
        let mut normalized = String::with_capacity(cell.len());
        for ch in cell.chars() {
            if Some(ch) == format.group_separator {
                continue;
            }
            if ch == format.decimal_separator {
                normalized.push('.');
            } else {
                normalized.push(ch);
            }
        }
        normalized.parse::<f64>().ok()?
    } else {
        cell.parse::<f64>().ok()?
    };

    v.is_finite().then_some(v)
}

/// Renders a number the way every operator writes numeric cells.
///
/// This is the shortest text that parses back to the same value (`20`, `1.5`); negative zero is
/// written as `0`.
pub fn format_numeric(v: f64) -> String {
    if v == 0.0 {
        return String::from("0");
    }
    format!("{v}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_grouped_numbers() {
        let f = NumberFormat::default();
        assert_eq!(try_parse_numeric("42", &f), Some(42.0));
        assert_eq!(try_parse_numeric("  -3.25 ", &f), Some(-3.25));
        assert_eq!(try_parse_numeric("1,234,567.5", &f), Some(1_234_567.5));
        assert_eq!(try_parse_numeric("1e3", &f), Some(1000.0));
    }

    #[test]
    fn rejects_non_finite_and_garbage() {
        let f = NumberFormat::default();
        for cell in ["", "   ", "NaN", "nan", "inf", "-Infinity", "1e400", "abc", "1.2.3"] {
            assert_eq!(try_parse_numeric(cell, &f), None, "{cell:?} should not parse");
        }
    }

    #[test]
    fn continental_format_swaps_separators() {
        let f = NumberFormat::CONTINENTAL;
        assert_eq!(try_parse_numeric("1.234,5", &f), Some(1234.5));
        assert_eq!(try_parse_numeric("0,25", &f), Some(0.25));
    }

    #[test]
    fn format_uses_shortest_representation() {
        assert_eq!(format_numeric(20.0), "20");
        assert_eq!(format_numeric(1.5), "1.5");
        assert_eq!(format_numeric(-0.0), "0");
        assert_eq!(format_numeric(-2.75), "-2.75");
    }
}
