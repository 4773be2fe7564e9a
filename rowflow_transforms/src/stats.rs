// Copyright 2025 the Rowflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Numeric kernels shared by group-by and window stages, and the per-cell error policy.

use rowflow_core::{EngineOptions, Timestamp, is_missing, try_parse_numeric, try_parse_timestamp};

use crate::error::EngineError;
use crate::transform::AggregateFn;

/// Reads cells under the engine's `ignore_errors` policy.
///
/// Empty cells are missing values and never errors. A non-empty cell that does not parse is
/// skipped (and counted) when tolerant, or reported with its row and column when strict.
#[derive(Debug)]
pub(crate) struct CellReader<'a> {
    opts: &'a EngineOptions,
    skipped: usize,
}

impl<'a> CellReader<'a> {
    pub(crate) fn new(opts: &'a EngineOptions) -> Self {
        Self { opts, skipped: 0 }
    }

    pub(crate) fn numeric(
        &mut self,
        row: usize,
        column: &str,
        cell: &str,
    ) -> Result<Option<f64>, EngineError> {
        if is_missing(cell) {
            return Ok(None);
        }
        match try_parse_numeric(cell, &self.opts.number_format) {
            Some(v) => Ok(Some(v)),
            None if self.opts.ignore_errors => {
                self.skipped += 1;
                Ok(None)
            }
            None => Err(EngineError::NumericParse {
                row,
                column: column.to_owned(),
                value: cell.to_owned(),
            }),
        }
    }

    /// Like [`CellReader::numeric`] but for time cells. Empty cells are reported as `None`
    /// without counting as skipped.
    pub(crate) fn timestamp(
        &mut self,
        row: usize,
        column: &str,
        cell: &str,
    ) -> Result<Option<Timestamp>, EngineError> {
        if is_missing(cell) {
            return Ok(None);
        }
        match try_parse_timestamp(cell, &self.opts.number_format) {
            Some(ts) => Ok(Some(ts)),
            None if self.opts.ignore_errors => {
                self.skipped += 1;
                Ok(None)
            }
            None => Err(EngineError::TimeParse {
                row,
                column: column.to_owned(),
                value: cell.to_owned(),
            }),
        }
    }

    /// Logs a summary of skipped cells, if any.
    pub(crate) fn finish(self, operation: &str) {
        if self.skipped > 0 {
            log::warn!(
                "{operation}: ignored {} unparseable cell(s) (ignore_errors is set)",
                self.skipped
            );
        }
    }
}

pub(crate) fn sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(sum(values) / values.len() as f64)
}

/// Sample variance; 0 for fewer than two values.
pub(crate) fn sample_variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = sum(values) / n as f64;
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    ss / (n - 1) as f64
}

/// Quantile `q` in `[0, 1]` of already sorted values, interpolating linearly between the two
/// bracketing order statistics.
pub(crate) fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = pos.floor();
    #[allow(
        clippy::cast_possible_truncation,
        reason = "pos lies in [0, n - 1], so both bounds are valid indices"
    )]
    let (lo_i, hi_i) = (lo as usize, pos.ceil() as usize);
    let frac = pos - lo;
    Some(sorted[lo_i] + (sorted[hi_i] - sorted[lo_i]) * frac)
}

fn quantile(values: &mut [f64], q: f64) -> Option<f64> {
    values.sort_by(f64::total_cmp);
    quantile_sorted(values, q)
}

/// Reduces numeric values with a numeric aggregate function.
///
/// Returns `None` where the function has no defined value for an empty input (mean, min, max,
/// and the quantiles). `Sum`, `Std`, and `Var` are always defined. `Count` counts the values
/// given; the textual functions (`First`, `Last`) are not handled here and yield `None`.
pub(crate) fn reduce(function: AggregateFn, values: &mut [f64]) -> Option<f64> {
    match function {
        AggregateFn::Mean => mean(values),
        AggregateFn::Sum => Some(sum(values)),
        AggregateFn::Min => values.iter().copied().reduce(f64::min),
        AggregateFn::Max => values.iter().copied().reduce(f64::max),
        AggregateFn::Count => Some(values.len() as f64),
        AggregateFn::Std => Some(sample_variance(values).sqrt()),
        AggregateFn::Var => Some(sample_variance(values)),
        AggregateFn::Median => quantile(values, 0.5),
        AggregateFn::Q1 => quantile(values, 0.25),
        AggregateFn::Q3 => quantile(values, 0.75),
        AggregateFn::First | AggregateFn::Last => None,
    }
}
