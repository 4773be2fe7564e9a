// Copyright 2025 the Rowflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Window engine: fixed-width time buckets (resample) and trailing row windows (rolling).

use std::collections::{BTreeMap, VecDeque};

use rowflow_core::{EngineOptions, RowSet, Schema, TimeForm, format_numeric, format_timestamp};

use crate::error::EngineError;
use crate::stats::{CellReader, reduce};
use crate::transform::{ResampleSpec, RollingSpec, WindowMethod};

/// Resolved positions and output schema for one window stage.
#[derive(Debug)]
pub(crate) struct WindowPlan {
    time: Option<usize>,
    columns: Vec<usize>,
    pub(crate) output: Schema,
}

pub(crate) fn plan_resample(
    input: &Schema,
    spec: &ResampleSpec,
    opts: &EngineOptions,
) -> Result<WindowPlan, EngineError> {
    if spec.columns.is_empty() {
        return Err(EngineError::invalid("resample", "at least one value column is required"));
    }
    let time = input.require(&spec.time_column)?;
    let mut output = Schema::default();
    output.push(spec.time_column.as_str())?;
    let mut columns = Vec::with_capacity(spec.columns.len());
    for column in &spec.columns {
        columns.push(input.require(column)?);
        output.push(opts.derived_name(column, spec.method.name()))?;
    }
    Ok(WindowPlan {
        time: Some(time),
        columns,
        output,
    })
}

pub(crate) fn plan_rolling(
    input: &Schema,
    spec: &RollingSpec,
    opts: &EngineOptions,
) -> Result<WindowPlan, EngineError> {
    if spec.columns.is_empty() {
        return Err(EngineError::invalid("rolling window", "at least one column is required"));
    }
    let mut output = input.clone();
    let mut columns = Vec::with_capacity(spec.columns.len());
    for column in &spec.columns {
        columns.push(input.require(column)?);
        let rolled = opts.derived_name(column, "rolling");
        output.push(opts.derived_name(&rolled, spec.method.name()))?;
    }
    Ok(WindowPlan {
        time: None,
        columns,
        output,
    })
}

/// Renders a window's result. Sum, count and the spread measures of an empty window are zero;
/// everything else falls back to `default_value`.
fn window_cell(method: WindowMethod, values: &mut [f64], opts: &EngineOptions) -> String {
    match reduce(method.as_aggregate(), values) {
        Some(v) => format_numeric(v),
        None => opts.default_value.clone(),
    }
}

#[derive(Debug)]
struct Bucket {
    form: TimeForm,
    values: Vec<Vec<f64>>,
}

/// Buckets rows by `floor(t / every)` and aggregates each value column per bucket.
///
/// Buckets are aligned to the epoch (time zero for numeric times). Only non-empty buckets are
/// emitted, in chronological order. The time cell holds the bucket start, written the way the
/// bucket's first timestamp was written.
pub fn resample(
    rows: &RowSet,
    spec: &ResampleSpec,
    opts: &EngineOptions,
) -> Result<RowSet, EngineError> {
    let plan = plan_resample(rows.schema(), spec, opts)?;
    let Some(time) = plan.time else {
        return Err(EngineError::invalid("resample", "no time column"));
    };
    let width = spec.every.as_seconds();
    let mut reader = CellReader::new(opts);

    let mut buckets: BTreeMap<i64, Bucket> = BTreeMap::new();
    let mut dropped = 0_usize;
    for (ri, row) in rows.iter().enumerate() {
        let cell = row.cell(time);
        let ts = match reader.timestamp(ri, &spec.time_column, cell)? {
            Some(ts) => ts,
            None if opts.ignore_errors => {
                dropped += 1;
                continue;
            }
            None => {
                return Err(EngineError::TimeParse {
                    row: ri,
                    column: spec.time_column.clone(),
                    value: cell.to_owned(),
                });
            }
        };

        #[allow(
            clippy::cast_possible_truncation,
            reason = "bucket indices of realistic timestamps fit in i64; `as` saturates otherwise"
        )]
        let index = (ts.seconds / width).floor() as i64;
        let bucket = buckets.entry(index).or_insert_with(|| Bucket {
            form: ts.form,
            values: vec![Vec::new(); plan.columns.len()],
        });
        for (slot, (&col, name)) in plan.columns.iter().zip(&spec.columns).enumerate() {
            if let Some(v) = reader.numeric(ri, name, row.cell(col))? {
                bucket.values[slot].push(v);
            }
        }
    }
    reader.finish("resample");
    if dropped > 0 {
        log::warn!("resample: dropped {dropped} row(s) without a usable time");
    }

    let mut out = RowSet::new(plan.output.clone());
    for (index, mut bucket) in buckets {
        let start = index as f64 * width;
        let mut cells = Vec::with_capacity(plan.output.len());
        cells.push(format_timestamp(start, bucket.form));
        for values in &mut bucket.values {
            cells.push(window_cell(spec.method, values, opts));
        }
        out.push(cells)?;
    }

    log::debug!(
        "resample ({} every {}): {} rows -> {} buckets",
        spec.method.name(),
        spec.every,
        rows.len(),
        out.len()
    );
    Ok(out)
}

/// Trailing-window kernels over one column of optional values.
///
/// Sums and means are recomputed per window; a running total loses precision once large
/// values leave the window.
fn roll(
    values: &[Option<f64>],
    size: usize,
    method: WindowMethod,
    opts: &EngineOptions,
) -> Vec<String> {
    let n = values.len();
    // Windows never reach past the first row, so larger sizes behave like `n`.
    let size = size.min(n.max(1));
    let mut out = Vec::with_capacity(n);
    match method {
        WindowMethod::Count => {
            let mut count = 0_usize;
            for i in 0..n {
                if values[i].is_some() {
                    count += 1;
                }
                if i >= size && values[i - size].is_some() {
                    count -= 1;
                }
                out.push(format_numeric(count as f64));
            }
        }
        WindowMethod::Min | WindowMethod::Max => {
            // Indices of candidate extremes; their values are monotonic from the front.
            let mut deque: VecDeque<usize> = VecDeque::new();
            let keep = |front: f64, incoming: f64| match method {
                WindowMethod::Min => front < incoming,
                _ => front > incoming,
            };
            for i in 0..n {
                if let Some(v) = values[i] {
                    while let Some(&back) = deque.back() {
                        match values[back] {
                            Some(b) if keep(b, v) => break,
                            _ => {
                                deque.pop_back();
                            }
                        }
                    }
                    deque.push_back(i);
                }
                while deque.front().is_some_and(|&front| i - front >= size) {
                    deque.pop_front();
                }
                let cell = match deque.front().and_then(|&front| values[front]) {
                    Some(v) => format_numeric(v),
                    None => opts.default_value.clone(),
                };
                out.push(cell);
            }
        }
        WindowMethod::Sum
        | WindowMethod::Mean
        | WindowMethod::Std
        | WindowMethod::Var
        | WindowMethod::Median => {
            let mut window = Vec::with_capacity(size);
            for i in 0..n {
                window.clear();
                let start = (i + 1).saturating_sub(size);
                window.extend(values[start..=i].iter().flatten());
                out.push(window_cell(method, &mut window, opts));
            }
        }
    }
    out
}

/// Appends a trailing-window aggregate column for each configured column.
///
/// Row `i` aggregates rows `max(0, i - size + 1)..=i`, so the output has exactly as many rows
/// as the input.
pub fn rolling(
    rows: &RowSet,
    spec: &RollingSpec,
    opts: &EngineOptions,
) -> Result<RowSet, EngineError> {
    let plan = plan_rolling(rows.schema(), spec, opts)?;
    let size = spec.size.get();
    let mut reader = CellReader::new(opts);

    let mut rolled: Vec<Vec<String>> = Vec::with_capacity(plan.columns.len());
    for (&col, name) in plan.columns.iter().zip(&spec.columns) {
        let mut values = Vec::with_capacity(rows.len());
        for (ri, row) in rows.iter().enumerate() {
            values.push(reader.numeric(ri, name, row.cell(col))?);
        }
        rolled.push(roll(&values, size, spec.method, opts));
    }
    reader.finish("rolling");

    let mut out = RowSet::new(plan.output.clone());
    for (ri, row) in rows.iter().enumerate() {
        let mut cells = Vec::with_capacity(plan.output.len());
        cells.extend(row.cells().iter().cloned());
        cells.extend(rolled.iter_mut().map(|column| core::mem::take(&mut column[ri])));
        out.push(cells)?;
    }

    log::debug!(
        "rolling ({} over {size} rows): {} columns on {} rows",
        spec.method.name(),
        plan.columns.len(),
        out.len()
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[&str]) -> RowSet {
        RowSet::from_records(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| vec![("i", i.to_string()), ("v", (*v).to_owned())]),
        )
        .unwrap()
    }

    const ALL_METHODS: [WindowMethod; 8] = [
        WindowMethod::Mean,
        WindowMethod::Min,
        WindowMethod::Max,
        WindowMethod::Sum,
        WindowMethod::Count,
        WindowMethod::Std,
        WindowMethod::Var,
        WindowMethod::Median,
    ];

    fn rolled(rows: &RowSet, size: usize, method: WindowMethod) -> Vec<String> {
        let spec = RollingSpec::new(["v"], size, method).unwrap();
        let out = rolling(rows, &spec, &EngineOptions::default()).unwrap();
        let name = format!("v_rolling_{}", method.name());
        out.column_values(&name)
            .unwrap()
            .into_iter()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn rolling_mean_over_three_rows() {
        let rows = series(&["1", "2", "3", "4"]);
        let spec = RollingSpec::new(["v"], 3, WindowMethod::Mean).unwrap();
        let out = rolling(&rows, &spec, &EngineOptions::default()).unwrap();
        assert_eq!(out.columns(), ["i", "v", "v_rolling_mean"]);
        assert_eq!(out.len(), rows.len());
        let means: Vec<_> = out.column_values("v_rolling_mean").unwrap();
        assert_eq!(means, ["1", "1.5", "2", "3"]);
    }

    #[test]
    fn rolling_preserves_row_count_for_every_method() {
        let rows = series(&["4", "", "1", "7", "3", "3", "9"]);
        for method in ALL_METHODS {
            for size in [1, 2, 3, 10] {
                assert_eq!(rolled(&rows, size, method).len(), rows.len());
            }
        }
    }

    #[test]
    fn deque_extremes_match_brute_force() {
        let raw = ["4", "", "1", "7", "3", "3", "9", "2", "8"];
        let rows = series(&raw);
        let parsed: Vec<Option<f64>> = raw.iter().map(|v| v.parse().ok()).collect();
        for size in 1..=4 {
            let mins = rolled(&rows, size, WindowMethod::Min);
            let maxs = rolled(&rows, size, WindowMethod::Max);
            for i in 0..raw.len() {
                let window: Vec<f64> = parsed[(i + 1).saturating_sub(size)..=i]
                    .iter()
                    .flatten()
                    .copied()
                    .collect();
                let expect_min = window.iter().copied().reduce(f64::min).map(format_numeric);
                let expect_max = window.iter().copied().reduce(f64::max).map(format_numeric);
                assert_eq!(mins[i], expect_min.unwrap_or_default(), "min size {size} row {i}");
                assert_eq!(maxs[i], expect_max.unwrap_or_default(), "max size {size} row {i}");
            }
        }
    }

    #[test]
    fn every_method_matches_a_recomputed_window() {
        let raw = ["4", "", "1e16", "1", "1", "0.1", "0.2", "0.3", "0.4", "", "9"];
        let rows = series(&raw);
        let parsed: Vec<Option<f64>> = raw.iter().map(|v| v.parse().ok()).collect();
        let opts = EngineOptions::default();
        for method in ALL_METHODS {
            for size in 1..=5 {
                let got = rolled(&rows, size, method);
                for i in 0..raw.len() {
                    let mut window: Vec<f64> = parsed[(i + 1).saturating_sub(size)..=i]
                        .iter()
                        .flatten()
                        .copied()
                        .collect();
                    let expect = window_cell(method, &mut window, &opts);
                    assert_eq!(got[i], expect, "{} size {size} row {i}", method.name());
                }
            }
        }
    }

    #[test]
    fn large_values_leaving_the_window_do_not_swamp_the_sum() {
        let rows = series(&["1e16", "1", "1", "1"]);
        assert_eq!(rolled(&rows, 2, WindowMethod::Sum)[2..], ["2", "2"]);

        let rows = series(&["0.1", "0.2", "0.3", "0.4"]);
        assert_eq!(rolled(&rows, 2, WindowMethod::Mean)[2..], ["0.25", "0.35"]);
    }

    #[test]
    fn oversized_windows_cover_every_prior_row() {
        let rows = series(&["3", "1", "2"]);
        for method in ALL_METHODS {
            assert_eq!(
                rolled(&rows, usize::MAX, method),
                rolled(&rows, rows.len(), method),
                "{}",
                method.name()
            );
        }
        assert_eq!(rolled(&rows, usize::MAX, WindowMethod::Min), ["3", "1", "1"]);
        assert_eq!(rolled(&rows, usize::MAX, WindowMethod::Sum), ["3", "4", "6"]);
        assert_eq!(rolled(&rows, usize::MAX, WindowMethod::Count), ["1", "2", "3"]);
    }

    #[test]
    fn empty_windows() {
        let rows = series(&["", "", "2"]);
        assert_eq!(rolled(&rows, 2, WindowMethod::Sum), ["0", "0", "2"]);
        assert_eq!(rolled(&rows, 2, WindowMethod::Count), ["0", "0", "1"]);
        assert_eq!(rolled(&rows, 2, WindowMethod::Std), ["0", "0", "0"]);
        assert_eq!(rolled(&rows, 2, WindowMethod::Mean), ["", "", "2"]);
        assert_eq!(rolled(&rows, 2, WindowMethod::Median), ["", "", "2"]);
    }

    #[test]
    fn rolling_std_recomputes_each_window() {
        let rows = series(&["2", "4", "6"]);
        assert_eq!(rolled(&rows, 2, WindowMethod::Var), ["0", "2", "2"]);
    }

    #[test]
    fn rolling_strict_and_tolerant() {
        let rows = series(&["1", "x", "3"]);
        let spec = RollingSpec::new(["v"], 2, WindowMethod::Sum).unwrap();
        let err = rolling(&rows, &spec, &EngineOptions::default()).unwrap_err();
        assert!(matches!(err, EngineError::NumericParse { row: 1, .. }));

        let tolerant = EngineOptions::default().with_ignore_errors(true);
        let out = rolling(&rows, &spec, &tolerant).unwrap();
        let sums: Vec<_> = out.column_values("v_rolling_sum").unwrap();
        assert_eq!(sums, ["1", "1", "3"]);
    }

    fn sensor() -> RowSet {
        RowSet::from_records(
            [
                ("0", "1"),
                ("60", "2"),
                ("299.5", "3"),
                ("300", "10"),
                ("610", "6"),
                ("650", "8"),
            ]
            .map(|(t, a)| vec![("Time_s[s]", t), ("RMS[A]", a)]),
        )
        .unwrap()
    }

    #[test]
    fn resample_five_minute_means() {
        let spec = ResampleSpec::parse("Time_s[s]", ["RMS[A]"], "5T", WindowMethod::Mean).unwrap();
        let rows = sensor();
        let out = resample(&rows, &spec, &EngineOptions::default()).unwrap();
        assert_eq!(out.columns(), ["Time_s[s]", "RMS[A]_mean"]);
        assert!(out.len() <= rows.len());
        let cells: Vec<_> = out.iter().map(|r| r.cells().to_vec()).collect();
        assert_eq!(
            cells,
            vec![vec!["0", "2"], vec!["300", "10"], vec!["600", "7"]]
        );
    }

    #[test]
    fn resample_skips_empty_buckets_and_keeps_calendar_form() {
        let rows = RowSet::from_records([
            vec![("ts", "2024-03-01 10:07:00"), ("v", "4")],
            vec![("ts", "2024-03-01 10:01:00"), ("v", "1")],
            vec![("ts", "2024-03-01 10:04:59"), ("v", "")],
            vec![("ts", "2024-03-01 10:03:00"), ("v", "3")],
        ])
        .unwrap();
        let spec = ResampleSpec::parse("ts", ["v"], "5min", WindowMethod::Count).unwrap();
        let out = resample(&rows, &spec, &EngineOptions::default()).unwrap();
        let cells: Vec<_> = out.iter().map(|r| r.cells().to_vec()).collect();
        assert_eq!(
            cells,
            vec![
                vec!["2024-03-01 10:00:00", "2"],
                vec!["2024-03-01 10:05:00", "1"],
            ]
        );

        let spec = ResampleSpec::parse("ts", ["v"], "1H", WindowMethod::Max).unwrap();
        let out = resample(&rows, &spec, &EngineOptions::default()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.value(0, "v_max"), Some("4"));
    }

    #[test]
    fn resample_bad_times() {
        let rows = RowSet::from_records([
            vec![("t", "0"), ("v", "1")],
            vec![("t", "later"), ("v", "2")],
            vec![("t", ""), ("v", "3")],
        ])
        .unwrap();
        let spec = ResampleSpec::parse("t", ["v"], "10S", WindowMethod::Sum).unwrap();
        let err = resample(&rows, &spec, &EngineOptions::default()).unwrap_err();
        assert!(matches!(err, EngineError::TimeParse { row: 1, .. }));

        let tolerant = EngineOptions::default().with_ignore_errors(true);
        let out = resample(&rows, &spec, &tolerant).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.value(0, "v_sum"), Some("1"));
    }

    #[test]
    fn window_validation() {
        let rows = sensor();
        let spec = ResampleSpec::parse("time", ["RMS[A]"], "5T", WindowMethod::Mean).unwrap();
        assert!(matches!(
            resample(&rows, &spec, &EngineOptions::default()),
            Err(EngineError::Schema(_))
        ));
        let spec = RollingSpec::new(Vec::<String>::new(), 2, WindowMethod::Mean).unwrap();
        assert!(matches!(
            rolling(&rows, &spec, &EngineOptions::default()),
            Err(EngineError::InvalidSpec { .. })
        ));
    }
}
