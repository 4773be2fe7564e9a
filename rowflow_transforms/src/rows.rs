// Copyright 2025 the Rowflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Row-preserving stages: filter, sort and normalize.

use core::cmp::Ordering;

use rowflow_core::{
    EngineOptions, Row, RowSet, Schema, format_numeric, is_missing, try_parse_timestamp,
};

use crate::error::EngineError;
use crate::stats::{CellReader, mean, sample_variance};
use crate::transform::{NormalizeMethod, NormalizeSpec, Predicate, SortOrder, SortSpec};

pub(crate) fn plan_normalize(
    input: &Schema,
    specs: &[NormalizeSpec],
) -> Result<Vec<usize>, EngineError> {
    if specs.is_empty() {
        return Err(EngineError::invalid("normalize", "at least one column is required"));
    }
    specs
        .iter()
        .map(|spec| input.require(&spec.column).map_err(EngineError::from))
        .collect()
}

/// Keeps rows whose numeric cell satisfies `predicate`.
///
/// Rows with an empty cell are dropped. A non-empty cell that is not a number drops its row when
/// tolerant and fails the stage when strict.
pub fn filter(
    rows: &RowSet,
    predicate: &Predicate,
    opts: &EngineOptions,
) -> Result<RowSet, EngineError> {
    let col = rows.schema().require(&predicate.column)?;
    let mut reader = CellReader::new(opts);
    let mut out = RowSet::new(rows.schema().clone());
    for (ri, row) in rows.iter().enumerate() {
        if let Some(v) = reader.numeric(ri, &predicate.column, row.cell(col))? {
            if predicate.eval(v) {
                out.push_row(row.clone())?;
            }
        }
    }
    reader.finish("filter");
    log::debug!("filter on `{}`: {} rows -> {} rows", predicate.column, rows.len(), out.len());
    Ok(out)
}

/// Stable sort by a numeric or time column.
///
/// Cells that parse as neither keep their relative order after every parsed row, whatever the
/// sort order.
pub fn sort(rows: &RowSet, spec: &SortSpec, opts: &EngineOptions) -> Result<RowSet, EngineError> {
    let col = rows.schema().require(&spec.column)?;
    let keys: Vec<Option<f64>> = rows
        .iter()
        .map(|row| try_parse_timestamp(row.cell(col), &opts.number_format).map(|ts| ts.seconds))
        .collect();

    let mut idx: Vec<usize> = (0..rows.len()).collect();
    idx.sort_by(|&a, &b| match (keys[a], keys[b]) {
        (Some(av), Some(bv)) => {
            let ord = av.total_cmp(&bv);
            match spec.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    let mut out = RowSet::new(rows.schema().clone());
    for &r in &idx {
        out.push_row(rows.rows()[r].clone())?;
    }
    Ok(out)
}

/// Rescales each listed column in place.
///
/// `MinMax` maps the column's range onto `[0, 1]` and a constant column onto `0`. `ZScore`
/// centres on the mean and divides by the sample standard deviation, writing `0` when that is
/// zero. Empty cells stay empty; unparseable cells become `default_value` when tolerant.
pub fn normalize(
    rows: &RowSet,
    specs: &[NormalizeSpec],
    opts: &EngineOptions,
) -> Result<RowSet, EngineError> {
    let columns = plan_normalize(rows.schema(), specs)?;
    let mut reader = CellReader::new(opts);
    let mut cells: Vec<Vec<String>> = rows.iter().map(|r| r.cells().to_vec()).collect();

    for (spec, &col) in specs.iter().zip(&columns) {
        let mut values = Vec::with_capacity(cells.len());
        for (ri, row) in cells.iter().enumerate() {
            values.push(reader.numeric(ri, &spec.column, &row[col])?);
        }
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        let scale: Box<dyn Fn(f64) -> f64> = match spec.method {
            NormalizeMethod::MinMax => {
                let lo = present.iter().copied().fold(f64::INFINITY, f64::min);
                let hi = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let range = hi - lo;
                Box::new(move |v| if range > 0.0 { (v - lo) / range } else { 0.0 })
            }
            NormalizeMethod::ZScore => {
                let m = mean(&present).unwrap_or(0.0);
                let sd = sample_variance(&present).sqrt();
                Box::new(move |v| if sd > 0.0 { (v - m) / sd } else { 0.0 })
            }
        };

        for (row, value) in cells.iter_mut().zip(values) {
            let cell = &mut row[col];
            match value {
                Some(v) => *cell = format_numeric(scale(v)),
                None if is_missing(cell) => {}
                None => cell.clone_from(&opts.default_value),
            }
        }
    }
    reader.finish("normalize");

    let mut out = RowSet::new(rows.schema().clone());
    for row in cells {
        out.push_row(Row::new(row))?;
    }
    Ok(out)
}
