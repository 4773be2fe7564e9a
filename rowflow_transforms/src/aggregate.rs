// Copyright 2025 the Rowflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Group-by / aggregate engine.

use hashbrown::HashMap;
use rowflow_core::{EngineOptions, RowSet, Schema, format_numeric};
use smallvec::SmallVec;

use crate::error::EngineError;
use crate::stats::{CellReader, reduce};
use crate::transform::{AggregateFn, GroupBySpec};

/// Resolved column positions and output schema for one group-by.
#[derive(Debug)]
pub(crate) struct GroupPlan {
    keys: Vec<usize>,
    /// (source column, function, numeric slot)
    fields: Vec<(usize, AggregateFn, Option<usize>)>,
    /// Distinct source columns read as numbers.
    numeric_columns: Vec<usize>,
    pub(crate) output: Schema,
}

pub(crate) fn plan(
    input: &Schema,
    spec: &GroupBySpec,
    opts: &EngineOptions,
) -> Result<GroupPlan, EngineError> {
    if spec.aggregates.is_empty() {
        return Err(EngineError::invalid(
            "group-by",
            "at least one aggregate is required",
        ));
    }

    let mut output = Schema::default();
    let mut keys = Vec::with_capacity(spec.keys.len());
    for key in &spec.keys {
        keys.push(input.require(key)?);
        output.push(key.as_str())?;
    }

    let mut fields = Vec::with_capacity(spec.aggregates.len());
    let mut numeric_columns: Vec<usize> = Vec::new();
    for agg in &spec.aggregates {
        let col = input.require(&agg.column)?;
        let slot = agg.function.is_numeric().then(|| {
            numeric_columns.iter().position(|&c| c == col).unwrap_or_else(|| {
                numeric_columns.push(col);
                numeric_columns.len() - 1
            })
        });
        fields.push((col, agg.function, slot));
        let name = match &agg.output {
            Some(name) => name.clone(),
            None => opts.derived_name(&agg.column, agg.function.name()),
        };
        output.push(name)?;
    }

    Ok(GroupPlan {
        keys,
        fields,
        numeric_columns,
        output,
    })
}

#[derive(Debug)]
struct Group {
    first_row: usize,
    last_row: usize,
    rows: usize,
    /// Parsed values per numeric slot.
    values: Vec<Vec<f64>>,
}

/// Groups `rows` by `spec.keys` and computes `spec.aggregates`.
///
/// Groups appear in the order their key tuple is first seen. Key cells are compared as exact
/// strings.
pub fn group_by(
    rows: &RowSet,
    spec: &GroupBySpec,
    opts: &EngineOptions,
) -> Result<RowSet, EngineError> {
    let plan = plan(rows.schema(), spec, opts)?;
    let schema = rows.schema();
    let mut reader = CellReader::new(opts);

    let mut index: HashMap<SmallVec<[&str; 4]>, usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();

    for (ri, row) in rows.iter().enumerate() {
        let key: SmallVec<[&str; 4]> = plan.keys.iter().map(|&c| row.cell(c)).collect();
        let gi = match index.get(&key).copied() {
            Some(gi) => gi,
            None => {
                let gi = groups.len();
                index.insert(key, gi);
                groups.push(Group {
                    first_row: ri,
                    last_row: ri,
                    rows: 0,
                    values: vec![Vec::new(); plan.numeric_columns.len()],
                });
                gi
            }
        };

        let group = &mut groups[gi];
        group.last_row = ri;
        group.rows += 1;
        for (slot, &col) in plan.numeric_columns.iter().enumerate() {
            let column = schema.name(col).unwrap_or_default();
            if let Some(v) = reader.numeric(ri, column, row.cell(col))? {
                group.values[slot].push(v);
            }
        }
    }
    reader.finish("group-by");

    let mut out = RowSet::new(plan.output.clone());
    for group in &groups {
        let first = &rows.rows()[group.first_row];
        let mut cells: Vec<String> = Vec::with_capacity(plan.output.len());
        cells.extend(plan.keys.iter().map(|&c| first.cell(c).to_owned()));

        for &(col, function, slot) in &plan.fields {
            let cell = match (function, slot) {
                (AggregateFn::Count, _) => group.rows.to_string(),
                (AggregateFn::First, _) => first.cell(col).to_owned(),
                (AggregateFn::Last, _) => rows.rows()[group.last_row].cell(col).to_owned(),
                (_, Some(slot)) => {
                    let mut values = group.values[slot].clone();
                    match reduce(function, &mut values) {
                        Some(v) => format_numeric(v),
                        None if opts.ignore_errors => opts.default_value.clone(),
                        None => {
                            return Err(EngineError::EmptyAggregate {
                                function: function.name(),
                                column: schema.name(col).unwrap_or_default().to_owned(),
                                group: describe_key(first, &plan.keys),
                            });
                        }
                    }
                }
                (_, None) => opts.default_value.clone(),
            };
            cells.push(cell);
        }
        out.push(cells)?;
    }

    log::debug!("group-by: {} rows -> {} groups", rows.len(), out.len());
    Ok(out)
}

fn describe_key(row: &rowflow_core::Row, keys: &[usize]) -> String {
    if keys.is_empty() {
        return String::from("all rows");
    }
    keys.iter()
        .map(|&c| row.cell(c))
        .collect::<Vec<_>>()
        .join(", ")
}
