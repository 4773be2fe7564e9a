// Copyright 2025 the Rowflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Hash-based equality join.

use hashbrown::HashMap;
use rowflow_core::{EngineOptions, Row, RowSet, RowSetError, Schema};
use smallvec::SmallVec;

use crate::error::EngineError;
use crate::transform::{JoinSpec, JoinType};

type KeyTuple<'a> = SmallVec<[&'a str; 4]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputColumn {
    /// Join key `k`, coalesced from whichever side is present.
    Key(usize),
    Left(usize),
    Right(usize),
}

/// Resolved key positions and output layout for one join.
#[derive(Debug)]
pub(crate) struct JoinPlan {
    left_keys: Vec<usize>,
    right_keys: Vec<usize>,
    columns: Vec<OutputColumn>,
    pub(crate) output: Schema,
}

/// Appends `_2`, `_3`, ... until `name` is free in `schema`.
pub(crate) fn unique_name(schema: &Schema, name: String) -> String {
    if !schema.contains(&name) {
        return name;
    }
    let mut n = 2_usize;
    loop {
        let candidate = format!("{name}_{n}");
        if !schema.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

pub(crate) fn plan(
    left: &Schema,
    right: &Schema,
    spec: &JoinSpec,
) -> Result<JoinPlan, EngineError> {
    if spec.keys.is_empty() {
        return Err(EngineError::invalid("join", "at least one key is required"));
    }
    let mut left_keys = Vec::with_capacity(spec.keys.len());
    let mut right_keys = Vec::with_capacity(spec.keys.len());
    for key in &spec.keys {
        left_keys.push(key.left.resolve(left)?);
        right_keys.push(key.right.resolve(right)?);
    }

    let key_name = |k: usize| -> String {
        spec.keys[k]
            .output
            .clone()
            .unwrap_or_else(|| left.names()[left_keys[k]].clone())
    };

    let right_names: Vec<&String> = right
        .names()
        .iter()
        .enumerate()
        .filter(|(c, _)| !right_keys.contains(c))
        .map(|(_, n)| n)
        .collect();
    let affixes = spec.has_affixes();

    let mut columns = Vec::with_capacity(left.len() + right.len());
    let mut names: Vec<String> = Vec::with_capacity(left.len() + right.len());
    for (c, name) in left.names().iter().enumerate() {
        if let Some(k) = left_keys.iter().position(|&lk| lk == c) {
            columns.push(OutputColumn::Key(k));
            names.push(key_name(k));
        } else if affixes && right_names.contains(&name) {
            columns.push(OutputColumn::Left(c));
            names.push(format!("{}{name}{}", spec.left_prefix, spec.left_suffix));
        } else {
            columns.push(OutputColumn::Left(c));
            names.push(name.clone());
        }
    }

    let left_names: Vec<String> = names.clone();
    for (c, name) in right.names().iter().enumerate() {
        if right_keys.contains(&c) {
            continue;
        }
        let collides = left.contains(name) || left_names.contains(name);
        let renamed = if !collides {
            name.clone()
        } else if affixes {
            format!("{}{name}{}", spec.right_prefix, spec.right_suffix)
        } else {
            format!("{name}{}", JoinSpec::DEFAULT_RIGHT_SUFFIX)
        };
        columns.push(OutputColumn::Right(c));
        names.push(renamed);
    }

    let mut output = Schema::default();
    for name in names {
        let name = unique_name(&output, name);
        output.push(name)?;
    }

    if let Some(select) = &spec.select {
        for wanted in select {
            if !output.contains(wanted) {
                return Err(RowSetError::UnknownColumn(wanted.clone()).into());
            }
        }
        let mut kept_columns = Vec::new();
        let mut kept = Schema::default();
        for (column, name) in columns.iter().zip(output.names()) {
            if matches!(column, OutputColumn::Key(_)) || select.iter().any(|s| s == name) {
                kept_columns.push(*column);
                kept.push(name.as_str())?;
            }
        }
        columns = kept_columns;
        output = kept;
    }

    Ok(JoinPlan {
        left_keys,
        right_keys,
        columns,
        output,
    })
}

/// Key tuple of a row, or `None` if any key cell is empty.
fn key_of<'a>(row: &'a Row, cols: &[usize], trim: bool) -> Option<KeyTuple<'a>> {
    let mut key = KeyTuple::new();
    for &c in cols {
        let cell = row.cell(c);
        let cell = if trim { cell.trim() } else { cell };
        if cell.is_empty() {
            return None;
        }
        key.push(cell);
    }
    Some(key)
}

fn build_index<'a>(
    rows: &'a RowSet,
    cols: &[usize],
    trim: bool,
) -> HashMap<KeyTuple<'a>, Vec<usize>> {
    let mut index: HashMap<KeyTuple<'a>, Vec<usize>> = HashMap::with_capacity(rows.len());
    for (ri, row) in rows.iter().enumerate() {
        if let Some(key) = key_of(row, cols, trim) {
            index.entry(key).or_default().push(ri);
        }
    }
    index
}

/// Joins `left` and `right` on `spec.keys`.
///
/// The output holds every left column (key columns renamed to their output names) followed by
/// the right side's non-key columns. Key cells are taken from whichever side is present. A row
/// whose key has an empty cell never matches anything.
pub fn join(
    left: &RowSet,
    right: &RowSet,
    spec: &JoinSpec,
    opts: &EngineOptions,
) -> Result<RowSet, EngineError> {
    let plan = plan(left.schema(), right.schema(), spec)?;
    let trim = opts.trim_keys;
    let mut out = RowSet::new(plan.output.clone());

    let emit = |out: &mut RowSet, l: Option<&Row>, r: Option<&Row>| -> Result<(), RowSetError> {
        let cells = plan
            .columns
            .iter()
            .map(|column| {
                let cell = match *column {
                    OutputColumn::Key(k) => match (l, r) {
                        (Some(l), _) => l.cell(plan.left_keys[k]),
                        (None, Some(r)) => r.cell(plan.right_keys[k]),
                        (None, None) => "",
                    },
                    OutputColumn::Left(c) => l.map_or("", |l| l.cell(c)),
                    OutputColumn::Right(c) => r.map_or("", |r| r.cell(c)),
                };
                cell.to_owned()
            })
            .collect();
        out.push(cells)
    };

    match spec.join_type {
        JoinType::Inner | JoinType::Left | JoinType::Outer => {
            let index = build_index(right, &plan.right_keys, trim);
            let mut matched_right = vec![false; right.len()];
            for l in left {
                let matches = key_of(l, &plan.left_keys, trim).and_then(|key| index.get(&key));
                match matches {
                    Some(matches) => {
                        for &ri in matches {
                            matched_right[ri] = true;
                            emit(&mut out, Some(l), Some(&right.rows()[ri]))?;
                        }
                    }
                    None if spec.join_type != JoinType::Inner => emit(&mut out, Some(l), None)?,
                    None => {}
                }
            }
            if spec.join_type == JoinType::Outer {
                for (ri, r) in right.iter().enumerate() {
                    if !matched_right[ri] {
                        emit(&mut out, None, Some(r))?;
                    }
                }
            }
        }
        JoinType::Right => {
            let index = build_index(left, &plan.left_keys, trim);
            for r in right {
                match key_of(r, &plan.right_keys, trim).and_then(|key| index.get(&key)) {
                    Some(matches) => {
                        for &li in matches {
                            emit(&mut out, Some(&left.rows()[li]), Some(r))?;
                        }
                    }
                    None => emit(&mut out, None, Some(r))?,
                }
            }
        }
    }

    log::debug!(
        "join ({:?}): {} x {} rows -> {} rows",
        spec.join_type,
        left.len(),
        right.len(),
        out.len()
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::JoinKey;

    fn left() -> RowSet {
        RowSet::from_records([
            vec![("id", "1"), ("a", "x")],
            vec![("id", "3"), ("a", "w")],
            vec![("id", ""), ("a", "blank")],
        ])
        .unwrap()
    }

    fn right() -> RowSet {
        RowSet::from_records([
            vec![("id", "1"), ("b", "y")],
            vec![("id", "2"), ("b", "z")],
            vec![("id", " 1 "), ("b", "y2")],
            vec![("id", ""), ("b", "nobody")],
        ])
        .unwrap()
    }

    fn run(join_type: JoinType) -> RowSet {
        join(
            &left(),
            &right(),
            &JoinSpec::new(vec![JoinKey::on("id")], join_type),
            &EngineOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn inner_join_emits_matched_pairs_only() {
        let l = RowSet::from_records([vec![("id", "1"), ("a", "x")]]).unwrap();
        let r = RowSet::from_records([
            vec![("id", "1"), ("b", "y")],
            vec![("id", "2"), ("b", "z")],
        ])
        .unwrap();
        let out = join(
            &l,
            &r,
            &JoinSpec::new(vec![JoinKey::on("id")], JoinType::Inner),
            &EngineOptions::default(),
        )
        .unwrap();
        assert_eq!(out.columns(), ["id", "a", "b"]);
        assert_eq!(out.len(), 1);
        assert_eq!(out.row(0).unwrap().cells(), ["1", "x", "y"]);
    }

    #[test]
    fn trimmed_keys_match_and_empty_keys_never_do() {
        let out = run(JoinType::Inner);
        let bs: Vec<_> = out.column_values("b").unwrap();
        assert_eq!(bs, ["y", "y2"]);
    }

    #[test]
    fn left_join_fills_unmatched_with_empty_cells() {
        let out = run(JoinType::Left);
        assert_eq!(out.len(), 4);
        assert_eq!(out.row(2).unwrap().cells(), ["3", "w", ""]);
        assert_eq!(out.row(3).unwrap().cells(), ["", "blank", ""]);

        // Every inner row appears among the matched left rows.
        let inner = run(JoinType::Inner);
        for row in &inner {
            assert!(out.rows().contains(row));
        }
    }

    #[test]
    fn right_join_iterates_the_right_side() {
        let out = run(JoinType::Right);
        let cells: Vec<_> = out.iter().map(|r| r.cells().to_vec()).collect();
        assert_eq!(
            cells,
            vec![
                vec!["1", "x", "y"],
                vec!["2", "", "z"],
                vec!["1", "x", "y2"],
                vec!["", "", "nobody"],
            ]
        );
    }

    #[test]
    fn outer_join_appends_unmatched_right_rows() {
        let out = run(JoinType::Outer);
        let ids: Vec<_> = out.column_values("id").unwrap();
        assert_eq!(ids, ["1", "1", "3", "", "2", ""]);
        assert_eq!(out.value(5, "b"), Some("nobody"));
    }

    #[test]
    fn collisions_get_default_right_suffix() {
        let l = RowSet::from_records([vec![("id", "1"), ("v", "l")]]).unwrap();
        let r = RowSet::from_records([vec![("id", "1"), ("v", "r")]]).unwrap();
        let out = join(
            &l,
            &r,
            &JoinSpec::new(vec![JoinKey::on("id")], JoinType::Inner),
            &EngineOptions::default(),
        )
        .unwrap();
        assert_eq!(out.columns(), ["id", "v", "v_right"]);
        assert_eq!(out.row(0).unwrap().cells(), ["1", "l", "r"]);

        let out = join(
            &l,
            &r,
            &JoinSpec::new(vec![JoinKey::on("id")], JoinType::Inner).with_suffixes("_l", "_r"),
            &EngineOptions::default(),
        )
        .unwrap();
        assert_eq!(out.columns(), ["id", "v_l", "v_r"]);
    }

    #[test]
    fn heterogeneous_keys_and_projection() {
        let l =
            RowSet::from_records([vec![("cust", "7"), ("name", "ann"), ("age", "30")]]).unwrap();
        let r = RowSet::from_records([vec![
            ("total", "9"),
            ("customer_id", "7"),
            ("note", "vip"),
        ]])
        .unwrap();
        let spec = JoinSpec::new(
            vec![JoinKey::pair("cust", 1_usize).with_output("customer")],
            JoinType::Left,
        )
        .with_select(["total"]);
        let out = join(&l, &r, &spec, &EngineOptions::default()).unwrap();
        assert_eq!(out.columns(), ["customer", "total"]);
        assert_eq!(out.row(0).unwrap().cells(), ["7", "9"]);

        let bad = JoinSpec::new(vec![JoinKey::on("cust")], JoinType::Left);
        assert!(matches!(
            join(&l, &r, &bad, &EngineOptions::default()),
            Err(EngineError::Schema(RowSetError::UnknownColumn(_)))
        ));
    }

    #[test]
    fn multi_column_keys() {
        let l = RowSet::from_records([
            vec![("a", "1"), ("b", "x"), ("v", "first")],
            vec![("a", "1"), ("b", "y"), ("v", "second")],
        ])
        .unwrap();
        let r = RowSet::from_records([vec![("a", "1"), ("b", "y"), ("w", "hit")]]).unwrap();
        let out = join(
            &l,
            &r,
            &JoinSpec::new(vec![JoinKey::on("a"), JoinKey::on("b")], JoinType::Inner),
            &EngineOptions::default(),
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.row(0).unwrap().cells(), ["1", "y", "second", "hit"]);
    }
}
