// Copyright 2025 the Rowflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! As-of merge: match each left row to the nearest right row in time.

use hashbrown::HashMap;
use rowflow_core::{EngineOptions, Row, RowSet, Schema};
use smallvec::SmallVec;

use crate::error::EngineError;
use crate::join::unique_name;
use crate::stats::CellReader;
use crate::transform::{AsOfSpec, Direction};

type ByKey<'a> = SmallVec<[&'a str; 2]>;

#[derive(Debug)]
pub(crate) struct AsOfPlan {
    left_time: usize,
    right_time: usize,
    left_by: Vec<usize>,
    right_by: Vec<usize>,
    /// Right columns carried into the output, in order.
    right_columns: Vec<usize>,
    pub(crate) output: Schema,
}

pub(crate) fn plan(
    left: &Schema,
    right: &Schema,
    spec: &AsOfSpec,
) -> Result<AsOfPlan, EngineError> {
    let left_time = left.require(&spec.left_on)?;
    let right_time = right.require(&spec.right_on)?;
    let mut left_by = Vec::with_capacity(spec.by.len());
    let mut right_by = Vec::with_capacity(spec.by.len());
    for column in &spec.by {
        left_by.push(left.require(column)?);
        right_by.push(right.require(column)?);
    }

    let mut output = left.clone();
    let mut right_columns = Vec::with_capacity(right.len());
    for (c, name) in right.names().iter().enumerate() {
        if right_by.contains(&c) {
            continue;
        }
        let name = if left.contains(name) {
            format!("{name}{}", spec.suffix)
        } else {
            name.clone()
        };
        let name = unique_name(&output, name);
        output.push(name)?;
        right_columns.push(c);
    }

    Ok(AsOfPlan {
        left_time,
        right_time,
        left_by,
        right_by,
        right_columns,
        output,
    })
}

fn by_key<'a>(row: &'a Row, cols: &[usize], trim: bool) -> Option<ByKey<'a>> {
    let mut key = ByKey::new();
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

/// Picks the index into `times` (sorted ascending) that `t` matches, if any.
fn search(times: &[(f64, usize)], t: f64, spec: &AsOfSpec) -> Option<usize> {
    let exact = spec.allow_exact_matches;
    let backward = || {
        let end = if exact {
            times.partition_point(|&(rt, _)| rt <= t)
        } else {
            times.partition_point(|&(rt, _)| rt < t)
        };
        end.checked_sub(1)
    };
    let forward = || {
        let start = if exact {
            times.partition_point(|&(rt, _)| rt < t)
        } else {
            times.partition_point(|&(rt, _)| rt <= t)
        };
        (start < times.len()).then_some(start)
    };

    let found = match spec.direction {
        Direction::Backward => backward(),
        Direction::Forward => forward(),
        Direction::Nearest => match (backward(), forward()) {
            (Some(b), Some(f)) => {
                if times[f].0 - t < t - times[b].0 {
                    Some(f)
                } else {
                    Some(b)
                }
            }
            (b, f) => b.or(f),
        },
    }?;

    match spec.tolerance {
        Some(tolerance) if (times[found].0 - t).abs() > tolerance.as_seconds() => None,
        _ => Some(found),
    }
}

/// Merges `right` into `left` by nearest time.
///
/// Left rows keep their order and every left row appears exactly once; rows without a match
/// get empty right cells. The right side does not need to be sorted.
pub fn merge_asof(
    left: &RowSet,
    right: &RowSet,
    spec: &AsOfSpec,
    opts: &EngineOptions,
) -> Result<RowSet, EngineError> {
    let plan = plan(left.schema(), right.schema(), spec)?;
    let trim = opts.trim_keys;
    let mut reader = CellReader::new(opts);

    let mut partitions: HashMap<ByKey<'_>, Vec<(f64, usize)>> = HashMap::new();
    for (ri, row) in right.iter().enumerate() {
        let Some(ts) = reader.timestamp(ri, &spec.right_on, row.cell(plan.right_time))? else {
            continue;
        };
        if let Some(key) = by_key(row, &plan.right_by, trim) {
            partitions.entry(key).or_default().push((ts.seconds, ri));
        }
    }
    for times in partitions.values_mut() {
        // Stable, so equal timestamps keep their input order.
        times.sort_by(|a, b| a.0.total_cmp(&b.0));
    }

    let mut out = RowSet::new(plan.output.clone());
    let mut matched = 0_usize;
    for (li, row) in left.iter().enumerate() {
        let ts = reader.timestamp(li, &spec.left_on, row.cell(plan.left_time))?;
        let hit = match (ts, by_key(row, &plan.left_by, trim)) {
            (Some(ts), Some(key)) => partitions
                .get(&key)
                .and_then(|times| search(times, ts.seconds, spec).map(|i| times[i].1)),
            _ => None,
        };

        let mut cells: Vec<String> = Vec::with_capacity(plan.output.len());
        cells.extend(row.cells().iter().cloned());
        match hit {
            Some(ri) => {
                matched += 1;
                let r = &right.rows()[ri];
                cells.extend(plan.right_columns.iter().map(|&c| r.cell(c).to_owned()));
            }
            None => cells.extend(plan.right_columns.iter().map(|_| String::new())),
        }
        out.push(cells)?;
    }
    reader.finish("merge-asof");

    log::debug!(
        "merge-asof ({:?}): {} of {} left rows matched",
        spec.direction,
        matched,
        left.len()
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowflow_core::TimeSpan;

    fn trades() -> RowSet {
        RowSet::from_records([
            vec![("t", "1"), ("sym", "A")],
            vec![("t", "5"), ("sym", "B")],
            vec![("t", "10"), ("sym", "A")],
        ])
        .unwrap()
    }

    fn quotes() -> RowSet {
        // Deliberately unsorted.
        RowSet::from_records([
            vec![("t", "9"), ("sym", "A"), ("px", "c")],
            vec![("t", "2"), ("sym", "A"), ("px", "a")],
            vec![("t", "5"), ("sym", "B"), ("px", "b")],
        ])
        .unwrap()
    }

    fn pxs(out: &RowSet) -> Vec<String> {
        out.column_values("px")
            .unwrap()
            .into_iter()
            .map(str::to_owned)
            .collect()
    }

    fn merge(spec: &AsOfSpec) -> RowSet {
        merge_asof(&trades(), &quotes(), spec, &EngineOptions::default()).unwrap()
    }

    #[test]
    fn backward_takes_latest_at_or_before() {
        let out = merge(&AsOfSpec::new("t", "t"));
        assert_eq!(out.columns(), ["t", "sym", "t_right", "sym_right", "px"]);
        assert_eq!(pxs(&out), ["", "b", "c"]);
        assert_eq!(out.row(2).unwrap().cells(), ["10", "A", "9", "A", "c"]);
    }

    #[test]
    fn forward_and_nearest() {
        let out = merge(&AsOfSpec::new("t", "t").with_direction(Direction::Forward));
        assert_eq!(pxs(&out), ["a", "b", ""]);

        let out = merge(&AsOfSpec::new("t", "t").with_direction(Direction::Nearest));
        assert_eq!(pxs(&out), ["a", "b", "c"]);
    }

    #[test]
    fn nearest_ties_go_backward() {
        let left = RowSet::from_records([vec![("t", "5")]]).unwrap();
        let right = RowSet::from_records([
            vec![("t", "7"), ("v", "after")],
            vec![("t", "3"), ("v", "before")],
        ])
        .unwrap();
        let spec = AsOfSpec::new("t", "t").with_direction(Direction::Nearest);
        let out = merge_asof(&left, &right, &spec, &EngineOptions::default()).unwrap();
        assert_eq!(out.value(0, "v"), Some("before"));
    }

    #[test]
    fn tolerance_rejects_distant_matches() {
        let spec = AsOfSpec::new("t", "t").with_tolerance(TimeSpan::seconds(0.5).unwrap());
        let out = merge(&spec);
        // Only the exact match at t = 5 is close enough.
        assert_eq!(pxs(&out), ["", "b", ""]);

        let spec = AsOfSpec::new("t", "t").with_tolerance(TimeSpan::seconds(1.0).unwrap());
        assert_eq!(pxs(&merge(&spec)), ["", "b", "c"]);
    }

    #[test]
    fn exact_matches_can_be_excluded() {
        let spec = AsOfSpec::new("t", "t").with_exact_matches(false);
        assert_eq!(pxs(&merge(&spec)), ["", "a", "c"]);
    }

    #[test]
    fn by_columns_partition_the_right_side() {
        let spec = AsOfSpec::new("t", "t").with_by(["sym"]);
        let out = merge(&spec);
        assert_eq!(out.columns(), ["t", "sym", "t_right", "px"]);
        assert_eq!(pxs(&out), ["", "b", "c"]);

        let spec = AsOfSpec::new("t", "t").with_by(["sym"]).with_direction(Direction::Forward);
        // The t = 5 quote belongs to B, so A at t = 1 reaches forward to t = 2.
        assert_eq!(pxs(&merge(&spec)), ["a", "b", ""]);
    }

    #[test]
    fn backward_matches_are_monotone_in_left_time() {
        let left = RowSet::from_records(
            ["0", "1", "2", "3", "4", "5", "6", "7", "8"].map(|t| vec![("t", t)]),
        )
        .unwrap();
        let right = RowSet::from_records(
            ["6", "1", "3", "3", "8"].map(|t| vec![("t", t), ("v", t)]),
        )
        .unwrap();
        let out = merge_asof(&left, &right, &AsOfSpec::new("t", "t"), &EngineOptions::default())
            .unwrap();
        assert_eq!(out.len(), left.len());
        let matched: Vec<f64> = out
            .column_values("v")
            .unwrap()
            .into_iter()
            .filter(|v| !v.is_empty())
            .map(|v| v.parse().unwrap())
            .collect();
        assert!(matched.windows(2).all(|w| w[0] <= w[1]));
        for (l, r) in out.iter().map(|row| (row.cell(0), row.cell(2))) {
            if !r.is_empty() {
                assert!(r.parse::<f64>().unwrap() <= l.parse::<f64>().unwrap());
            }
        }
    }

    #[test]
    fn calendar_times_and_bad_cells() {
        let left = RowSet::from_records([
            vec![("ts", "2024-03-01 10:00:30")],
            vec![("ts", "")],
            vec![("ts", "soon")],
        ])
        .unwrap();
        let right = RowSet::from_records([
            vec![("at", "2024-03-01 10:00:00"), ("v", "x")],
            vec![("at", "2024-03-01 10:05:00"), ("v", "y")],
        ])
        .unwrap();
        let spec = AsOfSpec::new("ts", "at").with_tolerance("1T".parse().unwrap());

        let err = merge_asof(&left, &right, &spec, &EngineOptions::default()).unwrap_err();
        assert_eq!(
            err,
            EngineError::TimeParse {
                row: 2,
                column: "ts".into(),
                value: "soon".into()
            }
        );

        let tolerant = EngineOptions::default().with_ignore_errors(true);
        let out = merge_asof(&left, &right, &spec, &tolerant).unwrap();
        let vs: Vec<_> = out.column_values("v").unwrap();
        assert_eq!(vs, ["x", "", ""]);
    }

    #[test]
    fn missing_columns_are_reported() {
        let spec = AsOfSpec::new("t", "nope");
        assert!(matches!(
            merge_asof(&trades(), &quotes(), &spec, &EngineOptions::default()),
            Err(EngineError::Schema(_))
        ));
    }
}
