// Copyright 2025 the Rowflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Stage IR types.
//!
//! Every option object here is immutable once built. Constructors that take user-facing strings
//! (`"Price:mean"`, `"5T"`, `"Backward"`) validate eagerly so configuration mistakes surface
//! before a pipeline reads anything.

use core::fmt;
use core::num::NonZeroUsize;
use core::str::FromStr;

use rowflow_core::{ColumnRef, RowSet, TimeSpan};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::pipeline::RowSource;

/// Aggregate function for [`AggregateSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFn {
    /// Arithmetic mean of numeric cells.
    Mean,
    /// Sum of numeric cells.
    Sum,
    /// Smallest numeric cell.
    Min,
    /// Largest numeric cell.
    Max,
    /// Number of rows in the group, parseable or not.
    Count,
    /// Sample standard deviation (`n - 1`).
    Std,
    /// Sample variance (`n - 1`).
    Var,
    /// Median, interpolated between the middle order statistics.
    Median,
    /// First quartile, interpolated.
    Q1,
    /// Third quartile, interpolated.
    Q3,
    /// The first row's cell, verbatim.
    First,
    /// The last row's cell, verbatim.
    Last,
}

impl AggregateFn {
    /// Lower-case name used in generated column names.
    pub fn name(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Count => "count",
            Self::Std => "std",
            Self::Var => "var",
            Self::Median => "median",
            Self::Q1 => "q1",
            Self::Q3 => "q3",
            Self::First => "first",
            Self::Last => "last",
        }
    }

    /// Returns `true` for functions that read cells as numbers.
    pub fn is_numeric(self) -> bool {
        !matches!(self, Self::Count | Self::First | Self::Last)
    }
}

impl fmt::Display for AggregateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AggregateFn {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "mean" | "avg" | "average" => Self::Mean,
            "sum" => Self::Sum,
            "min" => Self::Min,
            "max" => Self::Max,
            "count" => Self::Count,
            "std" | "stddev" => Self::Std,
            "var" | "variance" => Self::Var,
            "median" => Self::Median,
            "q1" => Self::Q1,
            "q3" => Self::Q3,
            "first" => Self::First,
            "last" => Self::Last,
            _ => return Err(EngineError::invalid("aggregate function", s.trim())),
        })
    }
}

/// One aggregated output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSpec {
    /// Source column.
    pub column: String,
    /// Function to apply.
    pub function: AggregateFn,
    /// Output column name; defaults to `{column}{separator}{function}`.
    #[serde(default)]
    pub output: Option<String>,
}

impl AggregateSpec {
    /// Aggregates `column` with `function`.
    pub fn new(column: impl Into<String>, function: AggregateFn) -> Self {
        Self {
            column: column.into(),
            function,
            output: None,
        }
    }

    /// Names the output column explicitly.
    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.output = Some(name.into());
        self
    }
}

impl FromStr for AggregateSpec {
    type Err = EngineError;

    /// Parses `column:function` or `column:function:output`.
    ///
    /// The column part may itself contain `:`; the function is located from the right. When
    /// the second-to-last segment names a function, the last segment is the output name, even
    /// if it is a function name too (`Price:mean:sum`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let n = parts.len();
        if n >= 3 {
            if let Ok(function) = parts[n - 2].parse::<AggregateFn>() {
                let column = parts[..n - 2].join(":");
                return Ok(Self::new(column, function).with_output(parts[n - 1]));
            }
        }
        if n >= 2 {
            if let Ok(function) = parts[n - 1].parse::<AggregateFn>() {
                return Ok(Self::new(parts[..n - 1].join(":"), function));
            }
        }
        Err(EngineError::invalid(
            "aggregate",
            format!("`{s}` is not of the form column:function[:output]"),
        ))
    }
}

/// Group rows by key columns and aggregate each group.
///
/// Output columns are `keys` (in order) followed by the aggregates (in order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupBySpec {
    /// Grouping columns; empty means a single group over all rows.
    #[serde(default)]
    pub keys: Vec<String>,
    /// Aggregated outputs.
    pub aggregates: Vec<AggregateSpec>,
}

impl GroupBySpec {
    /// Groups by `keys`.
    pub fn new<I, S>(keys: I, aggregates: Vec<AggregateSpec>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            aggregates,
        }
    }

    /// Aggregates over all rows as one group.
    pub fn all(aggregates: Vec<AggregateSpec>) -> Self {
        Self {
            keys: Vec::new(),
            aggregates,
        }
    }
}

/// Join semantics for [`JoinSpec`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    /// Only matched pairs.
    #[default]
    Inner,
    /// Every left row; unmatched right cells are empty.
    Left,
    /// Every right row; unmatched left cells are empty.
    Right,
    /// Every left row plus every unmatched right row.
    Outer,
}

impl FromStr for JoinType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "inner" => Self::Inner,
            "left" => Self::Left,
            "right" => Self::Right,
            "outer" | "full" | "fullouter" => Self::Outer,
            _ => return Err(EngineError::invalid("join type", s.trim())),
        })
    }
}

/// One key column pair of an equality join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinKey {
    /// Key column on the left side.
    pub left: ColumnRef,
    /// Key column on the right side.
    pub right: ColumnRef,
    /// Output column name; defaults to the left column's name.
    #[serde(default)]
    pub output: Option<String>,
}

impl JoinKey {
    /// Joins on a column with the same name on both sides.
    pub fn on(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            left: ColumnRef::Name(name.clone()),
            right: ColumnRef::Name(name),
            output: None,
        }
    }

    /// Joins differently named (or positioned) columns.
    pub fn pair(left: impl Into<ColumnRef>, right: impl Into<ColumnRef>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
            output: None,
        }
    }

    /// Names the output key column.
    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.output = Some(name.into());
        self
    }
}

/// An equality join.
///
/// Non-key columns present on both sides are renamed with the prefixes and suffixes given here.
/// When all four are empty, the right column receives the suffix `_right`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSpec {
    /// Key pairs, compared as a tuple.
    pub keys: Vec<JoinKey>,
    /// Join semantics.
    #[serde(default)]
    pub join_type: JoinType,
    /// Prefix for colliding left columns.
    #[serde(default)]
    pub left_prefix: String,
    /// Suffix for colliding left columns.
    #[serde(default)]
    pub left_suffix: String,
    /// Prefix for colliding right columns.
    #[serde(default)]
    pub right_prefix: String,
    /// Suffix for colliding right columns.
    #[serde(default)]
    pub right_suffix: String,
    /// Restrict the output to the keys plus these output columns.
    #[serde(default)]
    pub select: Option<Vec<String>>,
}

impl JoinSpec {
    /// Default suffix for colliding right columns when no affixes are configured.
    pub const DEFAULT_RIGHT_SUFFIX: &'static str = "_right";

    /// Joins on `keys` with the given semantics.
    pub fn new(keys: Vec<JoinKey>, join_type: JoinType) -> Self {
        Self {
            keys,
            join_type,
            left_prefix: String::new(),
            left_suffix: String::new(),
            right_prefix: String::new(),
            right_suffix: String::new(),
            select: None,
        }
    }

    /// Sets the collision suffixes.
    pub fn with_suffixes(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.left_suffix = left.into();
        self.right_suffix = right.into();
        self
    }

    /// Sets the collision prefixes.
    pub fn with_prefixes(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.left_prefix = left.into();
        self.right_prefix = right.into();
        self
    }

    /// Projects the output to the keys plus `columns`.
    pub fn with_select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub(crate) fn has_affixes(&self) -> bool {
        !(self.left_prefix.is_empty()
            && self.left_suffix.is_empty()
            && self.right_prefix.is_empty()
            && self.right_suffix.is_empty())
    }
}

/// Which right row an as-of merge picks for a left timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Latest right row at or before the left time.
    #[default]
    Backward,
    /// Earliest right row at or after the left time.
    Forward,
    /// Whichever of the two is closer; ties go backward.
    Nearest,
}

impl FromStr for Direction {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "backward" => Self::Backward,
            "forward" => Self::Forward,
            "nearest" => Self::Nearest,
            _ => return Err(EngineError::invalid("as-of direction", s.trim())),
        })
    }
}

/// A temporal nearest-match join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsOfSpec {
    /// Time column on the left side.
    pub left_on: String,
    /// Time column on the right side.
    pub right_on: String,
    /// Match direction.
    #[serde(default)]
    pub direction: Direction,
    /// Largest accepted time distance.
    #[serde(default)]
    pub tolerance: Option<TimeSpan>,
    /// Suffix for right columns whose names collide with left columns.
    #[serde(default = "default_asof_suffix")]
    pub suffix: String,
    /// Columns that must match exactly before times are compared.
    #[serde(default)]
    pub by: Vec<String>,
    /// Whether equal timestamps may match.
    #[serde(default = "default_true")]
    pub allow_exact_matches: bool,
}

fn default_asof_suffix() -> String {
    String::from("_right")
}

fn default_true() -> bool {
    true
}

impl AsOfSpec {
    /// Merges on `left_on` / `right_on`, backward, without tolerance.
    pub fn new(left_on: impl Into<String>, right_on: impl Into<String>) -> Self {
        Self {
            left_on: left_on.into(),
            right_on: right_on.into(),
            direction: Direction::Backward,
            tolerance: None,
            suffix: default_asof_suffix(),
            by: Vec::new(),
            allow_exact_matches: true,
        }
    }

    /// Sets the direction.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Sets the tolerance.
    pub fn with_tolerance(mut self, tolerance: TimeSpan) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    /// Sets the collision suffix.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Requires these columns to match exactly.
    pub fn with_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.by = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Controls whether equal timestamps may match.
    pub fn with_exact_matches(mut self, allow: bool) -> Self {
        self.allow_exact_matches = allow;
        self
    }
}

/// Aggregation used by resample and rolling windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowMethod {
    /// Mean.
    #[default]
    Mean,
    /// Minimum.
    Min,
    /// Maximum.
    Max,
    /// Sum.
    Sum,
    /// Number of numeric cells.
    Count,
    /// Sample standard deviation.
    Std,
    /// Sample variance.
    Var,
    /// Interpolated median.
    Median,
}

impl WindowMethod {
    /// Lower-case name used in generated column names.
    pub fn name(self) -> &'static str {
        self.as_aggregate().name()
    }

    pub(crate) fn as_aggregate(self) -> AggregateFn {
        match self {
            Self::Mean => AggregateFn::Mean,
            Self::Min => AggregateFn::Min,
            Self::Max => AggregateFn::Max,
            Self::Sum => AggregateFn::Sum,
            Self::Count => AggregateFn::Count,
            Self::Std => AggregateFn::Std,
            Self::Var => AggregateFn::Var,
            Self::Median => AggregateFn::Median,
        }
    }
}

impl FromStr for WindowMethod {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<AggregateFn>() {
            Ok(AggregateFn::Mean) => Ok(Self::Mean),
            Ok(AggregateFn::Min) => Ok(Self::Min),
            Ok(AggregateFn::Max) => Ok(Self::Max),
            Ok(AggregateFn::Sum) => Ok(Self::Sum),
            Ok(AggregateFn::Count) => Ok(Self::Count),
            Ok(AggregateFn::Std) => Ok(Self::Std),
            Ok(AggregateFn::Var) => Ok(Self::Var),
            Ok(AggregateFn::Median) => Ok(Self::Median),
            _ => Err(EngineError::invalid("window method", s.trim())),
        }
    }
}

/// Time-bucketed aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResampleSpec {
    /// Time column.
    pub time_column: String,
    /// Columns to aggregate per bucket.
    pub columns: Vec<String>,
    /// Bucket width.
    pub every: TimeSpan,
    /// Aggregation.
    #[serde(default)]
    pub method: WindowMethod,
}

impl ResampleSpec {
    /// Buckets `time_column` into `every`-wide windows.
    pub fn new<I, S>(
        time_column: impl Into<String>,
        columns: I,
        every: TimeSpan,
        method: WindowMethod,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            time_column: time_column.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            every,
            method,
        }
    }

    /// Like [`ResampleSpec::new`] with the width given as a string such as `"5T"`.
    pub fn parse<I, S>(
        time_column: impl Into<String>,
        columns: I,
        every: &str,
        method: WindowMethod,
    ) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self::new(time_column, columns, every.parse()?, method))
    }
}

/// Trailing row-count window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingSpec {
    /// Columns to aggregate.
    pub columns: Vec<String>,
    /// Number of rows in a full window.
    pub size: NonZeroUsize,
    /// Aggregation.
    #[serde(default)]
    pub method: WindowMethod,
}

impl RollingSpec {
    /// Rolls over `size` rows; `size` must be at least 1.
    pub fn new<I, S>(columns: I, size: usize, method: WindowMethod) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let size = NonZeroUsize::new(size).ok_or_else(|| {
            EngineError::invalid("rolling window", "the window size must be at least 1")
        })?;
        Ok(Self {
            columns: columns.into_iter().map(Into::into).collect(),
            size,
            method,
        })
    }
}

/// Sorting order for [`SortSpec`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending order.
    #[default]
    Asc,
    /// Descending order.
    Desc,
}

/// Stable reorder by a numeric or time column.
///
/// Cells that parse as neither sort last, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    /// Column used as the sort key.
    pub column: String,
    /// Sort order.
    #[serde(default)]
    pub order: SortOrder,
}

impl SortSpec {
    /// Sorts ascending by `column`.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            order: SortOrder::Asc,
        }
    }

    /// Sorts descending by `column`.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            order: SortOrder::Desc,
        }
    }
}

/// Comparison operators for numeric predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `==` (exact float equality)
    Eq,
    /// `!=` (exact float inequality)
    Ne,
}

/// A row predicate used by [`Stage::Filter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    /// Column to read.
    pub column: String,
    /// Comparison operator.
    pub op: CompareOp,
    /// Right-hand constant.
    pub value: f64,
}

impl Predicate {
    /// Compares `column` against `value`.
    pub fn new(column: impl Into<String>, op: CompareOp, value: f64) -> Self {
        Self {
            column: column.into(),
            op,
            value,
        }
    }

    /// Evaluate the predicate for a given numeric value.
    pub fn eval(&self, v: f64) -> bool {
        match self.op {
            CompareOp::Lt => v < self.value,
            CompareOp::Le => v <= self.value,
            CompareOp::Gt => v > self.value,
            CompareOp::Ge => v >= self.value,
            CompareOp::Eq => v == self.value,
            CompareOp::Ne => v != self.value,
        }
    }
}

/// Rescaling method for [`NormalizeSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalizeMethod {
    /// Map `[min, max]` onto `[0, 1]`.
    MinMax,
    /// Subtract the mean and divide by the sample standard deviation.
    ZScore,
}

impl FromStr for NormalizeMethod {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minmax" => Ok(Self::MinMax),
            "zscore" => Ok(Self::ZScore),
            _ => Err(EngineError::invalid("normalization method", s.trim())),
        }
    }
}

/// Rescale one column in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeSpec {
    /// Column to rescale.
    pub column: String,
    /// Method.
    pub method: NormalizeMethod,
}

impl NormalizeSpec {
    /// Rescales `column` with `method`.
    pub fn new(column: impl Into<String>, method: NormalizeMethod) -> Self {
        Self {
            column: column.into(),
            method,
        }
    }
}

impl FromStr for NormalizeSpec {
    type Err = EngineError;

    /// Parses `column:Method`, e.g. `Price:MinMax`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (column, method) = s.rsplit_once(':').ok_or_else(|| {
            EngineError::invalid("normalization", format!("`{s}` is not of the form column:method"))
        })?;
        Ok(Self::new(column, method.parse()?))
    }
}

/// Right-hand input of a binary stage.
pub enum Operand {
    /// Rows already in memory.
    Rows(RowSet),
    /// A source read once when the pipeline is materialized.
    Deferred(Box<dyn RowSource>),
}

impl Operand {
    /// Defers reading `source` until materialization.
    pub fn deferred(source: impl RowSource + 'static) -> Self {
        Self::Deferred(Box::new(source))
    }

    pub(crate) fn load(&mut self) -> Result<(), crate::error::BoxError> {
        if let Self::Deferred(source) = self {
            let rows = source.read()?;
            *self = Self::Rows(rows);
        }
        Ok(())
    }

    pub(crate) fn rows(&self) -> Result<&RowSet, EngineError> {
        match self {
            Self::Rows(rows) => Ok(rows),
            Self::Deferred(_) => Err(EngineError::invalid(
                "operand",
                "the right-hand input has not been read",
            )),
        }
    }
}

impl fmt::Debug for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rows(rows) => f
                .debug_struct("Rows")
                .field("columns", rows.schema())
                .field("len", &rows.len())
                .finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl From<RowSet> for Operand {
    fn from(rows: RowSet) -> Self {
        Self::Rows(rows)
    }
}

/// One queued pipeline operation.
#[derive(Debug)]
pub enum Stage {
    /// Keep only rows that satisfy a predicate.
    Filter(Predicate),
    /// Stable reorder by a numeric or time column.
    Sort(SortSpec),
    /// Rescale columns in place.
    Normalize(Vec<NormalizeSpec>),
    /// Group and aggregate.
    GroupBy(GroupBySpec),
    /// Equality join against a right-hand input.
    Join {
        /// Right-hand input.
        right: Operand,
        /// Join configuration.
        spec: JoinSpec,
    },
    /// Nearest-time join against a right-hand input.
    AsOf {
        /// Right-hand input.
        right: Operand,
        /// Merge configuration.
        spec: AsOfSpec,
    },
    /// Time-bucket aggregation.
    Resample(ResampleSpec),
    /// Trailing row-count aggregation.
    Rolling(RollingSpec),
}

impl Stage {
    /// Operation name used in logs and errors.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Filter(_) => "filter",
            Self::Sort(_) => "sort",
            Self::Normalize(_) => "normalize",
            Self::GroupBy(_) => "group-by",
            Self::Join { .. } => "join",
            Self::AsOf { .. } => "merge-asof",
            Self::Resample(_) => "resample",
            Self::Rolling(_) => "rolling",
        }
    }
}
