// Copyright 2025 the Rowflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Row-oriented table representation consumed and produced by every transform.

use core::fmt;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned when building or addressing a [`RowSet`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowSetError {
    /// A column name appears more than once in a schema.
    #[error("duplicate column `{0}` in schema")]
    DuplicateColumn(String),
    /// A referenced column does not exist.
    #[error("column `{0}` does not exist")]
    UnknownColumn(String),
    /// A positional column reference is past the end of the schema.
    #[error("column index {index} is out of range for a schema of {len} columns")]
    IndexOutOfRange {
        /// The requested position.
        index: usize,
        /// Number of columns in the schema.
        len: usize,
    },
    /// A row does not carry exactly one cell per schema column.
    #[error("row {row} has {found} cells but the schema has {expected} columns")]
    RowWidth {
        /// Index the row would have had.
        row: usize,
        /// Number of schema columns.
        expected: usize,
        /// Number of cells supplied.
        found: usize,
    },
}

/// Ordered, unique column names.
#[derive(Clone, Default)]
pub struct Schema {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Schema {
    /// Builds a schema, rejecting duplicate names.
    pub fn new<I, S>(names: I) -> Result<Self, RowSetError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut schema = Self::default();
        for name in names {
            schema.push(name)?;
        }
        Ok(schema)
    }

    /// Appends a column and returns its position.
    pub fn push(&mut self, name: impl Into<String>) -> Result<usize, RowSetError> {
        let name = name.into();
        if self.index.contains_key(name.as_str()) {
            return Err(RowSetError::DuplicateColumn(name));
        }
        let pos = self.names.len();
        self.index.insert(name.clone(), pos);
        self.names.push(name);
        Ok(pos)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Column names in order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Name of the column at `pos`.
    pub fn name(&self, pos: usize) -> Option<&str> {
        self.names.get(pos).map(String::as_str)
    }

    /// Position of a column, if present.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Returns `true` if the column exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Position of a column, or [`RowSetError::UnknownColumn`].
    pub fn require(&self, name: &str) -> Result<usize, RowSetError> {
        self.position(name)
            .ok_or_else(|| RowSetError::UnknownColumn(name.to_owned()))
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.names == other.names
    }
}

impl Eq for Schema {}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.names).finish()
    }
}

/// A column addressed either by name or by position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnRef {
    /// Zero-based column position.
    Index(usize),
    /// Column name.
    Name(String),
}

impl ColumnRef {
    /// Resolves the reference to a position in `schema`.
    pub fn resolve(&self, schema: &Schema) -> Result<usize, RowSetError> {
        match self {
            Self::Name(name) => schema.require(name),
            Self::Index(index) if *index < schema.len() => Ok(*index),
            Self::Index(index) => Err(RowSetError::IndexOutOfRange {
                index: *index,
                len: schema.len(),
            }),
        }
    }

    /// Resolves the reference and returns the column name it points at.
    pub fn resolve_name<'a>(&self, schema: &'a Schema) -> Result<&'a str, RowSetError> {
        let pos = self.resolve(schema)?;
        Ok(&schema.names[pos])
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "#{i}"),
            Self::Name(n) => f.write_str(n),
        }
    }
}

impl From<&str> for ColumnRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<String> for ColumnRef {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<usize> for ColumnRef {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// One record: cells aligned to the owning [`RowSet`]'s schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    cells: Vec<String>,
}

impl Row {
    /// Wraps cells as a row.
    pub fn new(cells: Vec<String>) -> Self {
        Self { cells }
    }

    /// All cells in schema order.
    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    /// Cell at `pos`.
    pub fn get(&self, pos: usize) -> Option<&str> {
        self.cells.get(pos).map(String::as_str)
    }

    /// Cell at `pos`, or `""` when out of range.
    pub fn cell(&self, pos: usize) -> &str {
        self.get(pos).unwrap_or("")
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns `true` if the row has no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Consumes the row, returning its cells.
    pub fn into_cells(self) -> Vec<String> {
        self.cells
    }
}

impl From<Vec<String>> for Row {
    fn from(cells: Vec<String>) -> Self {
        Self { cells }
    }
}

/// An ordered sequence of rows sharing one schema.
///
/// Every row carries exactly `schema().len()` cells; missing values are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSet {
    schema: Schema,
    rows: Vec<Row>,
}

impl RowSet {
    /// Creates an empty row set with the given schema.
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    /// Creates an empty row set from column names.
    pub fn with_columns<I, S>(names: I) -> Result<Self, RowSetError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self::new(Schema::new(names)?))
    }

    /// Builds a row set from a schema and cell rows, checking every row's width.
    pub fn from_rows<R, C>(schema: Schema, rows: R) -> Result<Self, RowSetError>
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let mut out = Self::new(schema);
        for row in rows {
            out.push(row.into_iter().map(Into::into).collect())?;
        }
        Ok(out)
    }

    /// Builds a row set from ordered name/value records.
    ///
    /// The schema is the union of record keys in first-seen order. Columns a record does not
    /// mention are filled with `""`; a key repeated within one record keeps its last value.
    pub fn from_records<I, R, K, V>(records: I) -> Result<Self, RowSetError>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut schema = Schema::default();
        let mut staged: Vec<Vec<(usize, String)>> = Vec::new();
        for record in records {
            let mut cells = Vec::new();
            for (key, value) in record {
                let key = key.into();
                let pos = match schema.position(&key) {
                    Some(pos) => pos,
                    None => schema.push(key)?,
                };
                cells.push((pos, value.into()));
            }
            staged.push(cells);
        }

        let width = schema.len();
        let mut out = Self::new(schema);
        out.rows.reserve(staged.len());
        for cells in staged {
            let mut row = vec![String::new(); width];
            for (pos, value) in cells {
                row[pos] = value;
            }
            out.rows.push(Row::new(row));
        }
        Ok(out)
    }

    /// Appends a row, rejecting it if its width differs from the schema.
    pub fn push(&mut self, cells: Vec<String>) -> Result<(), RowSetError> {
        if cells.len() != self.schema.len() {
            return Err(RowSetError::RowWidth {
                row: self.rows.len(),
                expected: self.schema.len(),
                found: cells.len(),
            });
        }
        self.rows.push(Row::new(cells));
        Ok(())
    }

    /// Appends an already-built [`Row`].
    pub fn push_row(&mut self, row: Row) -> Result<(), RowSetError> {
        self.push(row.into_cells())
    }

    /// The schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Column names in order.
    pub fn columns(&self) -> &[String] {
        self.schema.names()
    }

    /// All rows in order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Row at `index`.
    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterates over rows.
    pub fn iter(&self) -> core::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    /// Cell at (`row`, `col`).
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col)
    }

    /// Cell at `row` in the named column.
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.schema.position(column)?;
        self.cell(row, col)
    }

    /// Ordered `(column, value)` view of one row.
    pub fn record(&self, row: usize) -> Option<impl Iterator<Item = (&str, &str)>> {
        let row = self.rows.get(row)?;
        Some(
            self.schema
                .names()
                .iter()
                .map(String::as_str)
                .zip(row.cells().iter().map(String::as_str)),
        )
    }

    /// All cells of the named column, top to bottom.
    pub fn column_values(&self, column: &str) -> Result<Vec<&str>, RowSetError> {
        let col = self.schema.require(column)?;
        Ok(self.rows.iter().map(|r| r.cell(col)).collect())
    }

    /// Splits the row set into its schema and rows.
    pub fn into_parts(self) -> (Schema, Vec<Row>) {
        (self.schema, self.rows)
    }
}

impl<'a> IntoIterator for &'a RowSet {
    type Item = &'a Row;
    type IntoIter = core::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_rejects_duplicates() {
        let err = Schema::new(["a", "b", "a"]).unwrap_err();
        assert_eq!(err, RowSetError::DuplicateColumn("a".into()));
    }

    #[test]
    fn push_checks_row_width() {
        let mut rows = RowSet::with_columns(["a", "b"]).unwrap();
        rows.push(vec!["1".into(), "2".into()]).unwrap();
        let err = rows.push(vec!["3".into()]).unwrap_err();
        assert_eq!(
            err,
            RowSetError::RowWidth {
                row: 1,
                expected: 2,
                found: 1
            }
        );
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn records_fill_missing_columns_with_empty_strings() {
        let rows = RowSet::from_records([
            vec![("id", "1"), ("a", "x")],
            vec![("id", "2"), ("b", "y")],
        ])
        .unwrap();
        assert_eq!(rows.columns(), ["id", "a", "b"]);
        assert_eq!(rows.row(0).unwrap().cells(), ["1", "x", ""]);
        assert_eq!(rows.row(1).unwrap().cells(), ["2", "", "y"]);
        assert_eq!(rows.value(1, "b"), Some("y"));
    }

    #[test]
    fn record_view_pairs_names_with_cells() {
        let rows = RowSet::from_records([vec![("t", "1"), ("v", "10")]]).unwrap();
        let pairs: Vec<_> = rows.record(0).unwrap().collect();
        assert_eq!(pairs, vec![("t", "1"), ("v", "10")]);
        assert!(rows.record(1).is_none());
    }

    #[test]
    fn column_ref_resolves_by_name_and_index() {
        let schema = Schema::new(["a", "b"]).unwrap();
        assert_eq!(ColumnRef::from("b").resolve(&schema), Ok(1));
        assert_eq!(ColumnRef::from(0_usize).resolve_name(&schema), Ok("a"));
        assert_eq!(
            ColumnRef::from(5_usize).resolve(&schema),
            Err(RowSetError::IndexOutOfRange { index: 5, len: 2 })
        );
        assert_eq!(
            ColumnRef::from("zz").resolve(&schema),
            Err(RowSetError::UnknownColumn("zz".into()))
        );
    }
}
