// Copyright 2025 the Rowflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Columnar snapshot of a [`RowSet`].

use crate::numeric::{NumberFormat, try_parse_numeric};
use crate::row::{RowSet, RowSetError, Schema};

/// An owned column-major copy of a row set.
///
/// This is what callers hand to code that wants whole columns (plotting, statistics) rather than
/// records. It carries the same cells as the source, just transposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnFrame {
    /// Column names.
    pub columns: Vec<String>,
    /// Column data, aligned to `columns`.
    pub data: Vec<Vec<String>>,
}

impl ColumnFrame {
    /// Transposes a row set.
    pub fn from_rows(rows: RowSet) -> Self {
        let (schema, rows) = rows.into_parts();
        let n = rows.len();
        let mut data: Vec<Vec<String>> = (0..schema.len()).map(|_| Vec::with_capacity(n)).collect();
        for row in rows {
            for (ci, cell) in row.into_cells().into_iter().enumerate() {
                data[ci].push(cell);
            }
        }
        Self {
            columns: schema.names().to_vec(),
            data,
        }
    }

    /// Returns the number of rows.
    pub fn row_count(&self) -> usize {
        self.data.first().map_or(0, Vec::len)
    }

    /// Returns a column index by name, if present.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cells of one column.
    pub fn column(&self, name: &str) -> Option<&[String]> {
        let ci = self.column_index(name)?;
        self.data.get(ci).map(Vec::as_slice)
    }

    /// One column parsed as numbers; cells that do not parse are `None`.
    pub fn numeric(&self, name: &str, format: &NumberFormat) -> Option<Vec<Option<f64>>> {
        let col = self.column(name)?;
        Some(col.iter().map(|c| try_parse_numeric(c, format)).collect())
    }

    /// Transposes back into a row set.
    pub fn into_rows(self) -> Result<RowSet, RowSetError> {
        let n = self.row_count();
        let schema = Schema::new(self.columns)?;
        let mut columns: Vec<_> = self.data.into_iter().map(Vec::into_iter).collect();
        let mut out = RowSet::new(schema);
        for _ in 0..n {
            let cells = columns
                .iter_mut()
                .map(|c| c.next().unwrap_or_default())
                .collect();
            out.push(cells)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transposes_and_back() {
        let rows = RowSet::from_records([
            vec![("t", "1"), ("v", "10")],
            vec![("t", "2"), ("v", "n/a")],
        ])
        .unwrap();
        let frame = ColumnFrame::from_rows(rows.clone());
        assert_eq!(frame.row_count(), 2);
        assert_eq!(frame.column("t").unwrap(), ["1", "2"]);
        assert_eq!(
            frame.numeric("v", &NumberFormat::default()).unwrap(),
            vec![Some(10.0), None]
        );
        assert_eq!(frame.into_rows().unwrap(), rows);
    }
}
