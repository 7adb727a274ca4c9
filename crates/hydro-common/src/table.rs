//! In-memory relational table.
//!
//! Row-major storage with named, typed columns. Tables flow between the
//! materializer, the GeoPackage reader and writer, and the relational engine,
//! which queries them as arrow record batches.

use crate::error::{EtlError, EtlResult};
use crate::geometry::SpatialRef;
use crate::value::{ColumnType, Value};

/// A named, typed column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Row-major table of [`Value`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
    srs: Option<SpatialRef>,
}

impl Table {
    /// Create an empty table with the given schema.
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            srs: None,
        }
    }

    /// Create a table from rows, checking every row against the schema width.
    pub fn from_rows(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> EtlResult<Self> {
        let mut table = Self::new(columns);
        table.rows.reserve(rows.len());
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Create a table inferring each column type from its first non-missing value.
    pub fn from_records(names: &[&str], rows: Vec<Vec<Value>>) -> EtlResult<Self> {
        let columns = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let kind = rows
                    .iter()
                    .filter_map(|r| r.get(i))
                    .find(|v| !v.is_missing())
                    .map(ColumnType::infer)
                    .unwrap_or(ColumnType::Real);
                Column::new(*name, kind)
            })
            .collect();
        Self::from_rows(columns, rows)
    }

    pub fn with_srs(mut self, srs: Option<SpatialRef>) -> Self {
        self.srs = srs;
        self
    }

    pub fn set_srs(&mut self, srs: Option<SpatialRef>) {
        self.srs = srs;
    }

    pub fn srs(&self) -> Option<&SpatialRef> {
        self.srs.as_ref()
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> EtlResult<()> {
        if row.len() != self.columns.len() {
            return Err(EtlError::ContainerError(format!(
                "row has {} values, table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Index of the first column with this exact name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Like [`column_index`](Self::column_index) but fails with `MissingColumn`.
    pub fn require_column(&self, name: &str) -> EtlResult<usize> {
        self.column_index(name)
            .ok_or_else(|| EtlError::MissingColumn(name.to_string()))
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, name: &str) -> EtlResult<Vec<&Value>> {
        let idx = self.require_column(name)?;
        Ok(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// Indices of geometry-typed columns.
    pub fn geometry_columns(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind.is_geometry())
            .map(|(i, _)| i)
            .collect()
    }

    /// The first geometry column, if any.
    pub fn geometry_column(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.kind.is_geometry())
    }

    /// Project onto the named columns, in the given order.
    pub fn select(&self, names: &[&str]) -> EtlResult<Table> {
        let indices = names
            .iter()
            .map(|n| self.require_column(n))
            .collect::<EtlResult<Vec<_>>>()?;
        Ok(self.select_indices(&indices))
    }

    /// Project onto columns by index.
    pub fn select_indices(&self, indices: &[usize]) -> Table {
        let columns = indices.iter().map(|&i| self.columns[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|r| indices.iter().map(|&i| r[i].clone()).collect())
            .collect();
        Table {
            columns,
            rows,
            srs: self.srs.clone(),
        }
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> EtlResult<()> {
        let idx = self.require_column(from)?;
        self.columns[idx].name = to.to_string();
        Ok(())
    }

    pub fn set_column_type(&mut self, name: &str, kind: ColumnType) -> EtlResult<()> {
        let idx = self.require_column(name)?;
        self.columns[idx].kind = kind;
        Ok(())
    }

    /// Remove the column at `index`.
    pub fn drop_column_at(&mut self, index: usize) {
        self.columns.remove(index);
        for row in &mut self.rows {
            row.remove(index);
        }
    }

    /// Append a column; `values` must have one entry per row.
    pub fn add_column(&mut self, column: Column, values: Vec<Value>) -> EtlResult<()> {
        if values.len() != self.rows.len() {
            return Err(EtlError::ContainerError(format!(
                "column '{}' has {} values, table has {} rows",
                column.name,
                values.len(),
                self.rows.len()
            )));
        }
        self.columns.push(column);
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    /// Rewrite every value of a column in place.
    pub fn map_column<F>(&mut self, name: &str, mut f: F) -> EtlResult<()>
    where
        F: FnMut(&Value) -> Value,
    {
        let idx = self.require_column(name)?;
        for row in &mut self.rows {
            row[idx] = f(&row[idx]);
        }
        Ok(())
    }
}
