//! Arrow bridge for the relational steps.
//!
//! Tables are registered on a DataFusion [`SessionContext`] as in-memory
//! record batches and queried with SQL. Each registered table carries a
//! `__row` column holding its row index so queries can order by input
//! position; result columns whose name starts with `__` are dropped when
//! converting back.
//!
//! Missing values (null and NaN) travel as arrow nulls. Geometry columns are
//! carried as binary GeoPackage blobs and recovered from the column kinds of
//! the registered tables.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BinaryArray, BinaryBuilder, Float64Array, Float64Builder, Int64Array,
    Int64Builder, StringArray, StringBuilder, TimestampMicrosecondArray,
    TimestampMicrosecondBuilder,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::DateTime;
use datafusion::datasource::MemTable;
use datafusion::prelude::SessionContext;
use tracing::debug;

use hydro_common::{
    parse_timestamp, Column, ColumnType, EtlError, EtlResult, Geometry, SpatialRef, Table, Value,
};

/// Hidden row-index column added to every registered table.
pub const ROW_INDEX: &str = "__row";

const HIDDEN_PREFIX: &str = "__";

/// A set of tables queried together.
pub struct SqlFrames {
    ctx: SessionContext,
    kinds: HashMap<String, ColumnType>,
    srs: Option<SpatialRef>,
}

impl Default for SqlFrames {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlFrames {
    pub fn new() -> Self {
        Self {
            ctx: SessionContext::new(),
            kinds: HashMap::new(),
            srs: None,
        }
    }

    /// Register `table` under `name`.
    ///
    /// The first registered table with a spatial reference supplies the SRS
    /// of every query result.
    pub fn register(&mut self, name: &str, table: &Table) -> EtlResult<()> {
        let batch = to_batch(table)?;
        let provider =
            MemTable::try_new(batch.schema(), vec![vec![batch]]).map_err(query_error)?;
        let _ = self
            .ctx
            .register_table(name, Arc::new(provider))
            .map_err(query_error)?;

        for column in table.columns() {
            self.kinds
                .entry(column.name.clone())
                .or_insert_with(|| column.kind.clone());
        }
        if self.srs.is_none() {
            self.srs = table.srs().cloned();
        }
        Ok(())
    }

    /// Declare the kind of a result column the query renames.
    pub fn hint(&mut self, name: impl Into<String>, kind: ColumnType) {
        self.kinds.insert(name.into(), kind);
    }

    /// Run `sql` and collect the result as a [`Table`].
    pub async fn query(&self, sql: &str) -> EtlResult<Table> {
        debug!(sql, "Running relational query");
        let df = self.ctx.sql(sql).await.map_err(query_error)?;
        let schema = df.schema().as_arrow().clone();
        let batches = df.collect().await.map_err(query_error)?;
        to_table(&schema, &batches, &self.kinds, self.srs.clone())
    }
}

/// Quote a column name for SQL.
pub fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn query_error(err: impl std::fmt::Display) -> EtlError {
    EtlError::QueryError(err.to_string())
}

/// Arrow type a column kind is stored as.
fn storage_type(kind: &ColumnType) -> DataType {
    match kind {
        ColumnType::Integer => DataType::Int64,
        ColumnType::Real => DataType::Float64,
        ColumnType::Text => DataType::Utf8,
        ColumnType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
        ColumnType::Blob | ColumnType::Geometry { .. } => DataType::Binary,
    }
}

/// Column kind for a result column nothing declared.
fn kind_of(data_type: &DataType) -> ColumnType {
    match data_type {
        DataType::Boolean
        | DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => ColumnType::Integer,
        DataType::Float16 | DataType::Float32 | DataType::Float64 | DataType::Decimal128(..) => {
            ColumnType::Real
        }
        DataType::Timestamp(..) | DataType::Date32 | DataType::Date64 => ColumnType::Timestamp,
        DataType::Binary | DataType::LargeBinary => ColumnType::Blob,
        _ => ColumnType::Text,
    }
}

fn cell_mismatch(column: &Column, value: &Value) -> EtlError {
    EtlError::QueryError(format!(
        "column '{}' ({:?}) holds incompatible value {}",
        column.name, column.kind, value
    ))
}

fn column_array(table: &Table, index: usize) -> EtlResult<ArrayRef> {
    let column = &table.columns()[index];
    let rows = table.row_count();
    let cells = table.rows().iter().map(|row| &row[index]);

    let array: ArrayRef = match &column.kind {
        ColumnType::Integer => {
            let mut builder = Int64Builder::with_capacity(rows);
            for value in cells {
                if value.is_missing() {
                    builder.append_null();
                } else {
                    let v = value.as_i64().ok_or_else(|| cell_mismatch(column, value))?;
                    builder.append_value(v);
                }
            }
            Arc::new(builder.finish())
        }
        ColumnType::Real => {
            let mut builder = Float64Builder::with_capacity(rows);
            for value in cells {
                if value.is_missing() {
                    builder.append_null();
                } else {
                    let v = value.as_f64().ok_or_else(|| cell_mismatch(column, value))?;
                    builder.append_value(v);
                }
            }
            Arc::new(builder.finish())
        }
        ColumnType::Text => {
            let mut builder = StringBuilder::with_capacity(rows, rows * 8);
            for value in cells {
                match value {
                    Value::Text(s) => builder.append_value(s),
                    v if v.is_missing() => builder.append_null(),
                    v => builder.append_value(v.to_string()),
                }
            }
            Arc::new(builder.finish())
        }
        ColumnType::Timestamp => {
            let mut builder = TimestampMicrosecondBuilder::with_capacity(rows);
            for value in cells {
                match value {
                    Value::Timestamp(t) => builder.append_value(t.timestamp_micros()),
                    Value::Text(s) => {
                        let t = parse_timestamp(s).ok_or_else(|| cell_mismatch(column, value))?;
                        builder.append_value(t.timestamp_micros());
                    }
                    v if v.is_missing() => builder.append_null(),
                    v => return Err(cell_mismatch(column, v)),
                }
            }
            Arc::new(builder.finish())
        }
        ColumnType::Blob | ColumnType::Geometry { .. } => {
            let mut builder = BinaryBuilder::with_capacity(rows, rows * 64);
            for value in cells {
                match value {
                    Value::Blob(b) => builder.append_value(b),
                    Value::Geometry(g) => builder.append_value(g.as_bytes()),
                    v if v.is_missing() => builder.append_null(),
                    v => return Err(cell_mismatch(column, v)),
                }
            }
            Arc::new(builder.finish())
        }
    };
    Ok(array)
}

/// Convert a table to one record batch, appending the row index column.
pub fn to_batch(table: &Table) -> EtlResult<RecordBatch> {
    let mut fields = Vec::with_capacity(table.column_count() + 1);
    let mut arrays = Vec::with_capacity(table.column_count() + 1);

    for (index, column) in table.columns().iter().enumerate() {
        fields.push(Field::new(&column.name, storage_type(&column.kind), true));
        arrays.push(column_array(table, index)?);
    }

    fields.push(Field::new(ROW_INDEX, DataType::Int64, false));
    arrays.push(Arc::new(Int64Array::from_iter_values(0..table.row_count() as i64)) as ArrayRef);

    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).map_err(query_error)
}

fn downcast<T: Array + 'static>(array: &ArrayRef) -> EtlResult<&T> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        EtlError::QueryError(format!("unexpected arrow type {}", array.data_type()))
    })
}

fn array_values(array: &ArrayRef, kind: &ColumnType) -> EtlResult<Vec<Value>> {
    let array = cast(array, &storage_type(kind)).map_err(query_error)?;

    let values = match kind {
        ColumnType::Integer => downcast::<Int64Array>(&array)?
            .iter()
            .map(Value::from)
            .collect(),
        ColumnType::Real => downcast::<Float64Array>(&array)?
            .iter()
            .map(Value::from)
            .collect(),
        ColumnType::Text => downcast::<StringArray>(&array)?
            .iter()
            .map(Value::from)
            .collect(),
        ColumnType::Timestamp => downcast::<TimestampMicrosecondArray>(&array)?
            .iter()
            .map(|micros| Value::from(micros.and_then(DateTime::from_timestamp_micros)))
            .collect(),
        ColumnType::Blob => downcast::<BinaryArray>(&array)?
            .iter()
            .map(|b| b.map(|b| Value::Blob(b.to_vec())).unwrap_or(Value::Null))
            .collect(),
        ColumnType::Geometry { .. } => downcast::<BinaryArray>(&array)?
            .iter()
            .map(|b| match b {
                Some(b) => Geometry::from_gpkg_blob(b.to_vec()).map(Value::Geometry),
                None => Ok(Value::Null),
            })
            .collect::<EtlResult<Vec<_>>>()?,
    };
    Ok(values)
}

/// Convert query output back into a table.
///
/// A result column takes the kind declared for its name when that kind is
/// stored as the column's arrow type, and a kind inferred from the arrow
/// type otherwise.
pub fn to_table(
    schema: &Schema,
    batches: &[RecordBatch],
    kinds: &HashMap<String, ColumnType>,
    srs: Option<SpatialRef>,
) -> EtlResult<Table> {
    let visible: Vec<(usize, Column)> = schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| !f.name().starts_with(HIDDEN_PREFIX))
        .map(|(i, f)| {
            let kind = kinds
                .get(f.name())
                .filter(|k| storage_type(k) == *f.data_type())
                .cloned()
                .unwrap_or_else(|| kind_of(f.data_type()));
            (i, Column::new(f.name(), kind))
        })
        .collect();

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for batch in batches {
        let start = rows.len();
        rows.extend((0..batch.num_rows()).map(|_| Vec::with_capacity(visible.len())));
        for (index, column) in &visible {
            let values = array_values(batch.column(*index), &column.kind)?;
            for (row, value) in rows[start..].iter_mut().zip(values) {
                row.push(value);
            }
        }
    }

    let columns = visible.into_iter().map(|(_, c)| c).collect();
    Ok(Table::from_rows(columns, rows)?.with_srs(srs))
}
