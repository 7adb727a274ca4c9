//! Aggregation, cleaning and precision reduction of relational tables.

use tracing::debug;

use hydro_common::{parse_timestamp, ColumnType, EtlError, EtlResult, Table, Value};

use crate::frame::{ident, SqlFrames};
use crate::materialize::TIMESTAMP_COLUMN;

/// No-data markers written by the model.
pub const DEFAULT_SENTINELS: [f64; 3] = [-888.0, 888.0, 999.0];

/// Column prefixes rounded before publishing.
pub const ROUNDED_PREFIXES: [&str; 2] = ["absolutevalues", "relativevalues"];

/// Group by `group_keys` and take the per-group maximum of every column whose
/// lower-cased name contains `metric_filter`, plus `time_stamp_date`.
///
/// Nulls and NaN never win a maximum; a group with no values in a column gets
/// null there. Rows with a missing key are dropped. Output rows are ordered
/// by key.
pub async fn aggregate(
    table: &Table,
    group_keys: &[&str],
    metric_filter: &str,
) -> EtlResult<Table> {
    if group_keys.is_empty() {
        return Err(EtlError::QueryError("aggregate needs a group key".to_string()));
    }
    let key_indices = group_keys
        .iter()
        .map(|k| table.require_column(k))
        .collect::<EtlResult<Vec<_>>>()?;

    let filter = metric_filter.to_lowercase();
    let mut value_indices: Vec<usize> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(i, c)| !key_indices.contains(i) && c.name.to_lowercase().contains(&filter))
        .map(|(i, _)| i)
        .collect();
    if let Some(ts) = table.column_index(TIMESTAMP_COLUMN) {
        if !value_indices.contains(&ts) && !key_indices.contains(&ts) {
            value_indices.push(ts);
        }
    }

    let keys: Vec<String> = key_indices
        .iter()
        .map(|&i| ident(&table.columns()[i].name))
        .collect();
    let maxima = value_indices.iter().map(|&i| {
        let name = ident(&table.columns()[i].name);
        format!("MAX({}) AS {}", name, name)
    });
    let projection: Vec<String> = keys.iter().cloned().chain(maxima).collect();
    let present: Vec<String> = keys.iter().map(|k| format!("{} IS NOT NULL", k)).collect();

    let sql = format!(
        "SELECT {} FROM t WHERE {} GROUP BY {} ORDER BY {}",
        projection.join(", "),
        present.join(" AND "),
        keys.join(", "),
        keys.join(", ")
    );

    let mut frames = SqlFrames::new();
    frames.register("t", table)?;
    let result = frames.query(&sql).await?;

    debug!(
        input_rows = table.row_count(),
        groups = result.row_count(),
        aggregated = value_indices.len(),
        "Aggregated table"
    );
    Ok(result)
}

/// Coerce `datetime_column` to timestamps and drop sentinel rows.
///
/// Rows whose datetime cannot be interpreted are dropped, as is every row
/// holding a numeric value equal to any of `sentinels`.
pub async fn clean(table: &Table, sentinels: &[f64], datetime_column: &str) -> EtlResult<Table> {
    table.require_column(datetime_column)?;

    let mut coerced = table.clone();
    coerced.map_column(datetime_column, coerce_timestamp)?;
    coerced.set_column_type(datetime_column, ColumnType::Timestamp)?;

    let mut conditions = vec![format!("{} IS NOT NULL", ident(datetime_column))];
    let markers: Vec<String> = sentinels
        .iter()
        .filter(|s| s.is_finite())
        .map(|s| format!("{:?}", s))
        .collect();
    if !markers.is_empty() {
        let list = markers.join(", ");
        conditions.extend(
            coerced
                .columns()
                .iter()
                .filter(|c| c.kind.is_numeric())
                .map(|c| {
                    let name = ident(&c.name);
                    format!("({} IS NULL OR {} NOT IN ({}))", name, name, list)
                }),
        );
    }

    let mut frames = SqlFrames::new();
    frames.register("t", &coerced)?;
    let cleaned = frames
        .query(&format!(
            "SELECT * FROM t WHERE {} ORDER BY __row",
            conditions.join(" AND ")
        ))
        .await?;

    debug!(
        input_rows = table.row_count(),
        kept = cleaned.row_count(),
        "Cleaned table"
    );
    Ok(cleaned)
}

fn coerce_timestamp(value: &Value) -> Value {
    match value {
        Value::Timestamp(_) => value.clone(),
        Value::Text(s) => parse_timestamp(s).map(Value::Timestamp).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Round real values in metric columns to `decimals` places, ties to even.
pub fn round_metric_columns(table: &mut Table, decimals: i32) -> EtlResult<()> {
    let names: Vec<String> = table
        .columns()
        .iter()
        .filter(|c| ROUNDED_PREFIXES.iter().any(|p| c.name.starts_with(p)))
        .map(|c| c.name.clone())
        .collect();

    let scale = 10f64.powi(decimals);
    for name in &names {
        table.map_column(name, |v| match v {
            Value::Real(x) if x.is_finite() => Value::Real((x * scale).round_ties_even() / scale),
            other => other.clone(),
        })?;
    }
    Ok(())
}
