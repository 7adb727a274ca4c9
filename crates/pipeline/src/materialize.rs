//! Flatten a [`ReachDataset`] into one relational row per (timestep, reach).
//!
//! Timesteps are independent, so each one becomes a unit of work on the
//! rayon pool. Units only read the shared dataset and return their own row
//! buffers, which are concatenated in timestep order.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{debug, info};

use hydro_common::{Column, ColumnType, EtlError, EtlResult, Table, Value};
use netcdf_parser::{Metric, ReachDataset, Threshold};

pub const TIMESTAMP_COLUMN: &str = "time_stamp_date";
pub const NRCH_COLUMN: &str = "nrch";
pub const REACH_ID_COLUMN: &str = "rchid";
pub const STREAM_ORDER_COLUMN: &str = "streamorder";

/// One reach at one timestep.
#[derive(Debug, Clone, PartialEq)]
pub struct ReachRow {
    pub time_stamp_date: DateTime<Utc>,
    pub nrch: i64,
    pub rchid: i64,
    pub streamorder: i64,
    /// Indexed like [`Metric::ALL`].
    pub metrics: [f64; 12],
    /// Indexed like [`Threshold::ALL`].
    pub thresholds: [f64; 4],
}

/// Build every row, `timesteps * reaches` in total, ordered by timestep then reach.
pub fn materialize_rows(dataset: &ReachDataset) -> EtlResult<Vec<ReachRow>> {
    let timesteps = dataset.timestep_count();

    let chunks = (0..timesteps)
        .into_par_iter()
        .map(|t| timestep_rows(dataset, t))
        .collect::<EtlResult<Vec<_>>>()?;

    let rows: Vec<ReachRow> = chunks.into_iter().flatten().collect();
    debug!(timesteps, rows = rows.len(), "Materialized rows");
    Ok(rows)
}

fn timestep_rows(dataset: &ReachDataset, t: usize) -> EtlResult<Vec<ReachRow>> {
    let reaches = dataset.reach_count();
    let time = *dataset
        .times()
        .get(t)
        .ok_or_else(|| EtlError::shape_mismatch("time", "time", t + 1, dataset.times().len()))?;

    let metric_slices = Metric::ALL.map(|m| dataset.metric(m).timestep(t));
    for (metric, slice) in Metric::ALL.iter().zip(&metric_slices) {
        if slice.len() != reaches {
            return Err(EtlError::shape_mismatch(
                metric.variable_name(),
                "reach",
                reaches,
                slice.len(),
            ));
        }
    }
    let threshold_slices = Threshold::ALL.map(|th| dataset.threshold(th));

    let rows = (0..reaches)
        .map(|r| ReachRow {
            time_stamp_date: time,
            nrch: dataset.nrch().value_for(r),
            rchid: dataset.reach_ids()[r],
            streamorder: dataset.stream_orders()[r],
            metrics: std::array::from_fn(|m| metric_slices[m][r]),
            thresholds: std::array::from_fn(|i| threshold_slices[i][r]),
        })
        .collect();

    Ok(rows)
}

/// Column layout of a materialized table.
pub fn reach_columns() -> Vec<Column> {
    let mut columns = vec![
        Column::new(TIMESTAMP_COLUMN, ColumnType::Timestamp),
        Column::new(NRCH_COLUMN, ColumnType::Integer),
        Column::new(REACH_ID_COLUMN, ColumnType::Integer),
        Column::new(STREAM_ORDER_COLUMN, ColumnType::Integer),
    ];
    columns.extend(
        Metric::ALL
            .iter()
            .map(|m| Column::new(m.column_name(), ColumnType::Real)),
    );
    columns.extend(
        Threshold::ALL
            .iter()
            .map(|t| Column::new(t.variable_name(), ColumnType::Real)),
    );
    columns
}

pub fn rows_to_table(rows: Vec<ReachRow>) -> EtlResult<Table> {
    let values = rows
        .into_iter()
        .map(|row| {
            let mut values = Vec::with_capacity(20);
            values.push(Value::Timestamp(row.time_stamp_date));
            values.push(Value::Integer(row.nrch));
            values.push(Value::Integer(row.rchid));
            values.push(Value::Integer(row.streamorder));
            values.extend(row.metrics.iter().map(|v| Value::Real(*v)));
            values.extend(row.thresholds.iter().map(|v| Value::Real(*v)));
            values
        })
        .collect();

    Table::from_rows(reach_columns(), values)
}

/// Materialize the dataset straight into a [`Table`].
pub fn materialize(dataset: &ReachDataset) -> EtlResult<Table> {
    let table = rows_to_table(materialize_rows(dataset)?)?;
    info!(
        timesteps = dataset.timestep_count(),
        reaches = dataset.reach_count(),
        rows = table.row_count(),
        "Built relational table"
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_layout() {
        let columns = reach_columns();
        assert_eq!(columns.len(), 20);
        assert_eq!(columns[0].name, "time_stamp_date");
        assert_eq!(columns[3].name, "streamorder");
        assert_eq!(columns[4].name, "absolutevalues");
        assert_eq!(columns[15].name, "relativevaluesmedian");
        assert_eq!(columns[16].name, "relative_thresholds_10yr");
        assert_eq!(columns[19].name, "relative_thresholds_5yr");
    }

    #[test]
    fn test_rows_to_table_keeps_nan() {
        let row = ReachRow {
            time_stamp_date: Utc::now(),
            nrch: 3,
            rchid: 1000,
            streamorder: 2,
            metrics: [f64::NAN; 12],
            thresholds: [1.0; 4],
        };
        let table = rows_to_table(vec![row]).unwrap();
        assert_eq!(table.row_count(), 1);
        assert!(table.value(0, "absolutevalues").unwrap().is_missing());
        assert_eq!(table.value(0, "rchid"), Some(&Value::Integer(1000)));
    }
}
