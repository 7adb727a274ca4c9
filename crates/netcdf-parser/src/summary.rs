//! Threshold-exceedance summary for the 0-48 h time window.

use hydro_common::{Column, ColumnType, EtlError, EtlResult, Table, Value};
use tracing::{debug, info};

use crate::source::{VariableData, VariableSource};

pub const SUMMARY_VARIABLE: &str = "sum_bool_value_thsh";
pub const THRESHOLD_DIMENSION: &str = "nrthresholds";

/// Index of the "0-48" window along the `timewindows` axis.
pub const SUMMARY_WINDOW_INDEX: usize = 3;

/// Flatten `sum_bool_value_thsh[threshold, reach, 3]` into long form.
///
/// Columns are `nrch`, `nrthresholds`, `sum_bool_value_thsh`, one row per
/// (threshold, reach) with thresholds outermost. Labels come from the `nrch`
/// and `nrthresholds` variables when the file has them, otherwise from the
/// axis position. Returns `Ok(None)` when the file carries no summary
/// variable.
pub fn extract_threshold_summary<S: VariableSource + ?Sized>(
    source: &S,
) -> EtlResult<Option<Table>> {
    let Some(data) = source.read_variable(SUMMARY_VARIABLE)? else {
        debug!(variable = SUMMARY_VARIABLE, "No threshold summary variable");
        return Ok(None);
    };
    let data = data.validate(SUMMARY_VARIABLE)?;

    if data.rank() != 3 {
        return Err(EtlError::shape_mismatch(SUMMARY_VARIABLE, "rank", 3, data.rank()));
    }
    let (thresholds, reaches, windows) = (data.axis_len(0), data.axis_len(1), data.axis_len(2));
    if windows <= SUMMARY_WINDOW_INDEX {
        return Err(EtlError::shape_mismatch(
            SUMMARY_VARIABLE,
            "timewindow",
            SUMMARY_WINDOW_INDEX + 1,
            windows,
        ));
    }

    let reach_labels = labels(source.read_variable("nrch")?, reaches);
    let threshold_labels = labels(source.read_variable(THRESHOLD_DIMENSION)?, thresholds);

    let columns = vec![
        Column::new("nrch", ColumnType::Integer),
        Column::new("nrthresholds", ColumnType::Integer),
        Column::new(SUMMARY_VARIABLE, ColumnType::Real),
    ];
    let mut table = Table::new(columns);

    for (i, threshold) in threshold_labels.iter().enumerate() {
        for (j, reach) in reach_labels.iter().enumerate() {
            let offset = (i * reaches + j) * windows + SUMMARY_WINDOW_INDEX;
            table.push_row(vec![
                Value::Integer(*reach),
                Value::Integer(*threshold),
                Value::Real(data.values[offset]),
            ])?;
        }
    }

    info!(
        thresholds,
        reaches,
        rows = table.row_count(),
        "Extracted threshold summary"
    );

    Ok(Some(table))
}

/// Axis labels from a coordinate variable, or `0..len` when it is absent or
/// disagrees with the axis length.
fn labels(coordinate: Option<VariableData>, len: usize) -> Vec<i64> {
    match coordinate {
        Some(data) if data.values.len() >= len => {
            data.values[..len].iter().map(|v| *v as i64).collect()
        }
        _ => (0..len as i64).collect(),
    }
}
