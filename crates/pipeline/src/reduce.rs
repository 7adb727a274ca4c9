//! Per-group record selection.

use tracing::debug;

use hydro_common::{EtlResult, Table};

use crate::frame::{ident, SqlFrames};

/// Keep, for each value of `group_column`, the row with the largest
/// `rank_column`.
///
/// Ties go to the earliest row. Rows with a missing group or rank value are
/// ignored, so groups with no ranked rows disappear. Output follows the
/// order in which groups first appear.
pub async fn max_per_group(
    table: &Table,
    group_column: &str,
    rank_column: &str,
) -> EtlResult<Table> {
    table.require_column(group_column)?;
    table.require_column(rank_column)?;
    let group = ident(group_column);
    let rank = ident(rank_column);

    let sql = format!(
        "SELECT * FROM (\
         SELECT *, \
         ROW_NUMBER() OVER (PARTITION BY {group} ORDER BY {rank} DESC, __row) AS __pick, \
         MIN(__row) OVER (PARTITION BY {group}) AS __first \
         FROM t WHERE {group} IS NOT NULL AND {rank} IS NOT NULL\
         ) AS ranked WHERE __pick = 1 ORDER BY __first"
    );

    let mut frames = SqlFrames::new();
    frames.register("t", table)?;
    let result = frames.query(&sql).await?;

    debug!(
        input_rows = table.row_count(),
        groups = result.row_count(),
        "Reduced to max per group"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydro_common::{EtlError, Value};

    fn ranked(rows: &[(i64, i64, f64)]) -> Table {
        Table::from_records(
            &["rchid", "nrthresholds", "sum_bool_value_thsh"],
            rows.iter()
                .map(|&(r, n, v)| vec![r.into(), n.into(), v.into()])
                .collect(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_single_group_keeps_highest_threshold() {
        let table = ranked(&[(1, 1, 5.0), (1, 2, 5.0), (1, 3, 1.0)]);
        let out = max_per_group(&table, "rchid", "nrthresholds").await.unwrap();
        assert_eq!(out.row_count(), 1);
        assert_eq!(out.value(0, "nrthresholds"), Some(&Value::Integer(3)));
        assert_eq!(out.value(0, "sum_bool_value_thsh"), Some(&Value::Real(1.0)));
    }

    #[tokio::test]
    async fn test_ties_keep_earliest_row() {
        let table = ranked(&[(7, 2, 1.0), (7, 2, 9.0), (8, 1, 4.0)]);
        let out = max_per_group(&table, "rchid", "nrthresholds").await.unwrap();
        assert_eq!(out.row_count(), 2);
        assert_eq!(out.value(0, "sum_bool_value_thsh"), Some(&Value::Real(1.0)));
        assert_eq!(out.value(1, "rchid"), Some(&Value::Integer(8)));
    }

    #[tokio::test]
    async fn test_missing_values_ignored() {
        let table = Table::from_records(
            &["rchid", "nrthresholds"],
            vec![
                vec![Value::Null, 5i64.into()],
                vec![2i64.into(), Value::Null],
                vec![3i64.into(), 1i64.into()],
            ],
        )
        .unwrap();
        let out = max_per_group(&table, "rchid", "nrthresholds").await.unwrap();
        assert_eq!(out.row_count(), 1);
        assert_eq!(out.value(0, "rchid"), Some(&Value::Integer(3)));
    }

    #[tokio::test]
    async fn test_missing_rank_column() {
        let table = ranked(&[(1, 1, 1.0)]);
        assert!(matches!(
            max_per_group(&table, "rchid", "level").await,
            Err(EtlError::MissingColumn(_))
        ));
    }
}
