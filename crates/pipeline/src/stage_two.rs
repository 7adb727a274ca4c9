//! Stage 2: threshold summary to the final river-line layer.
//!
//! Joins the model summary with the reach lookup, keeps reaches with any
//! exceedance, reduces each reach to its highest threshold level, and
//! publishes the result on the river-line geometry.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use geopackage::{read_layer, write_layer, LayerRef, WriteMode};
use hydro_common::{Column, ColumnType, EtlError, EtlResult, Table, Value};
use netcdf_parser::{SUMMARY_VARIABLE, THRESHOLD_DIMENSION};
use publisher::{refresh_layer, ItemSpec, LayerRefresh, RepublishTracker};
use storage::ObjectRecordStore;

use crate::context::RunContext;
use crate::frame::{ident, SqlFrames};
use crate::join::{join, JoinKind};
use crate::materialize::{NRCH_COLUMN, REACH_ID_COLUMN};
use crate::reduce::max_per_group;
use crate::stage_one::{finish, REFERENCE_KEY_COLUMN};

pub const OBJECT_ID_COLUMN: &str = "OBJECTID";
pub const FINAL_ARTIFACT: &str = "final_geopackage";
pub const FINAL_CONTAINER: &str = "final_output.gpkg";
pub const FINAL_LAYER: &str = "final_layer";
pub const STAGING_TITLE_PREFIX: &str = "temp_data_upload_";

const LOOKUP_CONTAINER: &str = "lookup.gpkg";
const MODEL_CONTAINER: &str = "model.gpkg";

/// Reach records ready for publishing, without geometry.
///
/// `model` is the threshold summary, `lookup` maps `nrch` to `rchid`, and
/// `reach_keys` holds the river-line `Top_reach` values. Identifiers from the
/// lookup are not carried; [`attach_geometry`] takes them from the river lines.
pub async fn select_reaches(
    model: &Table,
    lookup: &Table,
    reach_keys: &Table,
) -> EtlResult<Table> {
    let merged = join(model, lookup, NRCH_COLUMN, NRCH_COLUMN, JoinKind::Left).await?;
    for column in [SUMMARY_VARIABLE, REACH_ID_COLUMN, THRESHOLD_DIMENSION] {
        merged.require_column(column)?;
    }

    let mut frames = SqlFrames::new();
    frames.register("merged", &merged)?;
    let exceeding = frames
        .query(&format!(
            "SELECT {}, {}, {s}, __row FROM merged WHERE {s} > 0 ORDER BY __row",
            ident(REACH_ID_COLUMN),
            ident(THRESHOLD_DIMENSION),
            s = ident(SUMMARY_VARIABLE),
        ))
        .await?;

    let keys = reach_keys.select(&[REFERENCE_KEY_COLUMN])?;
    let on_lines = join(&exceeding, &keys, REACH_ID_COLUMN, REFERENCE_KEY_COLUMN, JoinKind::Inner)
        .await?
        .select(&[REACH_ID_COLUMN, THRESHOLD_DIMENSION, SUMMARY_VARIABLE])?;

    max_per_group(&on_lines, REACH_ID_COLUMN, THRESHOLD_DIMENSION).await
}

/// Attach river-line geometry and identifiers to reduced reach records.
pub async fn attach_geometry(reduced: &Table, riverlines: &Table) -> EtlResult<Table> {
    let mut joined = join(
        reduced,
        riverlines,
        REACH_ID_COLUMN,
        REFERENCE_KEY_COLUMN,
        JoinKind::Inner,
    )
    .await?;

    if !joined.has_column(OBJECT_ID_COLUMN) {
        let ids = (1..=joined.row_count() as i64).map(Value::Integer).collect();
        joined.add_column(Column::new(OBJECT_ID_COLUMN, ColumnType::Integer), ids)?;
    }

    let geometry = riverlines
        .geometry_column()
        .map(|c| c.name.clone())
        .ok_or_else(|| EtlError::MissingGeometry("riverlines layer".to_string()))?;

    let mut table = joined.select(&[
        OBJECT_ID_COLUMN,
        REACH_ID_COLUMN,
        SUMMARY_VARIABLE,
        THRESHOLD_DIMENSION,
        geometry.as_str(),
    ])?;
    table.set_srs(riverlines.srs().cloned());
    Ok(table)
}

/// Run Stage 2 from the configured containers.
#[instrument(skip(ctx))]
pub async fn run_stage_two(ctx: &RunContext) -> EtlResult<crate::RunResponse> {
    let config = &ctx.config;
    let output_bucket = config.output_bucket()?;
    let lookup_key = config.output_key()?;
    let model_key = config.input_key()?;
    let layer_url = config.hosted_layer_url()?;

    let storage = ctx.buckets.bucket(output_bucket)?;
    let run = ctx.start_run().await?;

    let result = async {
        let lookup_path = run.file(LOOKUP_CONTAINER);
        let model_path = run.file(MODEL_CONTAINER);
        storage.download_to(lookup_key, &lookup_path).await?;
        storage.download_to(model_key, &model_path).await?;

        let model = read_layer(&model_path, &LayerRef::name(&config.model_table)).await?;
        let lookup = read_layer(&lookup_path, &LayerRef::name(&config.lookup_table)).await?;
        let riverlines =
            read_layer(&lookup_path, &LayerRef::name(&config.riverlines_layer)).await?;

        let reduced = select_reaches(&model, &lookup, &riverlines).await?;
        let final_table = attach_geometry(&reduced, &riverlines).await?;

        let final_path = run.file(FINAL_CONTAINER);
        write_layer(&final_path, FINAL_LAYER, &final_table, WriteMode::Overwrite, false).await?;
        storage
            .upload_file(&final_path, &config.final_output_key)
            .await?;
        info!(
            rows = final_table.row_count(),
            key = %config.final_output_key,
            "Uploaded final layer"
        );

        let tracker = RepublishTracker::new(
            ctx.host.clone(),
            Arc::new(ObjectRecordStore::new(
                storage.clone(),
                config.temp_item_id_key.clone(),
                FINAL_ARTIFACT,
            )),
        );
        let title = format!("{}{}", STAGING_TITLE_PREFIX, Uuid::new_v4().simple());
        let staged = tracker
            .publish(FINAL_ARTIFACT, &ItemSpec::geopackage(title), &final_path)
            .await?;

        refresh_layer(
            ctx.host.as_ref(),
            layer_url,
            &staged.id,
            LayerRefresh {
                truncate: false,
                poll: Some(config.poll_policy()),
            },
        )
        .await?;

        if let Err(e) = tracker.retire(FINAL_ARTIFACT).await {
            warn!(item_id = %staged.id, error = %e, "Staging item left on host");
        }
        EtlResult::Ok(())
    }
    .await;

    finish(run, result).await?;
    Ok(crate::RunResponse::ok(format!(
        "Final spatial layer written to s3://{}/{} and uploaded to ArcGIS Online.",
        output_bucket, config.final_output_key
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydro_common::{Geometry, SpatialRef};

    fn summary(rows: &[(i64, i64, f64)]) -> Table {
        Table::from_records(
            &["nrch", "nrthresholds", "sum_bool_value_thsh"],
            rows.iter()
                .map(|&(n, t, v)| vec![n.into(), t.into(), v.into()])
                .collect(),
        )
        .unwrap()
    }

    fn lookup() -> Table {
        Table::from_records(
            &["nrch", "rchid", "OBJECTID"],
            vec![
                vec![0i64.into(), 100i64.into(), 1i64.into()],
                vec![1i64.into(), 101i64.into(), 2i64.into()],
                vec![2i64.into(), 102i64.into(), 3i64.into()],
            ],
        )
        .unwrap()
    }

    fn riverlines(with_object_id: bool) -> Table {
        let mut columns = vec![Column::new("Top_reach", ColumnType::Integer)];
        if with_object_id {
            columns.push(Column::new("OBJECTID", ColumnType::Integer));
        }
        columns.push(Column::new(
            "SHAPE",
            ColumnType::Geometry {
                type_name: "POINT".to_string(),
            },
        ));

        let rows = [100i64, 101]
            .iter()
            .enumerate()
            .map(|(i, &reach)| {
                let mut row = vec![Value::Integer(reach)];
                if with_object_id {
                    row.push(Value::Integer(500 + i as i64));
                }
                row.push(Geometry::point(172.0 + i as f64, -43.0, 2193).into());
                row
            })
            .collect();
        Table::from_rows(columns, rows)
            .unwrap()
            .with_srs(Some(SpatialRef::wgs84()))
    }

    #[tokio::test]
    async fn test_select_reaches_keeps_highest_threshold_on_lines() {
        let model = summary(&[
            (0, 1, 5.0),
            (0, 2, 5.0),
            (0, 3, 1.0),
            (1, 1, 0.0),
            (1, 2, 2.0),
            (2, 4, 9.0), // reach 102 has no river line
        ]);

        let reduced = select_reaches(&model, &lookup(), &riverlines(false))
            .await
            .unwrap();

        assert_eq!(
            reduced.column_names(),
            vec!["rchid", "nrthresholds", "sum_bool_value_thsh"]
        );
        assert_eq!(reduced.row_count(), 2);
        assert_eq!(reduced.value(0, "rchid"), Some(&Value::Integer(100)));
        assert_eq!(reduced.value(0, "nrthresholds"), Some(&Value::Integer(3)));
        assert_eq!(reduced.value(1, "rchid"), Some(&Value::Integer(101)));
        assert_eq!(reduced.value(1, "nrthresholds"), Some(&Value::Integer(2)));
    }

    #[tokio::test]
    async fn test_select_reaches_requires_summary_column() {
        let model = Table::from_records(&["nrch"], vec![vec![0i64.into()]]).unwrap();
        let err = select_reaches(&model, &lookup(), &riverlines(false))
            .await
            .unwrap_err();
        assert!(matches!(err, EtlError::MissingColumn(c) if c == "sum_bool_value_thsh"));
    }

    #[tokio::test]
    async fn test_attach_geometry_numbers_objects_when_absent() {
        let reduced = summary(&[(0, 3, 1.0)]);
        let mut reduced = reduced;
        reduced.rename_column("nrch", "rchid").unwrap();
        reduced.map_column("rchid", |_| Value::Integer(101)).unwrap();

        let out = attach_geometry(&reduced, &riverlines(false)).await.unwrap();
        assert_eq!(
            out.column_names(),
            vec!["OBJECTID", "rchid", "sum_bool_value_thsh", "nrthresholds", "SHAPE"]
        );
        assert_eq!(out.value(0, "OBJECTID"), Some(&Value::Integer(1)));
        assert_eq!(out.srs().map(|s| s.srs_id), Some(4326));

        let out = attach_geometry(&reduced, &riverlines(true)).await.unwrap();
        assert_eq!(out.value(0, "OBJECTID"), Some(&Value::Integer(501)));
    }
}
