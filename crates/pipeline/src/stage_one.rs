//! Stage 1: model output file to two published river-line layers.
//!
//! 1. Fetch and extract the NetCDF file named by the event.
//! 2. Join every cleaned (timestep, reach) row onto the reference river lines
//!    and publish it to the hosted layer.
//! 3. Write the threshold summary container to the output bucket.
//! 4. Join per-reach maxima onto the reference and publish them to the
//!    second hosted layer.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use geopackage::{read_layer, write_layer, LayerRef, WriteMode};
use hydro_common::{EtlResult, Table};
use publisher::{refresh_layer, ItemSpec, LayerRefresh, RepublishTracker};
use storage::{ObjectRecordStore, StoragePath};

use crate::context::{RunContext, RunDir};
use crate::extract::load_reach_tables;
use crate::join::{join_reference, ReferenceJoin};
use crate::materialize::{REACH_ID_COLUMN, STREAM_ORDER_COLUMN, TIMESTAMP_COLUMN};
use crate::response::RunResponse;
use crate::transform::{aggregate, clean, round_metric_columns, DEFAULT_SENTINELS};

/// Reference layer column matched against `rchid`.
pub const REFERENCE_KEY_COLUMN: &str = "Top_reach";
/// Metric whose per-reach maximum feeds the second layer.
pub const AGGREGATE_FILTER: &str = "relativevalues95thpercentile";

pub const FIRST_ARTIFACT: &str = "first_geopackage";
pub const SECOND_ARTIFACT: &str = "second_geopackage";
pub const FIRST_CONTAINER: &str = "first_join_geopackage.gpkg";
pub const SECOND_CONTAINER: &str = "second_join_geopackage.gpkg";
pub const FIRST_LAYER: &str = "joined_raw_riverlines";
pub const SECOND_LAYER: &str = "joined_max_riverlines_second";
pub const SUMMARY_LAYER: &str = "data";

pub const STAGE_ONE_MESSAGE: &str =
    "Data update and join operation completed successfully for both GeoPackages.";

/// Run Stage 1 for the object `bucket`/`key`.
#[instrument(skip(ctx))]
pub async fn run_stage_one(ctx: &RunContext, bucket: &str, key: &str) -> EtlResult<RunResponse> {
    let config = &ctx.config;
    let output_bucket = config.output_bucket()?;
    let output_key = config.output_key()?;
    let first_layer_url = config.hosted_layer_url()?;
    let second_layer_url = config.second_layer_url()?;

    let input = ctx.buckets.bucket(bucket)?;
    let data = input.get(key).await?;
    let tables = load_reach_tables(ctx.loader.clone(), data).await?;

    let run = ctx.start_run().await?;
    let result = async {
        let aggregated = aggregate(
            &tables.relational,
            &[REACH_ID_COLUMN, STREAM_ORDER_COLUMN],
            AGGREGATE_FILTER,
        )
        .await?;
        let cleaned_max = clean(&aggregated, &DEFAULT_SENTINELS, TIMESTAMP_COLUMN).await?;
        let cleaned_rows =
            clean(&tables.relational, &DEFAULT_SENTINELS, TIMESTAMP_COLUMN).await?;

        let reference_path = ctx.reference_cache(bucket)?.ensure().await?;
        let reference =
            read_layer(&reference_path, &LayerRef::name(&config.reference_layer)).await?;

        let tracker = RepublishTracker::new(
            ctx.host.clone(),
            Arc::new(ObjectRecordStore::new(
                input.clone(),
                StoragePath::item_metadata(key),
                FIRST_ARTIFACT,
            )),
        );

        let first =
            joined_layer(&reference, &cleaned_rows, ReferenceJoin::RetainReference).await?;
        let first_path = run.file(FIRST_CONTAINER);
        write_layer(&first_path, FIRST_LAYER, &first, WriteMode::Overwrite, false).await?;

        match &tables.summary {
            Some(summary) => {
                let summary_path = run.file(output_key);
                write_layer(&summary_path, SUMMARY_LAYER, summary, WriteMode::Append, true)
                    .await?;
                ctx.buckets
                    .bucket(output_bucket)?
                    .upload_file(&summary_path, output_key)
                    .await?;
                info!(bucket = output_bucket, key = output_key, "Uploaded threshold summary");
            }
            None => warn!("No threshold summary in model output, nothing uploaded"),
        }

        let first_item = tracker
            .publish(FIRST_ARTIFACT, &ItemSpec::geopackage(FIRST_CONTAINER), &first_path)
            .await?;
        refresh_layer(
            ctx.host.as_ref(),
            first_layer_url,
            &first_item.id,
            LayerRefresh {
                truncate: true,
                poll: None,
            },
        )
        .await?;

        let second = joined_layer(&reference, &cleaned_max, ReferenceJoin::Inner).await?;
        let second_path = run.file(SECOND_CONTAINER);
        write_layer(&second_path, SECOND_LAYER, &second, WriteMode::Overwrite, false).await?;

        let second_item = tracker
            .publish(SECOND_ARTIFACT, &ItemSpec::geopackage(SECOND_CONTAINER), &second_path)
            .await?;
        refresh_layer(
            ctx.host.as_ref(),
            second_layer_url,
            &second_item.id,
            LayerRefresh {
                truncate: true,
                poll: None,
            },
        )
        .await?;

        info!(
            first_rows = first.row_count(),
            second_rows = second.row_count(),
            first_item = %first_item.id,
            second_item = %second_item.id,
            "Stage 1 complete"
        );
        EtlResult::Ok(())
    }
    .await;

    finish(run, result).await?;
    Ok(RunResponse::ok(STAGE_ONE_MESSAGE))
}

async fn joined_layer(reference: &Table, rows: &Table, mode: ReferenceJoin) -> EtlResult<Table> {
    let mut joined =
        join_reference(reference, rows, REFERENCE_KEY_COLUMN, REACH_ID_COLUMN, mode).await?;
    round_metric_columns(&mut joined, 2)?;
    Ok(joined)
}

pub(crate) async fn finish(run: RunDir, result: EtlResult<()>) -> EtlResult<()> {
    run.finish().await;
    result
}
