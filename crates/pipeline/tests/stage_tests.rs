//! End-to-end stage runs against in-memory buckets and the in-memory host.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use geopackage::{read_layer, write_layer, GeoPackage, LayerRef, WriteMode};
use hydro_common::{Column, ColumnType, EtlError, EtlResult, Geometry, SpatialRef, Table, Value};
use netcdf_parser::{
    MemoryDataset, Metric, Threshold, VariableSource, REACH_DIMENSION, SUMMARY_VARIABLE,
};
use pipeline::stage_one::{FIRST_ARTIFACT, SECOND_ARTIFACT, STAGE_ONE_MESSAGE};
use pipeline::stage_two::{FINAL_ARTIFACT, FINAL_LAYER};
use pipeline::{
    aggregate, build_tables, clean, round_metric_columns, run_stage_one, run_stage_two,
    DatasetLoader, HostCredentials, PipelineConfig, RunContext, DEFAULT_SENTINELS,
};
use publisher::MemoryFeatureHost;
use storage::{ArtifactRecord, Buckets, StoragePath};
use test_utils::{
    assert_approx_eq, create_grid_with_sentinels, create_hourly_offsets, create_metric_grid,
    create_reach_ids, create_summary_cube, create_threshold_values, fixtures, temp_test_dir,
};

const FIRST_URL: &str = "https://host.example/layers/raw/FeatureServer/0";
const SECOND_URL: &str = "https://host.example/layers/max/FeatureServer/0";

/// Hands out a copy of one in-memory dataset whatever the bytes are.
struct FixedLoader(MemoryDataset);

impl DatasetLoader for FixedLoader {
    fn open(&self, _data: &[u8]) -> EtlResult<Box<dyn VariableSource + Send>> {
        Ok(Box::new(self.0.clone()))
    }
}

/// Four hourly timesteps over reaches 1000..=1002, with a 2x3x4 summary cube.
fn model_dataset(timesteps: usize, reaches: usize) -> MemoryDataset {
    let mut ds = MemoryDataset::new()
        .with_variable("time", vec![timesteps], create_hourly_offsets(timesteps))
        .with_attribute("time", "units", fixtures::time::HOURLY_UNITS)
        .with_variable("rchid", vec![reaches], create_reach_ids(reaches, 1000))
        .with_variable("streamorder", vec![reaches], vec![2.0; reaches])
        .with_dimension(REACH_DIMENSION, reaches)
        .with_variable(
            SUMMARY_VARIABLE,
            vec![2, reaches, 4],
            create_summary_cube(2, reaches, 4),
        );

    for metric in Metric::ALL {
        ds = ds.with_variable(
            metric.variable_name(),
            vec![timesteps, reaches],
            create_metric_grid(timesteps, reaches),
        );
    }
    for (i, threshold) in Threshold::ALL.iter().enumerate() {
        ds = ds.with_variable(
            threshold.variable_name(),
            vec![reaches],
            create_threshold_values(reaches, i as f64),
        );
    }
    ds
}

fn line_table(reaches: &[i64]) -> Table {
    let columns = vec![
        Column::new("Top_reach", ColumnType::Integer),
        Column::new("name", ColumnType::Text),
        Column::new(
            "SHAPE",
            ColumnType::Geometry {
                type_name: "POINT".to_string(),
            },
        ),
    ];
    let rows = reaches
        .iter()
        .enumerate()
        .map(|(i, &reach)| {
            vec![
                Value::Integer(reach),
                Value::Text(format!("reach {}", reach)),
                Geometry::point(172.5 + i as f64 * 0.1, -43.5, 4326).into(),
            ]
        })
        .collect();
    Table::from_rows(columns, rows)
        .unwrap()
        .with_srs(Some(SpatialRef::wgs84()))
}

async fn put_file(buckets: &Buckets, bucket: &str, key: &str, path: &Path) {
    let data = tokio::fs::read(path).await.unwrap();
    buckets
        .bucket(bucket)
        .unwrap()
        .put(key, Bytes::from(data))
        .await
        .unwrap();
}

async fn fetch_layer(buckets: &Buckets, bucket: &str, key: &str, layer: &str, dir: &Path) -> Table {
    let local = dir.join(StoragePath::file_name(key));
    buckets
        .bucket(bucket)
        .unwrap()
        .download_to(key, &local)
        .await
        .unwrap();
    read_layer(&local, &LayerRef::name(layer)).await.unwrap()
}

fn stage_one_config(scratch: &Path) -> PipelineConfig {
    PipelineConfig {
        output_bucket: Some(fixtures::storage::OUTPUT_BUCKET.to_string()),
        output_key: Some(fixtures::storage::OUTPUT_KEY.to_string()),
        reference_key: fixtures::storage::REFERENCE_KEY.to_string(),
        reference_layer: fixtures::layers::REFERENCE.to_string(),
        hosted_layer_url: Some(FIRST_URL.to_string()),
        second_layer_url: Some(SECOND_URL.to_string()),
        scratch_dir: scratch.to_path_buf(),
        poll_interval_secs: 0,
        ..PipelineConfig::default()
    }
}

/// Context with the model file and reference container already in the input bucket.
async fn stage_one_context(
    scratch: &Path,
    work: &Path,
    host: Arc<MemoryFeatureHost>,
) -> RunContext {
    let ctx = RunContext::new(
        stage_one_config(scratch),
        Buckets::in_memory(),
        host,
        HostCredentials::default(),
    )
    .with_loader(Arc::new(FixedLoader(model_dataset(4, 3))));

    let reference = work.join("reference.gpkg");
    write_layer(
        &reference,
        fixtures::layers::REFERENCE,
        &line_table(&[1000, 1001, 1005]),
        WriteMode::Overwrite,
        false,
    )
    .await
    .unwrap();
    put_file(
        &ctx.buckets,
        fixtures::storage::INPUT_BUCKET,
        fixtures::storage::REFERENCE_KEY,
        &reference,
    )
    .await;

    ctx.buckets
        .bucket(fixtures::storage::INPUT_BUCKET)
        .unwrap()
        .put(fixtures::storage::INPUT_KEY, Bytes::from_static(b"CDF\x01"))
        .await
        .unwrap();
    ctx
}

fn run_dirs(scratch: &Path) -> usize {
    std::fs::read_dir(scratch)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with("run-"))
        .count()
}

// =============================================================================
// Relational steps
// =============================================================================

#[tokio::test]
async fn test_four_by_three_aggregates_to_reach_maxima() {
    let tables = build_tables(&model_dataset(4, 3)).unwrap();
    assert_eq!(tables.relational.row_count(), 12);

    let aggregated = aggregate(
        &tables.relational,
        &["rchid", "streamorder"],
        "relativevalues95thpercentile",
    )
    .await
    .unwrap();
    let cleaned = clean(&aggregated, &DEFAULT_SENTINELS, "time_stamp_date")
        .await
        .unwrap();

    assert_eq!(
        cleaned.column_names(),
        vec![
            "rchid",
            "streamorder",
            "relativevalues95thpercentile",
            "time_stamp_date"
        ]
    );
    assert_eq!(cleaned.row_count(), 3);
    for (row, reach) in [1000i64, 1001, 1002].iter().enumerate() {
        assert_eq!(cleaned.value(row, "rchid"), Some(&Value::Integer(*reach)));
        let expected = (row * 100 + 3) as f64;
        assert_eq!(
            cleaned.value(row, "relativevalues95thpercentile"),
            Some(&Value::Real(expected))
        );
    }

    let summary = tables.summary.unwrap();
    assert_eq!(summary.row_count(), 6);
}

#[tokio::test]
async fn test_sentinel_cells_drop_their_rows() {
    let mut ds = model_dataset(4, 3);
    ds = ds.with_variable(
        Metric::AbsoluteValuesMedian.variable_name(),
        vec![4, 3],
        create_grid_with_sentinels(4, 3, -888.0, &[(1, 0), (2, 2)]),
    );
    let tables = build_tables(&ds).unwrap();

    let cleaned = clean(&tables.relational, &DEFAULT_SENTINELS, "time_stamp_date")
        .await
        .unwrap();
    assert_eq!(cleaned.row_count(), 10);
    for row in cleaned.rows() {
        assert!(row.iter().all(|v| !DEFAULT_SENTINELS.iter().any(|s| v.equals_sentinel(*s))));
    }
}

#[test]
fn test_metric_rounding_is_half_to_even() {
    let mut table = Table::from_records(
        &["rchid", "relativevalues", "absolutevalues95thpercentile", "other"],
        vec![vec![1i64.into(), 0.125.into(), 0.375.into(), 0.125.into()]],
    )
    .unwrap();
    round_metric_columns(&mut table, 2).unwrap();

    let value = |c: &str| table.value(0, c).and_then(Value::as_f64).unwrap();
    assert_approx_eq!(value("relativevalues"), 0.12, 1e-12);
    assert_approx_eq!(value("absolutevalues95thpercentile"), 0.38, 1e-12);
    assert_approx_eq!(value("other"), 0.125, 1e-12);
}

// =============================================================================
// Stage 1
// =============================================================================

#[tokio::test]
async fn test_stage_one_publishes_both_layers_and_summary() {
    let scratch = temp_test_dir();
    let work = temp_test_dir();
    let host = Arc::new(MemoryFeatureHost::new());
    let ctx = stage_one_context(scratch.path(), work.path(), host.clone()).await;

    let response = run_stage_one(
        &ctx,
        fixtures::storage::INPUT_BUCKET,
        fixtures::storage::INPUT_KEY,
    )
    .await
    .unwrap();
    assert!(response.is_success());
    assert_eq!(response.body, STAGE_ONE_MESSAGE);

    let live = host.live_items();
    assert_eq!(live.len(), 2);

    let first_loads = host.layer_loads(FIRST_URL);
    let second_loads = host.layer_loads(SECOND_URL);
    assert_eq!(first_loads.len(), 1);
    assert_eq!(second_loads.len(), 1);
    assert_eq!(host.truncations(FIRST_URL), 1);
    assert_eq!(host.truncations(SECOND_URL), 1);

    let record_key = StoragePath::item_metadata(fixtures::storage::INPUT_KEY);
    let body = ctx
        .buckets
        .bucket(fixtures::storage::INPUT_BUCKET)
        .unwrap()
        .get(&record_key)
        .await
        .unwrap();
    let record = ArtifactRecord::parse(&body, FIRST_ARTIFACT).unwrap();
    assert_eq!(record.item_id(FIRST_ARTIFACT), Some(first_loads[0].item_id.as_str()));
    assert_eq!(record.item_id(SECOND_ARTIFACT), Some(second_loads[0].item_id.as_str()));

    let summary = fetch_layer(
        &ctx.buckets,
        fixtures::storage::OUTPUT_BUCKET,
        fixtures::storage::OUTPUT_KEY,
        "data",
        work.path(),
    )
    .await;
    assert_eq!(summary.row_count(), 6);
    assert!(summary.has_column("sum_bool_value_thsh"));
    assert!(summary.has_column("SHAPE"));

    assert_eq!(run_dirs(scratch.path()), 0);
    assert!(scratch.path().join("reference_geopackage.gpkg").exists());
}

#[tokio::test]
async fn test_stage_one_rerun_replaces_previous_items() {
    let scratch = temp_test_dir();
    let work = temp_test_dir();
    let host = Arc::new(MemoryFeatureHost::new());
    let ctx = stage_one_context(scratch.path(), work.path(), host.clone()).await;

    for _ in 0..2 {
        run_stage_one(
            &ctx,
            fixtures::storage::INPUT_BUCKET,
            fixtures::storage::INPUT_KEY,
        )
        .await
        .unwrap();
    }

    assert_eq!(host.live_items().len(), 2);
    assert_eq!(host.recycle_bin().len(), 0);
    assert_eq!(host.layer_loads(FIRST_URL).len(), 2);
}

#[tokio::test]
async fn test_stage_one_missing_input_is_not_found() {
    let scratch = temp_test_dir();
    let work = temp_test_dir();
    let host = Arc::new(MemoryFeatureHost::new());
    let ctx = stage_one_context(scratch.path(), work.path(), host.clone()).await;

    let err = run_stage_one(&ctx, fixtures::storage::INPUT_BUCKET, "runs/missing.nc")
        .await
        .unwrap_err();
    assert!(matches!(err, EtlError::ArtifactNotFound { .. }));
    assert_eq!(err.status_code(), 404);
    assert!(host.live_items().is_empty());
}

#[tokio::test]
async fn test_stage_one_requires_layer_urls() {
    let scratch = temp_test_dir();
    let work = temp_test_dir();
    let host = Arc::new(MemoryFeatureHost::new());
    let mut ctx = stage_one_context(scratch.path(), work.path(), host).await;
    ctx.config.second_layer_url = None;

    let err = run_stage_one(
        &ctx,
        fixtures::storage::INPUT_BUCKET,
        fixtures::storage::INPUT_KEY,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EtlError::ConfigError(m) if m.contains("SECOND_FEATURE_LAYER_URL")));
}

// =============================================================================
// Stage 2
// =============================================================================

const MODEL_KEY: &str = "geopackages/threshold_summary.gpkg";
const LOOKUP_KEY: &str = "geopackages/lookup.gpkg";
const STAGE_TWO_URL: &str = "https://host.example/layers/final/FeatureServer/0";

async fn stage_two_context(scratch: &Path, work: &Path, host: Arc<MemoryFeatureHost>) -> RunContext {
    let config = PipelineConfig {
        output_bucket: Some(fixtures::storage::OUTPUT_BUCKET.to_string()),
        output_key: Some(LOOKUP_KEY.to_string()),
        input_key: Some(MODEL_KEY.to_string()),
        hosted_layer_url: Some(STAGE_TWO_URL.to_string()),
        scratch_dir: scratch.to_path_buf(),
        poll_attempts: 3,
        poll_interval_secs: 0,
        ..PipelineConfig::default()
    };
    let ctx = RunContext::new(config, Buckets::in_memory(), host, HostCredentials::default());

    // Model summary: reach 0 exceeds at levels 1 and 2, reach 1 only at 1,
    // reach 2 never.
    let summary = Table::from_records(
        &["nrch", "nrthresholds", "sum_bool_value_thsh"],
        vec![
            vec![0i64.into(), 1i64.into(), 4.0.into()],
            vec![1i64.into(), 1i64.into(), 2.0.into()],
            vec![2i64.into(), 1i64.into(), 0.0.into()],
            vec![0i64.into(), 2i64.into(), 1.0.into()],
            vec![1i64.into(), 2i64.into(), 0.0.into()],
            vec![2i64.into(), 2i64.into(), 0.0.into()],
        ],
    )
    .unwrap();
    let model = work.join("model.gpkg");
    write_layer(&model, "data", &summary, WriteMode::Overwrite, true)
        .await
        .unwrap();
    put_file(&ctx.buckets, fixtures::storage::OUTPUT_BUCKET, MODEL_KEY, &model).await;

    let lookup_path = work.join("lookup.gpkg");
    write_layer(
        &lookup_path,
        fixtures::layers::RIVERLINES,
        &line_table(&[1000, 1001, 1002]),
        WriteMode::Overwrite,
        false,
    )
    .await
    .unwrap();
    let lookup = Table::from_records(
        &["nrch", "rchid"],
        (0..3i64)
            .map(|n| vec![n.into(), (1000 + n).into()])
            .collect(),
    )
    .unwrap();
    let gpkg = GeoPackage::open_or_create(&lookup_path).await.unwrap();
    gpkg.write_table(fixtures::layers::LOOKUP, &lookup).await.unwrap();
    gpkg.close().await;
    put_file(&ctx.buckets, fixtures::storage::OUTPUT_BUCKET, LOOKUP_KEY, &lookup_path).await;

    ctx
}

#[tokio::test]
async fn test_stage_two_publishes_highest_level_per_reach() {
    let scratch = temp_test_dir();
    let work = temp_test_dir();
    let host = Arc::new(MemoryFeatureHost::new().with_checks_before_complete(1));
    let ctx = stage_two_context(scratch.path(), work.path(), host.clone()).await;

    let response = run_stage_two(&ctx).await.unwrap();
    assert!(response.is_success());
    assert!(response.body.contains("s3://published/geopackages/final_output.gpkg"));

    let final_layer = fetch_layer(
        &ctx.buckets,
        fixtures::storage::OUTPUT_BUCKET,
        &ctx.config.final_output_key,
        FINAL_LAYER,
        work.path(),
    )
    .await;
    assert_eq!(final_layer.row_count(), 2);
    assert_eq!(final_layer.value(0, "rchid"), Some(&Value::Integer(1000)));
    assert_eq!(final_layer.value(0, "nrthresholds"), Some(&Value::Integer(2)));
    assert_eq!(final_layer.value(1, "rchid"), Some(&Value::Integer(1001)));
    assert_eq!(final_layer.value(1, "nrthresholds"), Some(&Value::Integer(1)));
    assert_eq!(final_layer.value(1, "OBJECTID"), Some(&Value::Integer(2)));
    assert_eq!(final_layer.srs().map(|s| s.srs_id), Some(4326));

    // Loaded without truncation, then the staging item is discarded.
    assert_eq!(host.layer_loads(STAGE_TWO_URL).len(), 1);
    assert_eq!(host.truncations(STAGE_TWO_URL), 0);
    assert!(host.live_items().is_empty());
    assert!(host.recycle_bin().is_empty());

    // The retired staging item is no longer recorded.
    let body = ctx
        .buckets
        .bucket(fixtures::storage::OUTPUT_BUCKET)
        .unwrap()
        .get(&ctx.config.temp_item_id_key)
        .await
        .unwrap();
    let record = ArtifactRecord::parse(&body, FINAL_ARTIFACT).unwrap();
    assert_eq!(record.item_id(FINAL_ARTIFACT), None);
}

#[tokio::test]
async fn test_stage_two_missing_model_container() {
    let scratch = temp_test_dir();
    let work = temp_test_dir();
    let host = Arc::new(MemoryFeatureHost::new());
    let mut ctx = stage_two_context(scratch.path(), work.path(), host.clone()).await;
    ctx.config.input_key = Some("geopackages/absent.gpkg".to_string());

    let err = run_stage_two(&ctx).await.unwrap_err();
    assert_eq!(err.status_code(), 404);
    assert!(host.layer_loads(STAGE_TWO_URL).is_empty());
    assert_eq!(run_dirs(scratch.path()), 0);
}
