//! Write/read tests against real SQLite files in temporary directories.

use chrono::{TimeZone, Utc};
use geopackage::{write_layer, GeoPackage, LayerRef, WriteMode};
use hydro_common::{Column, ColumnType, EtlError, Geometry, SpatialRef, Table, Value};
use test_utils::{scratch_gpkg_path, temp_test_dir};

fn model_table() -> Table {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
    Table::from_rows(
        vec![
            Column::new("time_stamp_date", ColumnType::Timestamp),
            Column::new("nrch", ColumnType::Integer),
            Column::new("relativevalues", ColumnType::Real),
            Column::new("label", ColumnType::Text),
        ],
        vec![
            vec![t0.into(), 1i64.into(), 0.25.into(), "a".into()],
            vec![t0.into(), 2i64.into(), Value::Null, "b".into()],
            vec![t0.into(), 3i64.into(), f64::NAN.into(), "c".into()],
        ],
    )
    .unwrap()
}

fn line_table(geometry_name: &str) -> Table {
    Table::from_rows(
        vec![
            Column::new("rchid", ColumnType::Integer),
            Column::new(
                geometry_name,
                ColumnType::Geometry {
                    type_name: "POINT".to_string(),
                },
            ),
        ],
        vec![
            vec![10i64.into(), Geometry::point(172.5, -43.5, 4326).into()],
            vec![11i64.into(), Geometry::point(172.6, -43.6, 4326).into()],
        ],
    )
    .unwrap()
    .with_srs(Some(SpatialRef::wgs84()))
}

// =============================================================================
// Round trips
// =============================================================================

#[tokio::test]
async fn test_placeholder_roundtrip_keeps_values() {
    let dir = temp_test_dir();
    let path = scratch_gpkg_path(dir.path(), "out");

    write_layer(&path, "data", &model_table(), WriteMode::Overwrite, true)
        .await
        .unwrap();

    let gpkg = GeoPackage::open(&path).await.unwrap();
    let table = gpkg.read_table(&LayerRef::name("data")).await.unwrap();
    gpkg.close().await;

    assert_eq!(table.row_count(), 3);
    assert_eq!(
        table.column_names(),
        vec!["time_stamp_date", "nrch", "relativevalues", "label", "SHAPE"]
    );
    assert_eq!(
        table.value(0, "time_stamp_date"),
        Some(&Value::Timestamp(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()))
    );
    assert_eq!(table.value(0, "relativevalues"), Some(&Value::Real(0.25)));
    assert_eq!(table.value(1, "relativevalues"), Some(&Value::Null));
    // NaN is stored as NULL
    assert_eq!(table.value(2, "relativevalues"), Some(&Value::Null));
    assert_eq!(table.value(2, "label"), Some(&Value::Text("c".to_string())));

    let shape = table.value(0, "SHAPE").and_then(Value::as_geometry).unwrap();
    assert_eq!(shape.as_point(), Some((0.0, 0.0)));
}

#[tokio::test]
async fn test_geometry_always_named_shape() {
    for name in ["geometry", "geom", "SHAPE"] {
        let dir = temp_test_dir();
        let path = scratch_gpkg_path(dir.path(), "lines");

        write_layer(&path, "riverlines", &line_table(name), WriteMode::Overwrite, false)
            .await
            .unwrap();

        let gpkg = GeoPackage::open(&path).await.unwrap();
        let table = gpkg.read_table(&LayerRef::Index(0)).await.unwrap();
        gpkg.close().await;

        assert_eq!(table.column_names(), vec!["rchid", "SHAPE"], "input column {}", name);
        assert!(table.columns()[1].kind.is_geometry());
        assert_eq!(table.srs().map(|s| s.srs_id), Some(4326));
        let point = table.rows()[1][1].as_geometry().unwrap().as_point().unwrap();
        assert_eq!(point, (172.6, -43.6));
    }
}

#[tokio::test]
async fn test_missing_geometry_rejected() {
    let dir = temp_test_dir();
    let path = scratch_gpkg_path(dir.path(), "bad");

    let err = write_layer(&path, "data", &model_table(), WriteMode::Overwrite, false)
        .await
        .unwrap_err();
    assert!(matches!(err, EtlError::MissingGeometry(_)));
    assert!(!path.exists());
}

// =============================================================================
// Write modes
// =============================================================================

#[tokio::test]
async fn test_append_replaces_only_named_layer() {
    let dir = temp_test_dir();
    let path = scratch_gpkg_path(dir.path(), "multi");

    write_layer(&path, "riverlines", &line_table("geometry"), WriteMode::Append, false)
        .await
        .unwrap();
    write_layer(&path, "data", &model_table(), WriteMode::Append, true)
        .await
        .unwrap();

    let one_row = Table::from_rows(
        vec![Column::new("nrch", ColumnType::Integer)],
        vec![vec![9i64.into()]],
    )
    .unwrap();
    write_layer(&path, "data", &one_row, WriteMode::Append, true)
        .await
        .unwrap();

    let gpkg = GeoPackage::open(&path).await.unwrap();
    let layers = gpkg.list_layers().await.unwrap();
    let names: Vec<_> = layers.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["riverlines", "data"]);
    assert!(layers.iter().all(|l| l.is_spatial()));

    let data = gpkg.read_table(&LayerRef::name("data")).await.unwrap();
    let lines = gpkg.read_table(&LayerRef::name("riverlines")).await.unwrap();
    gpkg.close().await;

    assert_eq!(data.row_count(), 1);
    assert_eq!(lines.row_count(), 2);
}

#[tokio::test]
async fn test_overwrite_discards_other_layers() {
    let dir = temp_test_dir();
    let path = scratch_gpkg_path(dir.path(), "fresh");

    write_layer(&path, "riverlines", &line_table("geometry"), WriteMode::Append, false)
        .await
        .unwrap();
    write_layer(&path, "data", &model_table(), WriteMode::Overwrite, true)
        .await
        .unwrap();

    let gpkg = GeoPackage::open(&path).await.unwrap();
    let layers = gpkg.list_layers().await.unwrap();
    gpkg.close().await;

    assert_eq!(layers.len(), 1);
    assert_eq!(layers[0].name, "data");
}

// =============================================================================
// Raw container access
// =============================================================================

#[tokio::test]
async fn test_attributes_table_and_lookup_errors() {
    let dir = temp_test_dir();
    let path = scratch_gpkg_path(dir.path(), "lookup");

    let lookup = Table::from_records(
        &["nrch", "name"],
        vec![
            vec![1i64.into(), "Waimakariri".into()],
            vec![2i64.into(), "Rakaia".into()],
        ],
    )
    .unwrap();

    let gpkg = GeoPackage::open_or_create(&path).await.unwrap();
    gpkg.write_table("lookup", &lookup).await.unwrap();

    let layers = gpkg.list_layers().await.unwrap();
    assert_eq!(layers[0].data_type, "attributes");

    let read = gpkg.read_table(&LayerRef::name("lookup")).await.unwrap();
    assert_eq!(read, lookup);

    let missing = gpkg.read_table(&LayerRef::name("nope")).await.unwrap_err();
    assert!(matches!(missing, EtlError::LayerNotFound(_)));
    let out_of_range = gpkg.read_table(&LayerRef::Index(3)).await.unwrap_err();
    assert!(matches!(out_of_range, EtlError::LayerNotFound(_)));

    gpkg.close().await;
}

#[tokio::test]
async fn test_open_missing_file() {
    let dir = temp_test_dir();
    let path = scratch_gpkg_path(dir.path(), "absent");
    assert!(matches!(
        GeoPackage::open(&path).await,
        Err(EtlError::ContainerError(_))
    ));
}
