//! Tests for Table operations.

use hydro_common::{Column, ColumnType, EtlError, Geometry, Table, Value};

fn sample() -> Table {
    Table::from_records(
        &["rchid", "streamorder", "relativevalues"],
        vec![
            vec![Value::Integer(1), Value::Integer(3), Value::Real(0.5)],
            vec![Value::Integer(2), Value::Integer(4), Value::Real(1.5)],
            vec![Value::Integer(1), Value::Integer(3), Value::Real(0.5)],
        ],
    )
    .unwrap()
}

// ============================================================================
// Construction tests
// ============================================================================

#[test]
fn test_from_records_infers_types() {
    let table = sample();
    assert_eq!(table.columns()[0].kind, ColumnType::Integer);
    assert_eq!(table.columns()[2].kind, ColumnType::Real);
    assert_eq!(table.row_count(), 3);
}

#[test]
fn test_from_records_skips_leading_nulls() {
    let table = Table::from_records(
        &["name"],
        vec![vec![Value::Null], vec![Value::Text("a".into())]],
    )
    .unwrap();
    assert_eq!(table.columns()[0].kind, ColumnType::Text);
}

#[test]
fn test_push_row_rejects_wrong_width() {
    let mut table = Table::new(vec![Column::new("a", ColumnType::Integer)]);
    assert!(table.push_row(vec![Value::Integer(1), Value::Integer(2)]).is_err());
    assert!(table.push_row(vec![Value::Integer(1)]).is_ok());
}

// ============================================================================
// Projection tests
// ============================================================================

#[test]
fn test_select_reorders_columns() {
    let selected = sample().select(&["relativevalues", "rchid"]).unwrap();
    assert_eq!(selected.column_names(), vec!["relativevalues", "rchid"]);
    assert_eq!(selected.rows()[1], vec![Value::Real(1.5), Value::Integer(2)]);
}

#[test]
fn test_select_missing_column() {
    let err = sample().select(&["nope"]).unwrap_err();
    assert!(matches!(err, EtlError::MissingColumn(name) if name == "nope"));
}

#[test]
fn test_map_column_rewrites_in_place() {
    let mut table = sample();
    table
        .map_column("relativevalues", |v| Value::from(v.as_f64().map(|x| x * 2.0)))
        .unwrap();
    assert_eq!(table.value(1, "relativevalues"), Some(&Value::Real(3.0)));
    assert!(matches!(
        table.map_column("nope", |v| v.clone()),
        Err(EtlError::MissingColumn(_))
    ));
}

#[test]
fn test_geometry_columns_detected() {
    let mut table = sample();
    let geoms = (0..3).map(|_| Value::Geometry(Geometry::placeholder(0))).collect();
    table
        .add_column(
            Column::new("geom", ColumnType::Geometry { type_name: "POINT".into() }),
            geoms,
        )
        .unwrap();
    assert_eq!(table.geometry_columns(), vec![3]);
    assert_eq!(table.geometry_column().map(|c| c.name.as_str()), Some("geom"));
}

#[test]
fn test_add_column_length_checked() {
    let mut table = sample();
    let err = table
        .add_column(Column::new("x", ColumnType::Integer), vec![Value::Integer(1)])
        .unwrap_err();
    assert!(matches!(err, EtlError::ContainerError(_)));
}
