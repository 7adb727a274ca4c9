//! GeoPackage core schema and column type mapping.

use hydro_common::ColumnType;

/// `PRAGMA application_id` for GeoPackage files ("GPKG").
pub const APPLICATION_ID: i32 = 0x4750_4B47;

/// `PRAGMA user_version` for GeoPackage 1.3.
pub const USER_VERSION: i32 = 10300;

/// Primary key column added to every user table.
pub const FID_COLUMN: &str = "fid";

pub const CREATE_SPATIAL_REF_SYS: &str = r#"
CREATE TABLE IF NOT EXISTS gpkg_spatial_ref_sys (
    srs_name TEXT NOT NULL,
    srs_id INTEGER NOT NULL PRIMARY KEY,
    organization TEXT NOT NULL,
    organization_coordsys_id INTEGER NOT NULL,
    definition TEXT NOT NULL,
    description TEXT
)
"#;

pub const CREATE_CONTENTS: &str = r#"
CREATE TABLE IF NOT EXISTS gpkg_contents (
    table_name TEXT NOT NULL PRIMARY KEY,
    data_type TEXT NOT NULL,
    identifier TEXT UNIQUE,
    description TEXT DEFAULT '',
    last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
    min_x DOUBLE,
    min_y DOUBLE,
    max_x DOUBLE,
    max_y DOUBLE,
    srs_id INTEGER,
    CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
)
"#;

pub const CREATE_GEOMETRY_COLUMNS: &str = r#"
CREATE TABLE IF NOT EXISTS gpkg_geometry_columns (
    table_name TEXT NOT NULL,
    column_name TEXT NOT NULL,
    geometry_type_name TEXT NOT NULL,
    srs_id INTEGER NOT NULL,
    z TINYINT NOT NULL,
    m TINYINT NOT NULL,
    CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
    CONSTRAINT uk_gc_table_name UNIQUE (table_name),
    CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
    CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
)
"#;

/// Quote an SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Declared SQL type for a column.
pub fn sql_type(kind: &ColumnType) -> String {
    match kind {
        ColumnType::Integer => "INTEGER".to_string(),
        ColumnType::Real => "REAL".to_string(),
        ColumnType::Text => "TEXT".to_string(),
        ColumnType::Timestamp => "DATETIME".to_string(),
        ColumnType::Blob => "BLOB".to_string(),
        ColumnType::Geometry { type_name } => type_name.to_uppercase(),
    }
}

/// Column type from a declared SQL type (SQLite affinity rules, plus DATE/DATETIME).
pub fn column_type(declared: &str) -> ColumnType {
    let upper = declared.trim().to_uppercase();
    if upper == "DATE" || upper == "DATETIME" || upper == "TIMESTAMP" {
        ColumnType::Timestamp
    } else if upper.contains("INT") || upper == "BOOLEAN" {
        ColumnType::Integer
    } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
        ColumnType::Text
    } else if upper.contains("BLOB") || upper.is_empty() {
        ColumnType::Blob
    } else {
        ColumnType::Real
    }
}
