//! GeoPackage container access over SQLite.

use std::path::{Path, PathBuf};

use chrono::SecondsFormat;
use hydro_common::{
    parse_timestamp, Column, ColumnType, EtlError, EtlResult, Geometry, SpatialRef, Table, Value,
};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, TypeInfo, ValueRef};
use tracing::{debug, info, instrument};

use crate::layer::LayerRef;
use crate::schema::{
    column_type, quote_ident, sql_type, APPLICATION_ID, CREATE_CONTENTS, CREATE_GEOMETRY_COLUMNS,
    CREATE_SPATIAL_REF_SYS, FID_COLUMN, USER_VERSION,
};

/// A layer listed in `gpkg_contents`.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerInfo {
    pub name: String,
    /// `features` or `attributes`.
    pub data_type: String,
    pub srs_id: Option<i32>,
}

impl LayerInfo {
    pub fn is_spatial(&self) -> bool {
        self.data_type == "features"
    }
}

/// An open GeoPackage file.
pub struct GeoPackage {
    pool: SqlitePool,
    path: PathBuf,
}

impl GeoPackage {
    /// Open an existing GeoPackage.
    pub async fn open(path: &Path) -> EtlResult<Self> {
        if !path.exists() {
            return Err(EtlError::ContainerError(format!(
                "GeoPackage {} does not exist",
                path.display()
            )));
        }
        let pool = connect(path, false).await?;
        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    /// Create a new GeoPackage, or open one that already exists, making sure
    /// the core tables are present.
    pub async fn open_or_create(path: &Path) -> EtlResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = connect(path, true).await?;
        let gpkg = Self {
            pool,
            path: path.to_path_buf(),
        };
        gpkg.init_core_tables().await?;
        Ok(gpkg)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn init_core_tables(&self) -> EtlResult<()> {
        sqlx::query(&format!("PRAGMA application_id = {}", APPLICATION_ID))
            .execute(&self.pool)
            .await
            .map_err(sql_error("set application_id"))?;
        sqlx::query(&format!("PRAGMA user_version = {}", USER_VERSION))
            .execute(&self.pool)
            .await
            .map_err(sql_error("set user_version"))?;

        for ddl in [CREATE_SPATIAL_REF_SYS, CREATE_CONTENTS, CREATE_GEOMETRY_COLUMNS] {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(sql_error("create core table"))?;
        }

        for srs in SpatialRef::mandatory() {
            self.register_srs(&srs).await?;
        }
        Ok(())
    }

    async fn register_srs(&self, srs: &SpatialRef) -> EtlResult<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO gpkg_spatial_ref_sys
                (srs_name, srs_id, organization, organization_coordsys_id, definition, description)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&srs.srs_name)
        .bind(srs.srs_id)
        .bind(&srs.organization)
        .bind(srs.organization_coordsys_id)
        .bind(&srs.definition)
        .bind(&srs.description)
        .execute(&self.pool)
        .await
        .map_err(sql_error("register srs"))?;
        Ok(())
    }

    /// Layers in `gpkg_contents`, in insertion order.
    pub async fn list_layers(&self) -> EtlResult<Vec<LayerInfo>> {
        let rows: Vec<(String, String, Option<i32>)> = sqlx::query_as(
            "SELECT table_name, data_type, srs_id FROM gpkg_contents ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(sql_error("list layers"))?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type, srs_id)| LayerInfo {
                name,
                data_type,
                srs_id,
            })
            .collect())
    }

    /// Resolve a layer specifier to a table name.
    pub async fn resolve_layer(&self, layer: &LayerRef) -> EtlResult<String> {
        let layers = self.list_layers().await?;
        let found = match layer {
            LayerRef::Name(name) => layers.into_iter().find(|l| &l.name == name),
            LayerRef::Index(index) => layers.into_iter().nth(*index),
        };
        found
            .map(|l| l.name)
            .ok_or_else(|| EtlError::LayerNotFound(format!("{} in {}", layer, self.path.display())))
    }

    /// Read a whole layer.
    ///
    /// The integer primary key is not returned. The geometry column and the
    /// layer's SRS are recovered from `gpkg_geometry_columns`.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn read_table(&self, layer: &LayerRef) -> EtlResult<Table> {
        let name = self.resolve_layer(layer).await?;
        let geometry = self.geometry_column_of(&name).await?;

        let info = sqlx::query(&format!("PRAGMA table_info({})", quote_ident(&name)))
            .fetch_all(&self.pool)
            .await
            .map_err(sql_error("read table schema"))?;

        let mut columns = Vec::new();
        for row in &info {
            let col_name: String = row.try_get("name").map_err(sql_error("read table schema"))?;
            let declared: String = row.try_get("type").map_err(sql_error("read table schema"))?;
            let pk: i64 = row.try_get("pk").map_err(sql_error("read table schema"))?;

            if pk == 1 && declared.eq_ignore_ascii_case("INTEGER") {
                continue;
            }
            let kind = match &geometry {
                Some((geom_col, type_name, _)) if geom_col.eq_ignore_ascii_case(&col_name) => {
                    ColumnType::Geometry {
                        type_name: type_name.clone(),
                    }
                }
                _ => column_type(&declared),
            };
            columns.push(Column::new(col_name, kind));
        }

        // A table holding only its primary key still has rows to count.
        let select_list = if columns.is_empty() {
            "NULL".to_string()
        } else {
            columns
                .iter()
                .map(|c| quote_ident(&c.name))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let sql = format!("SELECT {} FROM {}", select_list, quote_ident(&name));
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(sql_error("read table rows"))?;

        let mut table = Table::new(columns);
        for row in &rows {
            let values = table
                .columns()
                .iter()
                .enumerate()
                .map(|(i, column)| decode_value(row, i, &column.kind))
                .collect::<EtlResult<Vec<_>>>()?;
            table.push_row(values)?;
        }

        if let Some((_, _, srs_id)) = geometry {
            table.set_srs(self.spatial_ref(srs_id).await?);
        }

        debug!(layer = %name, rows = table.row_count(), columns = table.column_count(), "Read layer");
        Ok(table)
    }

    async fn geometry_column_of(&self, table: &str) -> EtlResult<Option<(String, String, i32)>> {
        sqlx::query_as(
            "SELECT column_name, geometry_type_name, srs_id FROM gpkg_geometry_columns WHERE table_name = ?",
        )
        .bind(table)
        .fetch_optional(&self.pool)
        .await
        .map_err(sql_error("read geometry columns"))
    }

    async fn spatial_ref(&self, srs_id: i32) -> EtlResult<Option<SpatialRef>> {
        let row: Option<(String, i32, String, i32, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT srs_name, srs_id, organization, organization_coordsys_id, definition, description
            FROM gpkg_spatial_ref_sys WHERE srs_id = ?
            "#,
        )
        .bind(srs_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(sql_error("read spatial ref"))?;

        Ok(row.map(
            |(srs_name, srs_id, organization, organization_coordsys_id, definition, description)| {
                SpatialRef {
                    srs_name,
                    srs_id,
                    organization,
                    organization_coordsys_id,
                    definition,
                    description,
                }
            },
        ))
    }

    /// Write `table` as layer `name`, replacing any existing layer of that name.
    ///
    /// Tables with a geometry column are registered as `features`, others as
    /// `attributes`. An incoming `fid` column is dropped; the primary key is
    /// regenerated.
    #[instrument(skip(self, table), fields(path = %self.path.display(), rows = table.row_count()))]
    pub async fn write_table(&self, name: &str, table: &Table) -> EtlResult<()> {
        let mut table = table.clone();
        while let Some(index) = table
            .columns()
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(FID_COLUMN))
        {
            table.drop_column_at(index);
        }

        let geometry = table.geometry_column().cloned();
        if table.geometry_columns().len() > 1 {
            return Err(EtlError::ContainerError(format!(
                "layer {} has more than one geometry column",
                name
            )));
        }

        let srs = match (&geometry, table.srs()) {
            (Some(_), Some(srs)) => Some(srs.clone()),
            (Some(_), None) => Some(SpatialRef::undefined_geographic()),
            (None, _) => None,
        };
        if let Some(srs) = &srs {
            self.register_srs(srs).await?;
        }

        let mut tx = self.pool.begin().await.map_err(sql_error("begin"))?;

        // Child metadata rows first; foreign keys are enforced.
        sqlx::query("DELETE FROM gpkg_geometry_columns WHERE table_name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(sql_error("clear geometry columns"))?;
        sqlx::query("DELETE FROM gpkg_contents WHERE table_name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(sql_error("clear contents"))?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", quote_ident(name)))
            .execute(&mut *tx)
            .await
            .map_err(sql_error("drop table"))?;

        let column_defs = table
            .columns()
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), sql_type(&c.kind)))
            .collect::<Vec<_>>();
        let mut ddl = format!(
            "CREATE TABLE {} ({} INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL",
            quote_ident(name),
            quote_ident(FID_COLUMN)
        );
        for def in &column_defs {
            ddl.push_str(", ");
            ddl.push_str(def);
        }
        ddl.push(')');
        sqlx::query(&ddl)
            .execute(&mut *tx)
            .await
            .map_err(sql_error("create table"))?;

        sqlx::query(
            r#"
            INSERT INTO gpkg_contents (table_name, data_type, identifier, last_change, srs_id)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(name)
        .bind(if geometry.is_some() { "features" } else { "attributes" })
        .bind(name)
        .bind(chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
        .bind(srs.as_ref().map(|s| s.srs_id))
        .execute(&mut *tx)
        .await
        .map_err(sql_error("register contents"))?;

        if let (Some(column), Some(srs)) = (&geometry, &srs) {
            let type_name = match &column.kind {
                ColumnType::Geometry { type_name } => type_name.to_uppercase(),
                _ => "GEOMETRY".to_string(),
            };
            sqlx::query(
                r#"
                INSERT INTO gpkg_geometry_columns (table_name, column_name, geometry_type_name, srs_id, z, m)
                VALUES (?, ?, ?, ?, 0, 0)
                "#,
            )
            .bind(name)
            .bind(&column.name)
            .bind(type_name)
            .bind(srs.srs_id)
            .execute(&mut *tx)
            .await
            .map_err(sql_error("register geometry column"))?;
        }

        if table.column_count() > 0 {
            let insert = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(name),
                table
                    .columns()
                    .iter()
                    .map(|c| quote_ident(&c.name))
                    .collect::<Vec<_>>()
                    .join(", "),
                vec!["?"; table.column_count()].join(", ")
            );

            for row in table.rows() {
                let mut query = sqlx::query(&insert);
                for value in row {
                    query = match value {
                        Value::Null => query.bind(None::<i64>),
                        Value::Integer(v) => query.bind(*v),
                        Value::Real(v) if v.is_nan() => query.bind(None::<f64>),
                        Value::Real(v) => query.bind(*v),
                        Value::Text(s) => query.bind(s.clone()),
                        Value::Timestamp(t) => {
                            query.bind(t.to_rfc3339_opts(SecondsFormat::Millis, true))
                        }
                        Value::Blob(b) => query.bind(b.clone()),
                        Value::Geometry(g) => query.bind(g.as_bytes().to_vec()),
                    };
                }
                query
                    .execute(&mut *tx)
                    .await
                    .map_err(sql_error("insert row"))?;
            }
        } else {
            for _ in table.rows() {
                sqlx::query(&format!("INSERT INTO {} DEFAULT VALUES", quote_ident(name)))
                    .execute(&mut *tx)
                    .await
                    .map_err(sql_error("insert row"))?;
            }
        }

        tx.commit().await.map_err(sql_error("commit"))?;

        info!(layer = %name, rows = table.row_count(), spatial = geometry.is_some(), "Wrote layer");
        Ok(())
    }

    /// Flush and close the connection pool, leaving a single self-contained file.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

async fn connect(path: &Path, create: bool) -> EtlResult<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(create)
        .journal_mode(SqliteJournalMode::Delete)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| {
            EtlError::ContainerError(format!("Failed to open {}: {}", path.display(), e))
        })
}

fn sql_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> EtlError {
    move |e| EtlError::ContainerError(format!("{}: {}", context, e))
}

/// Decode one cell by its runtime storage class, then coerce to the column type.
fn decode_value(row: &SqliteRow, index: usize, kind: &ColumnType) -> EtlResult<Value> {
    let raw = row.try_get_raw(index).map_err(sql_error("read cell"))?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let storage = raw.type_info().name().to_string();

    let value = match storage.as_str() {
        "INTEGER" => Value::Integer(
            row.try_get_unchecked::<i64, _>(index)
                .map_err(sql_error("decode integer"))?,
        ),
        "REAL" => Value::Real(
            row.try_get_unchecked::<f64, _>(index)
                .map_err(sql_error("decode real"))?,
        ),
        "TEXT" => {
            let text: String = row
                .try_get_unchecked(index)
                .map_err(sql_error("decode text"))?;
            match kind {
                ColumnType::Timestamp => parse_timestamp(&text)
                    .map(Value::Timestamp)
                    .unwrap_or(Value::Text(text)),
                _ => Value::Text(text),
            }
        }
        _ => {
            let bytes: Vec<u8> = row
                .try_get_unchecked(index)
                .map_err(sql_error("decode blob"))?;
            match kind {
                ColumnType::Geometry { .. } => Value::Geometry(Geometry::from_gpkg_blob(bytes)?),
                _ => Value::Blob(bytes),
            }
        }
    };

    Ok(match (kind, value) {
        (ColumnType::Real, Value::Integer(v)) => Value::Real(v as f64),
        (_, value) => value,
    })
}
