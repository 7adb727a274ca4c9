//! Geometry column normalization for spatial output.
//!
//! Every table written for spatial consumption ends up with exactly one
//! geometry column named [`CANONICAL_GEOMETRY_COLUMN`].

use hydro_common::{
    Column, ColumnType, EtlError, EtlResult, Geometry, SpatialRef, Table, Value,
    CANONICAL_GEOMETRY_COLUMN,
};
use tracing::debug;

/// Blob columns that are treated as geometry, in promotion order.
const GEOMETRY_COLUMN_NAMES: [&str; 3] = [CANONICAL_GEOMETRY_COLUMN, "geom", "geometry"];

/// Column preferred when a table carries several geometries.
const PREFERRED_GEOMETRY_COLUMN: &str = "geometry";

/// Reduce `table` to a single geometry column named `SHAPE`.
///
/// - duplicate column names are dropped (first wins, compared ignoring ASCII
///   case since SQLite identifiers are case-insensitive)
/// - a blob column named `SHAPE`, `geom` or `geometry` is promoted to geometry
///   when the table has none
/// - with still no geometry, `add_placeholder` adds a `POINT(0 0)` per row,
///   otherwise the table is rejected with `MissingGeometry`
/// - with several geometries, `geometry` is kept if present, else the first
pub fn normalize_geometry(table: Table, add_placeholder: bool) -> EtlResult<Table> {
    let mut table = drop_duplicate_columns_ignore_case(&table);

    if table.geometry_columns().is_empty() {
        promote_blob_geometry(&mut table)?;
    }

    let geometry_columns = table.geometry_columns();
    let keep = match geometry_columns.as_slice() {
        [] if add_placeholder => {
            add_placeholder_column(&mut table)?;
            return Ok(table);
        }
        [] => {
            return Err(EtlError::MissingGeometry(format!(
                "table with columns [{}]",
                table.column_names().join(", ")
            )))
        }
        [only] => *only,
        many => many
            .iter()
            .copied()
            .find(|&i| table.columns()[i].name == PREFERRED_GEOMETRY_COLUMN)
            .unwrap_or(many[0]),
    };

    let keep_name = table.columns()[keep].name.clone();

    // Drop the other geometries and any attribute column that would collide
    // with the canonical name, highest index first.
    let mut drop: Vec<usize> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(i, c)| {
            *i != keep
                && (c.kind.is_geometry() || c.name.eq_ignore_ascii_case(CANONICAL_GEOMETRY_COLUMN))
        })
        .map(|(i, _)| i)
        .collect();
    drop.sort_unstable_by(|a, b| b.cmp(a));
    for index in &drop {
        debug!(column = %table.columns()[*index].name, "Dropping extra geometry column");
        table.drop_column_at(*index);
    }

    if keep_name != CANONICAL_GEOMETRY_COLUMN {
        table.rename_column(&keep_name, CANONICAL_GEOMETRY_COLUMN)?;
    }

    Ok(table)
}

fn drop_duplicate_columns_ignore_case(table: &Table) -> Table {
    let mut seen: Vec<String> = Vec::with_capacity(table.column_count());
    let keep: Vec<usize> = table
        .columns()
        .iter()
        .enumerate()
        .filter_map(|(i, c)| {
            let lower = c.name.to_ascii_lowercase();
            if seen.contains(&lower) {
                None
            } else {
                seen.push(lower);
                Some(i)
            }
        })
        .collect();

    if keep.len() == table.column_count() {
        table.clone()
    } else {
        table.select_indices(&keep)
    }
}

fn promote_blob_geometry(table: &mut Table) -> EtlResult<()> {
    let Some(name) = GEOMETRY_COLUMN_NAMES
        .iter()
        .find(|n| {
            table
                .column_index(n)
                .is_some_and(|i| table.columns()[i].kind == ColumnType::Blob)
        })
        .map(|n| n.to_string())
    else {
        return Ok(());
    };

    let mut invalid = None;
    table.map_column(&name, |value| match value {
        Value::Blob(bytes) => match Geometry::from_gpkg_blob(bytes.clone()) {
            Ok(geom) => Value::Geometry(geom),
            Err(e) => {
                invalid.get_or_insert(e);
                Value::Null
            }
        },
        other => other.clone(),
    })?;
    if let Some(err) = invalid {
        return Err(err);
    }

    let type_name = table
        .column_values(&name)?
        .iter()
        .find_map(|v| v.as_geometry().and_then(|g| g.geometry_type_name()))
        .unwrap_or("GEOMETRY")
        .to_string();
    table.set_column_type(&name, ColumnType::Geometry { type_name })?;

    debug!(column = %name, "Promoted blob column to geometry");
    Ok(())
}

fn add_placeholder_column(table: &mut Table) -> EtlResult<()> {
    if table.srs().is_none() {
        table.set_srs(Some(SpatialRef::undefined_geographic()));
    }
    let srs_id = table.srs().map(|s| s.srs_id).unwrap_or(0);

    // A non-geometry column already holding the canonical name is replaced.
    while let Some(index) = table
        .columns()
        .iter()
        .position(|c| c.name.eq_ignore_ascii_case(CANONICAL_GEOMETRY_COLUMN))
    {
        table.drop_column_at(index);
    }

    let values = vec![Value::Geometry(Geometry::placeholder(srs_id)); table.row_count()];
    table.add_column(
        Column::new(
            CANONICAL_GEOMETRY_COLUMN,
            ColumnType::Geometry {
                type_name: "POINT".to_string(),
            },
        ),
        values,
    )?;

    debug!(rows = table.row_count(), "Added placeholder geometry");
    Ok(())
}
