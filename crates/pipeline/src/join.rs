//! Key-based equality joins between tables and container layers.
//!
//! Joins run as DataFusion SQL over the two tables. Integer and real keys
//! compare numerically, so an integral real matches the equal integer, and
//! null keys never match. Non-key columns present on both sides are suffixed
//! `_x` (left) and `_y` (right). Output follows left row order, then right
//! row order.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, instrument};

use geopackage::{read_layer, LayerRef};
use hydro_common::{Column, EtlError, EtlResult, Table};

use crate::frame::{ident, SqlFrames};

pub const LEFT_SUFFIX: &str = "_x";
pub const RIGHT_SUFFIX: &str = "_y";

/// Row matching rule for [`join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// Rows whose key appears on both sides.
    Inner,
    /// Every left row; unmatched rows carry nulls on the right.
    Left,
}

impl JoinKind {
    fn keyword(self) -> &'static str {
        match self {
            JoinKind::Inner => "JOIN",
            JoinKind::Left => "LEFT JOIN",
        }
    }
}

/// How reference features combine with relational rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceJoin {
    /// Keep every reference feature, matched or not.
    RetainReference,
    /// Keep matched features only, one row per reference key.
    Inner,
}

/// Equality join of `left.left_on` with `right.right_on`.
pub async fn join(
    left: &Table,
    right: &Table,
    left_on: &str,
    right_on: &str,
    kind: JoinKind,
) -> EtlResult<Table> {
    join_rows(left, right, left_on, right_on, kind, false).await
}

/// Join relational rows onto a reference layer.
///
/// The reference is always the left side. In [`ReferenceJoin::Inner`] mode
/// each reference key appears once; when several pairs match, the one with
/// the lowest reference row and then the lowest relational row is kept.
pub async fn join_reference(
    reference: &Table,
    relational: &Table,
    reference_key: &str,
    relational_key: &str,
    mode: ReferenceJoin,
) -> EtlResult<Table> {
    let joined = match mode {
        ReferenceJoin::RetainReference => {
            join_rows(
                reference,
                relational,
                reference_key,
                relational_key,
                JoinKind::Left,
                false,
            )
            .await?
        }
        ReferenceJoin::Inner => {
            join_rows(
                reference,
                relational,
                reference_key,
                relational_key,
                JoinKind::Inner,
                true,
            )
            .await?
        }
    };

    debug!(
        reference_rows = reference.row_count(),
        relational_rows = relational.row_count(),
        joined_rows = joined.row_count(),
        ?mode,
        "Joined reference layer"
    );
    Ok(joined)
}

/// Inner join of two layers of one container.
#[instrument(fields(path = %path.display()))]
pub async fn join_container_layers(
    path: &Path,
    layer_a: &LayerRef,
    layer_b: &LayerRef,
    key_a: &str,
    key_b: &str,
) -> EtlResult<Table> {
    let a = read_layer(path, layer_a).await?;
    let b = read_layer(path, layer_b).await?;
    join(&a, &b, key_a, key_b, JoinKind::Inner).await
}

fn key_column(table: &Table, key: &str, side: &str) -> EtlResult<usize> {
    if key.trim().is_empty() {
        return Err(EtlError::InvalidJoinKey(format!("empty {} join key", side)));
    }
    table.column_index(key).ok_or_else(|| {
        EtlError::InvalidJoinKey(format!("{} key '{}' is not a column", side, key))
    })
}

/// SQL expressions for both join keys, cast to a common type when needed.
fn key_exprs(left: &Column, right: &Column) -> EtlResult<(String, String)> {
    let l = format!("lhs.{}", ident(&left.name));
    let r = format!("rhs.{}", ident(&right.name));

    if left.kind.is_geometry() || right.kind.is_geometry() {
        return Err(EtlError::InvalidJoinKey(format!(
            "geometry column '{}' cannot be a join key",
            if left.kind.is_geometry() { &left.name } else { &right.name }
        )));
    }
    if left.kind == right.kind {
        return Ok((l, r));
    }
    if left.kind.is_numeric() && right.kind.is_numeric() {
        return Ok((format!("CAST({} AS DOUBLE)", l), format!("CAST({} AS DOUBLE)", r)));
    }
    Err(EtlError::InvalidJoinKey(format!(
        "cannot match {:?} key '{}' with {:?} key '{}'",
        left.kind, left.name, right.kind, right.name
    )))
}

async fn join_rows(
    left: &Table,
    right: &Table,
    left_on: &str,
    right_on: &str,
    kind: JoinKind,
    unique_left_keys: bool,
) -> EtlResult<Table> {
    let li = key_column(left, left_on, "left")?;
    let ri = key_column(right, right_on, "right")?;
    let (left_key, right_key) = key_exprs(&left.columns()[li], &right.columns()[ri])?;

    // A shared key name collapses into the left column.
    let merged_key = left_on == right_on;
    let right_indices: Vec<usize> = (0..right.column_count())
        .filter(|&i| !(merged_key && i == ri))
        .collect();

    let left_names: HashSet<&str> = left
        .columns()
        .iter()
        .enumerate()
        .filter(|(i, _)| !(merged_key && *i == li))
        .map(|(_, c)| c.name.as_str())
        .collect();
    let overlapping: HashSet<&str> = right_indices
        .iter()
        .map(|&i| right.columns()[i].name.as_str())
        .filter(|name| left_names.contains(name))
        .collect();

    let mut frames = SqlFrames::new();
    frames.register("lhs", left)?;
    frames.register("rhs", right)?;

    let mut projection = Vec::with_capacity(left.column_count() + right_indices.len());
    let sides = left
        .columns()
        .iter()
        .map(|c| ("lhs", c, LEFT_SUFFIX))
        .chain(
            right_indices
                .iter()
                .map(|&i| ("rhs", &right.columns()[i], RIGHT_SUFFIX)),
        );
    for (side, column, suffix) in sides {
        let alias = if overlapping.contains(column.name.as_str()) {
            format!("{}{}", column.name, suffix)
        } else {
            column.name.clone()
        };
        projection.push(format!("{}.{} AS {}", side, ident(&column.name), ident(&alias)));
        frames.hint(alias, column.kind.clone());
    }
    projection.push("lhs.__row AS __lrow".to_string());
    projection.push("rhs.__row AS __rrow".to_string());

    let columns = projection.join(", ");
    let from = format!(
        "FROM lhs {} rhs ON {} = {}",
        kind.keyword(),
        left_key,
        right_key
    );
    let sql = if unique_left_keys {
        // Lowest reference row, then lowest relational row, wins each key.
        format!(
            "SELECT * FROM (\
             SELECT {columns}, ROW_NUMBER() OVER (PARTITION BY {left_key} ORDER BY lhs.__row, rhs.__row) AS __pick {from}\
             ) AS paired WHERE __pick = 1 ORDER BY __lrow, __rrow"
        )
    } else {
        format!("SELECT {columns} {from} ORDER BY __lrow, __rrow")
    };

    frames.query(&sql).await
}
