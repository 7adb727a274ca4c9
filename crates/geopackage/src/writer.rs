//! Spatial layer writer.

use std::path::Path;

use hydro_common::{EtlResult, Table};
use tracing::{info, instrument};

use crate::container::GeoPackage;
use crate::layer::LayerRef;
use crate::normalize::normalize_geometry;

/// How [`write_layer`] treats an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Delete the file and create a fresh GeoPackage holding only this layer.
    Overwrite,
    /// Create the file if absent; otherwise replace only the named layer.
    Append,
}

/// Normalize `table` to a single `SHAPE` geometry and write it as `layer`.
#[instrument(skip(table), fields(path = %path.display(), rows = table.row_count()))]
pub async fn write_layer(
    path: &Path,
    layer: &str,
    table: &Table,
    mode: WriteMode,
    add_placeholder: bool,
) -> EtlResult<()> {
    let normalized = normalize_geometry(table.clone(), add_placeholder)?;

    if mode == WriteMode::Overwrite {
        remove_container(path)?;
    }

    let gpkg = GeoPackage::open_or_create(path).await?;
    let result = gpkg.write_table(layer, &normalized).await;
    gpkg.close().await;
    result?;

    info!(layer, ?mode, "Wrote spatial layer");
    Ok(())
}

/// Read one layer from an existing container.
#[instrument(fields(path = %path.display()))]
pub async fn read_layer(path: &Path, layer: &LayerRef) -> EtlResult<Table> {
    let gpkg = GeoPackage::open(path).await?;
    let result = gpkg.read_table(layer).await;
    gpkg.close().await;
    result
}

/// Remove a container file and any SQLite sidecar files.
pub fn remove_container(path: &Path) -> EtlResult<()> {
    for suffix in ["", "-journal", "-wal", "-shm"] {
        let mut candidate = path.as_os_str().to_owned();
        candidate.push(suffix);
        match std::fs::remove_file(&candidate) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
