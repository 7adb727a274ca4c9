//! From NetCDF bytes to relational tables.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, instrument};

use hydro_common::{EtlError, EtlResult, Table};
use netcdf_parser::{extract_threshold_summary, ReachDataset, VariableSource};

use crate::materialize::materialize;

/// Opens raw dataset bytes.
pub trait DatasetLoader: Send + Sync {
    fn open(&self, data: &[u8]) -> EtlResult<Box<dyn VariableSource + Send>>;
}

/// Loader backed by the compiled-in NetCDF reader.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetCdfLoader;

impl DatasetLoader for NetCdfLoader {
    fn open(&self, data: &[u8]) -> EtlResult<Box<dyn VariableSource + Send>> {
        Ok(netcdf_parser::open_dataset_bytes(data)?)
    }
}

/// Tables derived from one model output file.
#[derive(Debug, Clone)]
pub struct ReachTables {
    /// One row per (timestep, reach).
    pub relational: Table,
    /// Threshold exceedance summary, when the file has one.
    pub summary: Option<Table>,
}

/// Validate, materialize and summarize an opened dataset.
pub fn build_tables(source: &dyn VariableSource) -> EtlResult<ReachTables> {
    let dataset = ReachDataset::from_source(source)?;
    let relational = materialize(&dataset)?;
    let summary = extract_threshold_summary(source)?;
    Ok(ReachTables {
        relational,
        summary,
    })
}

/// Decode `data` on the blocking pool and build its tables.
#[instrument(skip(loader, data), fields(size = data.len()))]
pub async fn load_reach_tables(loader: Arc<dyn DatasetLoader>, data: Bytes) -> EtlResult<ReachTables> {
    let tables = tokio::task::spawn_blocking(move || {
        let source = loader.open(&data)?;
        build_tables(source.as_ref())
    })
    .await
    .map_err(|e| EtlError::DatasetError(format!("extraction task failed: {}", e)))??;

    info!(
        rows = tables.relational.row_count(),
        summary_rows = tables.summary.as_ref().map(Table::row_count).unwrap_or(0),
        "Extracted model output"
    );
    Ok(tables)
}
