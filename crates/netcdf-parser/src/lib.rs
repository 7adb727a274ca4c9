//! NetCDF extraction for river-reach model output.
//!
//! Reading goes through the [`VariableSource`] trait so extraction logic is
//! independent of the backend:
//!
//! - [`native::NativeDataset`] reads real files through libnetcdf (feature
//!   `native`, requires `libnetcdf-dev` and `libhdf5-dev`).
//! - [`MemoryDataset`] holds variables assembled in memory.
//!
//! On top of a source, [`ReachDataset::from_source`] validates and types the
//! per-reach time series, and [`extract_threshold_summary`] flattens the
//! exceedance summary cube.

mod dataset;
mod error;
mod memory;
mod source;
mod summary;

#[cfg(feature = "native")]
pub mod native;

pub use dataset::{
    Metric, MetricGrid, ReachDataset, ReachIndex, Threshold, REACH_DIMENSION, REACH_ID_VARIABLE,
    STREAM_ORDER_VARIABLE, TIME_VARIABLE,
};
pub use error::{NetCdfError, NetCdfResult};
pub use memory::MemoryDataset;
pub use source::{VariableData, VariableSource};
pub use summary::{
    extract_threshold_summary, SUMMARY_VARIABLE, SUMMARY_WINDOW_INDEX, THRESHOLD_DIMENSION,
};

/// Open NetCDF bytes with the compiled-in backend.
#[cfg(feature = "native")]
pub fn open_dataset_bytes(data: &[u8]) -> NetCdfResult<Box<dyn VariableSource + Send>> {
    Ok(Box::new(native::NativeDataset::from_bytes(data)?))
}

/// Open NetCDF bytes with the compiled-in backend.
#[cfg(not(feature = "native"))]
pub fn open_dataset_bytes(_data: &[u8]) -> NetCdfResult<Box<dyn VariableSource + Send>> {
    Err(NetCdfError::Unsupported)
}
