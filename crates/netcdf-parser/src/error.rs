//! Error types for NetCDF reading operations.

use hydro_common::EtlError;
use thiserror::Error;

/// Result type for NetCDF backend operations.
pub type NetCdfResult<T> = Result<T, NetCdfError>;

/// Errors raised by a dataset backend while reading.
///
/// Validation failures (missing variables, shape mismatches) are reported
/// through [`EtlError`] by the extractor; this type only covers the backend.
#[derive(Error, Debug)]
pub enum NetCdfError {
    /// File I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The bytes are not a readable NetCDF dataset
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    /// A variable exists but could not be read
    #[error("Failed to read variable '{variable}': {message}")]
    ReadFailed { variable: String, message: String },

    /// Built without a backend able to decode NetCDF files
    #[error("NetCDF support not compiled in (enable the `native` feature)")]
    Unsupported,
}

impl From<NetCdfError> for EtlError {
    fn from(err: NetCdfError) -> Self {
        match err {
            NetCdfError::IoError(e) => EtlError::IoError(e),
            other => EtlError::DatasetError(other.to_string()),
        }
    }
}
