//! Native NetCDF reading using the netcdf library.
//!
//! The netcdf library requires a file path (it wraps libnetcdf/HDF5 which need
//! file handles). When reading from bytes, we write to a temp file first.
//!
//! On Linux, we use `/dev/shm` (memory-backed tmpfs) to minimize I/O latency.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Once;

use tracing::debug;

use crate::error::{NetCdfError, NetCdfResult};
use crate::source::{VariableData, VariableSource};

/// Silence HDF5's automatic error printing to stderr.
///
/// HDF5 prints diagnostics even when the Rust side handles the error (for
/// instance when probing optional attributes). Safe to call repeatedly; only
/// the first call has an effect.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 is thread-safe and null handlers are a
        // documented way to disable automatic error printing.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// An open NetCDF file.
pub struct NativeDataset {
    file: netcdf::File,
    /// Scratch copy to remove on drop, when opened from bytes.
    scratch_path: Option<PathBuf>,
}

impl NativeDataset {
    /// Open a dataset on the local filesystem.
    pub fn open(path: &Path) -> NetCdfResult<Self> {
        silence_hdf5_errors();

        let file = netcdf::open(path)
            .map_err(|e| NetCdfError::InvalidFormat(format!("Failed to open NetCDF: {}", e)))?;

        Ok(Self {
            file,
            scratch_path: None,
        })
    }

    /// Open a dataset held in memory by spilling it to a scratch file.
    pub fn from_bytes(data: &[u8]) -> NetCdfResult<Self> {
        silence_hdf5_errors();

        let temp_file = get_optimal_temp_dir().join(generate_temp_filename());

        let mut file = std::fs::File::create(&temp_file)?;
        file.write_all(data)?;
        drop(file);

        debug!(path = %temp_file.display(), size = data.len(), "Spilled NetCDF bytes to scratch file");

        match netcdf::open(&temp_file) {
            Ok(file) => Ok(Self {
                file,
                scratch_path: Some(temp_file),
            }),
            Err(e) => {
                let _ = std::fs::remove_file(&temp_file);
                Err(NetCdfError::InvalidFormat(format!(
                    "Failed to open NetCDF: {}",
                    e
                )))
            }
        }
    }
}

impl Drop for NativeDataset {
    fn drop(&mut self) {
        if let Some(path) = self.scratch_path.take() {
            let _ = std::fs::remove_file(&path);
        }
    }
}

impl VariableSource for NativeDataset {
    fn read_variable(&self, name: &str) -> NetCdfResult<Option<VariableData>> {
        let Some(var) = self.file.variable(name) else {
            return Ok(None);
        };

        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();

        let raw: Vec<f64> = var.get_values(..).map_err(|e| NetCdfError::ReadFailed {
            variable: name.to_string(),
            message: e.to_string(),
        })?;

        let fill_value = get_f64_attr(&var, "_FillValue");
        let scale_factor = get_f64_attr(&var, "scale_factor").unwrap_or(1.0);
        let add_offset = get_f64_attr(&var, "add_offset").unwrap_or(0.0);

        // Masked cells become NaN; packed values are unpacked.
        let values = raw
            .into_iter()
            .map(|val| match fill_value {
                Some(fill) if val == fill => f64::NAN,
                _ => val * scale_factor + add_offset,
            })
            .collect();

        Ok(Some(VariableData::new(shape, values)))
    }

    fn text_attribute(&self, variable: &str, name: &str) -> NetCdfResult<Option<String>> {
        let Some(var) = self.file.variable(variable) else {
            return Ok(None);
        };
        if !has_attr(&var, name) {
            return Ok(None);
        }
        match var.attribute_value(name) {
            Some(Ok(netcdf::AttributeValue::Str(s))) => Ok(Some(s)),
            Some(Ok(_)) => Ok(None),
            Some(Err(e)) => Err(NetCdfError::ReadFailed {
                variable: format!("{}:{}", variable, name),
                message: e.to_string(),
            }),
            None => Ok(None),
        }
    }

    fn dimension_len(&self, name: &str) -> Option<usize> {
        self.file.dimension(name).map(|d| d.len())
    }
}

// =============================================================================
// Internal helpers
// =============================================================================

/// Get the optimal temp directory for NetCDF file operations.
///
/// On Linux, uses /dev/shm (memory-backed tmpfs) if available and writable.
fn get_optimal_temp_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        let shm_path = Path::new("/dev/shm");
        if shm_path.is_dir() {
            let test_path = shm_path.join(format!(".netcdf_test_{}", std::process::id()));
            if std::fs::write(&test_path, b"test").is_ok() {
                let _ = std::fs::remove_file(&test_path);
                return shm_path.to_path_buf();
            }
        }
    }

    std::env::temp_dir()
}

/// Unique temp file name from process ID, thread ID and a counter.
fn generate_temp_filename() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let pid = std::process::id();
    let tid = std::thread::current().id();
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);

    format!("reach_native_{}_{:?}_{}.nc", pid, tid, count)
}

/// Check for an attribute without triggering HDF5 error output.
fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

fn get_f64_attr(var: &netcdf::Variable, name: &str) -> Option<f64> {
    if !has_attr(var, name) {
        return None;
    }
    let attr_value = var.attribute_value(name)?.ok()?;
    f64::try_from(attr_value).ok()
}
