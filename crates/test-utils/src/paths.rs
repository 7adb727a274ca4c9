//! Path utilities for locating test data and creating scratch space.

use std::path::{Path, PathBuf};

/// Returns the workspace root directory.
pub fn workspace_root() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir)
        .parent() // crates/
        .and_then(|p| p.parent()) // workspace root
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from(manifest_dir))
}

/// Searches for a test file in multiple locations.
///
/// Checked in order: `TEST_DATA_DIR`, `crates/netcdf-parser/testdata/`,
/// `crates/geopackage/testdata/`, the workspace `testdata/`.
pub fn find_test_file(name: &str) -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(test_data_dir) = std::env::var("TEST_DATA_DIR") {
        candidates.push(PathBuf::from(test_data_dir).join(name));
    }

    let root = workspace_root();
    candidates.extend([
        root.join("crates/netcdf-parser/testdata").join(name),
        root.join("crates/geopackage/testdata").join(name),
        root.join("testdata").join(name),
    ]);

    candidates.into_iter().find(|path| path.exists())
}

/// Creates a temporary directory, removed when the returned `TempDir` is dropped.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temporary test directory")
}

/// Path for a GeoPackage named `name` inside `dir`.
pub fn scratch_gpkg_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.gpkg", name))
}
