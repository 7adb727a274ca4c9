//! Storage for reach-publisher services.
//!
//! Provides:
//! - Object storage (S3 compatible) for input files and published containers
//! - A local cache of the reference spatial layer
//! - Published artifact records (logical name to external item id)

pub mod object_store;
pub mod records;
pub mod reference;

pub use self::object_store::{Buckets, ObjectStorage, ObjectStorageConfig};
pub use records::{ArtifactEntry, ArtifactRecord, MemoryRecordStore, ObjectRecordStore, RecordStore};
pub use reference::{ReferenceCache, REFERENCE_CACHE_FILE};

/// Key builder for consistent storage layout.
pub struct StoragePath;

impl StoragePath {
    /// Record for artifacts published from one input file.
    /// Format: {input_key}/item_metadata.json
    ///
    /// The record is scoped to the input key, so a run only retires items
    /// published from an input of the same name. Items published from
    /// differently named inputs stay live on the host.
    pub fn item_metadata(input_key: &str) -> String {
        format!("{}/item_metadata.json", input_key.trim_end_matches('/'))
    }

    /// File name portion of a key.
    pub fn file_name(key: &str) -> &str {
        key.rsplit('/').next().unwrap_or(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_paths() {
        assert_eq!(
            StoragePath::item_metadata("runs/2024/forecast.nc"),
            "runs/2024/forecast.nc/item_metadata.json"
        );
        assert_ne!(
            StoragePath::item_metadata("runs/a.nc"),
            StoragePath::item_metadata("runs/b.nc")
        );
        assert_eq!(StoragePath::file_name("geopackages/final_output.gpkg"), "final_output.gpkg");
        assert_eq!(StoragePath::file_name("plain.gpkg"), "plain.gpkg");
    }
}
