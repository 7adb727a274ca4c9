//! Local cache of the reference spatial layer container.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use hydro_common::EtlResult;

use crate::object_store::ObjectStorage;

/// File name the reference container is cached under.
pub const REFERENCE_CACHE_FILE: &str = "reference_geopackage.gpkg";

/// Fetches the reference container once and re-uses the local copy.
///
/// The copy is written to a temporary name and renamed into place, so a
/// crashed download never leaves a truncated file that later runs would trust.
pub struct ReferenceCache {
    storage: ObjectStorage,
    key: String,
    local_path: PathBuf,
}

impl ReferenceCache {
    pub fn new(storage: ObjectStorage, key: impl Into<String>, scratch_dir: &Path) -> Self {
        Self {
            storage,
            key: key.into(),
            local_path: scratch_dir.join(REFERENCE_CACHE_FILE),
        }
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// Local path of the reference container, downloading it if not cached.
    #[instrument(skip(self), fields(bucket = %self.storage.bucket(), key = %self.key))]
    pub async fn ensure(&self) -> EtlResult<PathBuf> {
        if tokio::fs::try_exists(&self.local_path).await? {
            debug!(path = %self.local_path.display(), "Reference container cached");
            return Ok(self.local_path.clone());
        }

        let data = self.storage.get(&self.key).await?;

        if let Some(parent) = self.local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = self.local_path.with_extension("gpkg.partial");
        tokio::fs::write(&partial, &data).await?;
        tokio::fs::rename(&partial, &self.local_path).await?;

        info!(path = %self.local_path.display(), size = data.len(), "Cached reference container");
        Ok(self.local_path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use hydro_common::EtlError;

    #[tokio::test]
    async fn test_fetches_once() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ObjectStorage::in_memory("reference");
        storage
            .put("lines.gpkg", Bytes::from_static(b"first"))
            .await
            .unwrap();

        let cache = ReferenceCache::new(storage.clone(), "lines.gpkg", dir.path());
        let path = cache.ensure().await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"first");

        // A changed remote copy is not fetched again.
        storage
            .put("lines.gpkg", Bytes::from_static(b"second"))
            .await
            .unwrap();
        let again = cache.ensure().await.unwrap();
        assert_eq!(again, path);
        assert_eq!(std::fs::read(&again).unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_missing_reference() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ReferenceCache::new(ObjectStorage::in_memory("reference"), "absent", dir.path());
        assert!(matches!(
            cache.ensure().await,
            Err(EtlError::ArtifactNotFound { .. })
        ));
        assert!(!cache.local_path().exists());
    }
}
