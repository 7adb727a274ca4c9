//! Republish bookkeeping.
//!
//! Each logical artifact (for example `first_geopackage`) has at most one
//! live item on the host. Publishing under a name first retires whatever
//! item the record holds for it, then uploads the replacement and records
//! its id.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use hydro_common::{EtlError, EtlResult};
use storage::RecordStore;

use crate::host::{FeatureHost, HostedItem, ItemSpec};

pub struct RepublishTracker {
    host: Arc<dyn FeatureHost>,
    records: Arc<dyn RecordStore>,
}

impl RepublishTracker {
    pub fn new(host: Arc<dyn FeatureHost>, records: Arc<dyn RecordStore>) -> Self {
        Self { host, records }
    }

    pub fn host(&self) -> &dyn FeatureHost {
        self.host.as_ref()
    }

    /// Replace the item published under `name` with `data`.
    ///
    /// Retiring the previous item never fails the call. Upload failures and
    /// failures to persist the record do.
    #[instrument(skip(self, spec, data), fields(title = %spec.title))]
    pub async fn publish(&self, name: &str, spec: &ItemSpec, data: &Path) -> EtlResult<HostedItem> {
        let mut record = match self.records.load().await {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Artifact record unreadable, previous item cannot be retired");
                Default::default()
            }
        };

        if let Some(previous) = record.item_id(name) {
            if let Err(e) = self.discard_item(previous).await {
                warn!(item_id = %previous, error = %e, "Continuing without retiring previous item");
            }
        }

        let item = self.host.add_item(spec, data).await?;
        info!(item_id = %item.id, "Published item");

        record.set(name, &item.id);
        self.records.save(&record).await?;

        Ok(item)
    }

    /// Discard the item recorded under `name` and drop it from the record.
    ///
    /// Returns false when nothing is recorded under `name`. The record is
    /// only rewritten once the host has let go of the item.
    #[instrument(skip(self))]
    pub async fn retire(&self, name: &str) -> EtlResult<bool> {
        let mut record = self.records.load().await?;
        let Some(entry) = record.remove(name) else {
            debug!("Nothing recorded");
            return Ok(false);
        };

        self.discard_item(&entry.item_id).await?;
        self.records.save(&record).await?;
        Ok(true)
    }

    /// Delete an item and purge its recycle-bin copies.
    ///
    /// Returns false when the host no longer has the item. Host errors come
    /// back as `CleanupFailure`.
    #[instrument(skip(self))]
    pub async fn discard_item(&self, item_id: &str) -> EtlResult<bool> {
        let deleted = self
            .host
            .delete_item(item_id)
            .await
            .map_err(|e| EtlError::CleanupFailure(format!("delete {}: {}", item_id, e)))?;

        let Some(item) = deleted else {
            debug!("Item already gone");
            return Ok(false);
        };

        let purged = self
            .host
            .purge_recycle_bin(&item.title)
            .await
            .map_err(|e| EtlError::CleanupFailure(format!("purge {}: {}", item.title, e)))?;

        info!(title = %item.title, purged = purged, "Retired item");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryFeatureHost;
    use async_trait::async_trait;
    use storage::{ArtifactRecord, MemoryRecordStore};

    struct BrokenStore;

    #[async_trait]
    impl RecordStore for BrokenStore {
        async fn load(&self) -> EtlResult<ArtifactRecord> {
            Ok(ArtifactRecord::new())
        }

        async fn save(&self, _record: &ArtifactRecord) -> EtlResult<()> {
            Err(EtlError::StorageError("bucket is read-only".to_string()))
        }
    }

    fn upload_file() -> tempfile::NamedTempFile {
        tempfile::NamedTempFile::new().unwrap()
    }

    #[tokio::test]
    async fn test_publish_records_item() {
        let host = Arc::new(MemoryFeatureHost::new());
        let records = Arc::new(MemoryRecordStore::new());
        let tracker = RepublishTracker::new(host.clone(), records.clone());
        let file = upload_file();

        let item = tracker
            .publish("first_geopackage", &ItemSpec::geopackage("first.gpkg"), file.path())
            .await
            .unwrap();

        assert_eq!(records.snapshot().item_id("first_geopackage"), Some(item.id.as_str()));
        assert_eq!(host.live_items(), vec![item]);
    }

    #[tokio::test]
    async fn test_discard_missing_item() {
        let tracker = RepublishTracker::new(
            Arc::new(MemoryFeatureHost::new()),
            Arc::new(MemoryRecordStore::new()),
        );
        assert!(!tracker.discard_item("nothing-here").await.unwrap());
    }

    #[tokio::test]
    async fn test_discard_failure_is_cleanup_failure() {
        let host = Arc::new(MemoryFeatureHost::new());
        host.seed_item("a", "t");
        host.fail_deletes(true);
        let tracker = RepublishTracker::new(host, Arc::new(MemoryRecordStore::new()));

        let err = tracker.discard_item("a").await.unwrap_err();
        assert!(matches!(err, EtlError::CleanupFailure(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_persist_failure_surfaces() {
        let host = Arc::new(MemoryFeatureHost::new());
        let tracker = RepublishTracker::new(host, Arc::new(BrokenStore));
        let file = upload_file();

        let err = tracker
            .publish("final_geopackage", &ItemSpec::geopackage("t"), file.path())
            .await
            .unwrap_err();
        assert!(matches!(err, EtlError::StorageError(_)));
    }

    #[tokio::test]
    async fn test_retire_forgets_item() {
        let host = Arc::new(MemoryFeatureHost::new());
        let records = Arc::new(MemoryRecordStore::new());
        let tracker = RepublishTracker::new(host.clone(), records.clone());
        let file = upload_file();

        tracker
            .publish("final_geopackage", &ItemSpec::geopackage("t"), file.path())
            .await
            .unwrap();
        assert!(tracker.retire("final_geopackage").await.unwrap());

        assert!(host.live_items().is_empty());
        assert!(records.snapshot().is_empty());
        assert!(!tracker.retire("final_geopackage").await.unwrap());
    }

    #[tokio::test]
    async fn test_retire_keeps_record_when_delete_fails() {
        let host = Arc::new(MemoryFeatureHost::new());
        let records = Arc::new(MemoryRecordStore::new());
        let tracker = RepublishTracker::new(host.clone(), records.clone());
        let file = upload_file();

        let item = tracker
            .publish("final_geopackage", &ItemSpec::geopackage("t"), file.path())
            .await
            .unwrap();
        host.fail_deletes(true);

        let err = tracker.retire("final_geopackage").await.unwrap_err();
        assert!(matches!(err, EtlError::CleanupFailure(_)));
        assert_eq!(records.snapshot().item_id("final_geopackage"), Some(item.id.as_str()));
    }
}
