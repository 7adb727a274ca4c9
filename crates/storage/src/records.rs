//! Published artifact records.
//!
//! A small JSON document maps each logical artifact name to the id of the
//! item currently published for it:
//!
//! ```json
//! {"first_geopackage": {"item_id": "3f1c..."}}
//! ```
//!
//! Older runs stored a bare id as plain text; such bodies are read as a
//! record for the store's default logical name.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use hydro_common::{EtlError, EtlResult};

use crate::object_store::ObjectStorage;

/// Entry for one logical name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub item_id: String,
}

/// Logical name to published item id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRecord {
    entries: BTreeMap<String, ArtifactEntry>,
}

impl ArtifactRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a stored document. Non-JSON bodies are taken as a legacy bare id
    /// for `default_name`; an empty body is an empty record.
    pub fn parse(body: &[u8], default_name: &str) -> EtlResult<Self> {
        let text = std::str::from_utf8(body)
            .map_err(|e| EtlError::StorageError(format!("Record is not UTF-8: {}", e)))?
            .trim();

        if text.is_empty() {
            return Ok(Self::default());
        }

        match serde_json::from_str::<Self>(text) {
            Ok(record) => Ok(record),
            Err(_) if !text.starts_with('{') => {
                debug!(name = default_name, "Read legacy plain-text record");
                let mut record = Self::default();
                record.set(default_name, text);
                Ok(record)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn to_json(&self) -> EtlResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn item_id(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|e| e.item_id.as_str())
    }

    pub fn set(&mut self, name: &str, item_id: &str) {
        self.entries.insert(
            name.to_string(),
            ArtifactEntry {
                item_id: item_id.to_string(),
            },
        );
    }

    pub fn remove(&mut self, name: &str) -> Option<ArtifactEntry> {
        self.entries.remove(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Persistence for [`ArtifactRecord`]s.
///
/// Read-modify-write with last-write-wins: two runs racing on the same
/// document may each retire only the item they saw, orphaning the other.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load the record; a missing document is an empty record.
    async fn load(&self) -> EtlResult<ArtifactRecord>;

    /// Replace the stored document.
    async fn save(&self, record: &ArtifactRecord) -> EtlResult<()>;
}

/// Record kept as an object next to the data it describes.
pub struct ObjectRecordStore {
    storage: ObjectStorage,
    key: String,
    default_name: String,
}

impl ObjectRecordStore {
    pub fn new(storage: ObjectStorage, key: impl Into<String>, default_name: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            default_name: default_name.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl RecordStore for ObjectRecordStore {
    #[instrument(skip(self), fields(bucket = %self.storage.bucket(), key = %self.key))]
    async fn load(&self) -> EtlResult<ArtifactRecord> {
        match self.storage.get(&self.key).await {
            Ok(body) => ArtifactRecord::parse(&body, &self.default_name),
            Err(EtlError::ArtifactNotFound { .. }) => {
                debug!("No artifact record yet");
                Ok(ArtifactRecord::default())
            }
            Err(e) => {
                warn!(error = %e, "Failed to read artifact record");
                Err(e)
            }
        }
    }

    #[instrument(skip(self, record), fields(bucket = %self.storage.bucket(), key = %self.key))]
    async fn save(&self, record: &ArtifactRecord) -> EtlResult<()> {
        let body = record.to_json()?;
        self.storage.put(&self.key, Bytes::from(body)).await
    }
}

/// In-process record store.
#[derive(Default)]
pub struct MemoryRecordStore {
    record: Mutex<ArtifactRecord>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ArtifactRecord {
        self.record
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn load(&self) -> EtlResult<ArtifactRecord> {
        Ok(self.snapshot())
    }

    async fn save(&self, record: &ArtifactRecord) -> EtlResult<()> {
        let mut stored = self
            .record
            .lock()
            .map_err(|_| EtlError::StorageError("record store poisoned".to_string()))?;
        *stored = record.clone();
        Ok(())
    }
}
