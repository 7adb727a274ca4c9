//! Object storage interface (S3 compatible).

use std::collections::HashMap;
use std::path::Path as FsPath;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use object_store::{aws::AmazonS3Builder, memory::InMemory, path::Path, ObjectStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use hydro_common::{EtlError, EtlResult};

/// Configuration for object storage connections.
///
/// With no endpoint the AWS environment (region, credentials, instance role)
/// is used; an explicit endpoint targets MinIO or another S3-compatible store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    /// S3-compatible endpoint URL
    pub endpoint: Option<String>,
    /// Region (defaults to the AWS environment)
    pub region: Option<String>,
    /// Access key ID
    pub access_key_id: Option<String>,
    /// Secret access key
    pub secret_access_key: Option<String>,
    /// Allow plain HTTP (for local MinIO)
    pub allow_http: bool,
}

impl ObjectStorageConfig {
    /// Load from `S3_ENDPOINT`, `S3_REGION`, `S3_ACCESS_KEY`, `S3_SECRET_KEY`,
    /// `S3_ALLOW_HTTP`.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            endpoint: var("S3_ENDPOINT"),
            region: var("S3_REGION"),
            access_key_id: var("S3_ACCESS_KEY"),
            secret_access_key: var("S3_SECRET_KEY"),
            allow_http: var("S3_ALLOW_HTTP")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}

/// Object storage client for one bucket.
#[derive(Clone)]
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ObjectStorage {
    /// Create an S3 client for `bucket`.
    pub fn new(config: &ObjectStorageConfig, bucket: &str) -> EtlResult<Self> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }
        if let Some(key) = &config.access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(secret) = &config.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }
        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder
            .build()
            .map_err(|e| EtlError::StorageError(format!("Failed to create S3 client: {}", e)))?;

        Ok(Self::from_store(Arc::new(store), bucket))
    }

    /// An empty in-process store.
    pub fn in_memory(bucket: &str) -> Self {
        Self::from_store(Arc::new(InMemory::new()), bucket)
    }

    pub fn from_store(store: Arc<dyn ObjectStore>, bucket: &str) -> Self {
        Self {
            store,
            bucket: bucket.to_string(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Write bytes to a key in the bucket.
    #[instrument(skip(self, data), fields(bucket = %self.bucket, path = %path))]
    pub async fn put(&self, path: &str, data: Bytes) -> EtlResult<()> {
        let location = Path::from(path);
        debug!(size = data.len(), "Writing object");

        self.store
            .put(&location, data.into())
            .await
            .map_err(|e| EtlError::StorageError(format!("Failed to write {}: {}", path, e)))?;

        Ok(())
    }

    /// Read an object; a missing key is `ArtifactNotFound`.
    #[instrument(skip(self), fields(bucket = %self.bucket, path = %path))]
    pub async fn get(&self, path: &str) -> EtlResult<Bytes> {
        let location = Path::from(path);

        let result = match self.store.get(&location).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(EtlError::artifact_not_found(&self.bucket, path))
            }
            Err(e) => {
                return Err(EtlError::StorageError(format!(
                    "Failed to read {}: {}",
                    path, e
                )))
            }
        };

        let bytes = result
            .bytes()
            .await
            .map_err(|e| EtlError::StorageError(format!("Failed to read bytes: {}", e)))?;

        debug!(size = bytes.len(), "Read object");
        Ok(bytes)
    }

    /// Check if an object exists.
    pub async fn exists(&self, path: &str) -> EtlResult<bool> {
        let location = Path::from(path);

        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(EtlError::StorageError(format!(
                "Failed to check {}: {}",
                path, e
            ))),
        }
    }

    /// List object keys with a given prefix.
    pub async fn list(&self, prefix: &str) -> EtlResult<Vec<String>> {
        use futures::TryStreamExt;

        let prefix_path = Path::from(prefix);
        let mut paths = Vec::new();

        let mut stream = self.store.list(Some(&prefix_path));
        while let Some(meta) = stream
            .try_next()
            .await
            .map_err(|e| EtlError::StorageError(format!("List failed: {}", e)))?
        {
            paths.push(meta.location.to_string());
        }

        Ok(paths)
    }

    /// Delete an object.
    #[instrument(skip(self), fields(bucket = %self.bucket, path = %path))]
    pub async fn delete(&self, path: &str) -> EtlResult<()> {
        let location = Path::from(path);

        self.store
            .delete(&location)
            .await
            .map_err(|e| EtlError::StorageError(format!("Failed to delete {}: {}", path, e)))?;

        Ok(())
    }

    /// Download an object to a local file.
    #[instrument(skip(self, local), fields(bucket = %self.bucket, local = %local.display()))]
    pub async fn download_to(&self, path: &str, local: &FsPath) -> EtlResult<()> {
        let data = self.get(path).await?;
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local, &data).await?;
        Ok(())
    }

    /// Upload a local file.
    #[instrument(skip(self, local), fields(bucket = %self.bucket, local = %local.display()))]
    pub async fn upload_file(&self, local: &FsPath, path: &str) -> EtlResult<()> {
        let data = tokio::fs::read(local).await?;
        self.put(path, Bytes::from(data)).await
    }
}

/// Hands out one [`ObjectStorage`] per bucket name, built on first use.
pub struct Buckets {
    config: Option<ObjectStorageConfig>,
    opened: Mutex<HashMap<String, ObjectStorage>>,
}

impl Buckets {
    /// S3 clients built from `config`.
    pub fn s3(config: ObjectStorageConfig) -> Self {
        Self {
            config: Some(config),
            opened: Mutex::new(HashMap::new()),
        }
    }

    /// Independent in-memory stores, one per bucket name.
    pub fn in_memory() -> Self {
        Self {
            config: None,
            opened: Mutex::new(HashMap::new()),
        }
    }

    pub fn bucket(&self, name: &str) -> EtlResult<ObjectStorage> {
        let mut opened = self
            .opened
            .lock()
            .map_err(|_| EtlError::StorageError("bucket registry poisoned".to_string()))?;

        if let Some(storage) = opened.get(name) {
            return Ok(storage.clone());
        }

        let storage = match &self.config {
            Some(config) => ObjectStorage::new(config, name)?,
            None => ObjectStorage::in_memory(name),
        };
        opened.insert(name.to_string(), storage.clone());
        Ok(storage)
    }
}
