//! GIS hosting platform interface.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;

use hydro_common::EtlResult;

/// Metadata for a new hosted item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSpec {
    pub title: String,
    pub item_type: String,
    pub tags: Vec<String>,
    pub description: String,
}

impl ItemSpec {
    /// A GeoPackage staged for loading into a hosted feature layer.
    pub fn geopackage(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            item_type: "GeoPackage".to_string(),
            tags: vec!["data upload".to_string(), "automation".to_string()],
            description: "Temporary GeoPackage file for updating a hosted feature layer."
                .to_string(),
        }
    }
}

/// An item living on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedItem {
    pub id: String,
    pub title: String,
}

/// Handle of an asynchronous layer load.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadJob(pub String);

impl fmt::Display for LoadJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed(String),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed(_))
    }
}

/// Operations the pipeline needs from the hosting platform.
///
/// Implementations report platform errors as `PublishFailure`.
#[async_trait]
pub trait FeatureHost: Send + Sync {
    /// Upload a file as a new item.
    async fn add_item(&self, spec: &ItemSpec, data: &Path) -> EtlResult<HostedItem>;

    /// Delete an item. `Ok(None)` when no such item exists.
    async fn delete_item(&self, id: &str) -> EtlResult<Option<HostedItem>>;

    /// Permanently remove recycle-bin entries whose title starts with
    /// `title_prefix`. Returns how many were removed.
    async fn purge_recycle_bin(&self, title_prefix: &str) -> EtlResult<usize>;

    /// Remove every feature from a layer. Returns the platform's success flag.
    async fn truncate_layer(&self, layer_url: &str) -> EtlResult<bool>;

    /// Start appending an item's features to a layer.
    async fn load_layer(&self, layer_url: &str, item_id: &str) -> EtlResult<LoadJob>;

    async fn job_status(&self, job: &LoadJob) -> EtlResult<JobStatus>;
}
