//! In-process feature host.
//!
//! Keeps items, a recycle bin, and per-layer load history in memory. Load
//! jobs report `Processing` for a configurable number of status checks
//! before completing.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use hydro_common::{EtlError, EtlResult};

use crate::host::{FeatureHost, HostedItem, ItemSpec, JobStatus, LoadJob};

/// One load into a layer, as the host saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerLoad {
    pub item_id: String,
}

#[derive(Debug, Default)]
struct LayerState {
    truncations: usize,
    loads: Vec<LayerLoad>,
}

#[derive(Debug)]
struct JobState {
    checks_remaining: u32,
    outcome: JobStatus,
}

#[derive(Debug, Default)]
struct HostState {
    items: BTreeMap<String, HostedItem>,
    recycle_bin: Vec<HostedItem>,
    layers: HashMap<String, LayerState>,
    jobs: HashMap<LoadJob, JobState>,
    fail_deletes: bool,
    fail_loads: Option<String>,
}

#[derive(Debug, Default)]
pub struct MemoryFeatureHost {
    state: Mutex<HostState>,
    checks_before_complete: u32,
}

impl MemoryFeatureHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load jobs stay `Processing` for `checks` status calls.
    pub fn with_checks_before_complete(mut self, checks: u32) -> Self {
        self.checks_before_complete = checks;
        self
    }

    /// Make every delete and purge fail.
    pub fn fail_deletes(&self, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_deletes = fail;
        }
    }

    /// Make every subsequent load job finish as `Failed(reason)`.
    pub fn fail_loads(&self, reason: Option<&str>) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_loads = reason.map(str::to_string);
        }
    }

    /// Put an item on the host directly, as if uploaded by an earlier run.
    pub fn seed_item(&self, id: &str, title: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.items.insert(
                id.to_string(),
                HostedItem {
                    id: id.to_string(),
                    title: title.to_string(),
                },
            );
        }
    }

    pub fn live_items(&self) -> Vec<HostedItem> {
        self.state
            .lock()
            .map(|s| s.items.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn recycle_bin(&self) -> Vec<HostedItem> {
        self.state
            .lock()
            .map(|s| s.recycle_bin.clone())
            .unwrap_or_default()
    }

    pub fn layer_loads(&self, layer_url: &str) -> Vec<LayerLoad> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.layers.get(layer_url).map(|l| l.loads.clone()))
            .unwrap_or_default()
    }

    pub fn truncations(&self, layer_url: &str) -> usize {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.layers.get(layer_url).map(|l| l.truncations))
            .unwrap_or(0)
    }

    fn lock(&self) -> EtlResult<MutexGuard<'_, HostState>> {
        self.state
            .lock()
            .map_err(|_| EtlError::PublishFailure("feature host state poisoned".to_string()))
    }
}

#[async_trait]
impl FeatureHost for MemoryFeatureHost {
    async fn add_item(&self, spec: &ItemSpec, data: &Path) -> EtlResult<HostedItem> {
        if !tokio::fs::try_exists(data).await? {
            return Err(EtlError::PublishFailure(format!(
                "Upload source missing: {}",
                data.display()
            )));
        }

        let item = HostedItem {
            id: Uuid::new_v4().simple().to_string(),
            title: spec.title.clone(),
        };
        debug!(id = %item.id, title = %item.title, "Added item");
        self.lock()?.items.insert(item.id.clone(), item.clone());
        Ok(item)
    }

    async fn delete_item(&self, id: &str) -> EtlResult<Option<HostedItem>> {
        let mut state = self.lock()?;
        if state.fail_deletes {
            return Err(EtlError::PublishFailure(format!("Delete of {} rejected", id)));
        }

        let removed = state.items.remove(id);
        if let Some(item) = &removed {
            state.recycle_bin.push(item.clone());
        }
        Ok(removed)
    }

    async fn purge_recycle_bin(&self, title_prefix: &str) -> EtlResult<usize> {
        let mut state = self.lock()?;
        if state.fail_deletes {
            return Err(EtlError::PublishFailure("Recycle bin purge rejected".to_string()));
        }

        let before = state.recycle_bin.len();
        state
            .recycle_bin
            .retain(|item| !item.title.starts_with(title_prefix));
        Ok(before - state.recycle_bin.len())
    }

    async fn truncate_layer(&self, layer_url: &str) -> EtlResult<bool> {
        let mut state = self.lock()?;
        state.layers.entry(layer_url.to_string()).or_default().truncations += 1;
        Ok(true)
    }

    async fn load_layer(&self, layer_url: &str, item_id: &str) -> EtlResult<LoadJob> {
        let mut state = self.lock()?;
        if !state.items.contains_key(item_id) {
            return Err(EtlError::PublishFailure(format!("Unknown item {}", item_id)));
        }

        state
            .layers
            .entry(layer_url.to_string())
            .or_default()
            .loads
            .push(LayerLoad {
                item_id: item_id.to_string(),
            });

        let outcome = match &state.fail_loads {
            Some(reason) => JobStatus::Failed(reason.clone()),
            None => JobStatus::Completed,
        };
        let job = LoadJob(Uuid::new_v4().simple().to_string());
        state.jobs.insert(
            job.clone(),
            JobState {
                checks_remaining: self.checks_before_complete,
                outcome,
            },
        );
        Ok(job)
    }

    async fn job_status(&self, job: &LoadJob) -> EtlResult<JobStatus> {
        let mut state = self.lock()?;
        let entry = state
            .jobs
            .get_mut(job)
            .ok_or_else(|| EtlError::PublishFailure(format!("Unknown job {}", job)))?;

        if entry.checks_remaining > 0 {
            entry.checks_remaining -= 1;
            return Ok(JobStatus::Processing);
        }
        Ok(entry.outcome.clone())
    }
}
