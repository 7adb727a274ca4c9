//! Per-process run context.
//!
//! Built once at startup and passed to each stage, so stages never reach for
//! globals or the environment themselves.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use hydro_common::EtlResult;
use publisher::FeatureHost;
use storage::{Buckets, ReferenceCache};

use crate::config::PipelineConfig;
use crate::extract::{DatasetLoader, NetCdfLoader};

const RUN_DIR_PREFIX: &str = "run-";

/// Hosting platform sign-in details.
#[derive(Clone, Default)]
pub struct HostCredentials {
    pub portal_url: Option<String>,
    pub username: Option<String>,
    password: Option<String>,
}

impl HostCredentials {
    pub fn new(portal_url: Option<String>, username: Option<String>, password: Option<String>) -> Self {
        Self {
            portal_url,
            username,
            password,
        }
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

impl fmt::Debug for HostCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCredentials")
            .field("portal_url", &self.portal_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

pub struct RunContext {
    pub config: PipelineConfig,
    pub buckets: Buckets,
    pub host: Arc<dyn FeatureHost>,
    pub credentials: HostCredentials,
    pub loader: Arc<dyn DatasetLoader>,
}

impl RunContext {
    pub fn new(
        config: PipelineConfig,
        buckets: Buckets,
        host: Arc<dyn FeatureHost>,
        credentials: HostCredentials,
    ) -> Self {
        Self {
            config,
            buckets,
            host,
            credentials,
            loader: Arc::new(NetCdfLoader),
        }
    }

    pub fn with_loader(mut self, loader: Arc<dyn DatasetLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.config.scratch_dir
    }

    /// Reference container cache; `event_bucket` is used when no reference
    /// bucket is configured.
    pub fn reference_cache(&self, event_bucket: &str) -> EtlResult<ReferenceCache> {
        let bucket = self
            .config
            .reference_bucket
            .as_deref()
            .unwrap_or(event_bucket);
        Ok(ReferenceCache::new(
            self.buckets.bucket(bucket)?,
            self.config.reference_key.clone(),
            self.scratch_dir(),
        ))
    }

    /// Create a fresh directory for this run's containers.
    ///
    /// Unless scratch files are retained, directories left by earlier runs
    /// are removed first. The cached reference container is kept.
    pub async fn start_run(&self) -> EtlResult<RunDir> {
        tokio::fs::create_dir_all(self.scratch_dir()).await?;

        if !self.config.retain_scratch {
            let mut entries = tokio::fs::read_dir(self.scratch_dir()).await?;
            while let Some(entry) = entries.next_entry().await? {
                let stale = entry.file_name().to_string_lossy().starts_with(RUN_DIR_PREFIX);
                if stale && entry.file_type().await?.is_dir() {
                    if let Err(e) = tokio::fs::remove_dir_all(entry.path()).await {
                        warn!(path = %entry.path().display(), error = %e, "Could not remove stale run directory");
                    }
                }
            }
        }

        let path = self
            .scratch_dir()
            .join(format!("{}{}", RUN_DIR_PREFIX, Uuid::new_v4().simple()));
        tokio::fs::create_dir_all(&path).await?;
        debug!(path = %path.display(), "Created run directory");

        Ok(RunDir {
            path,
            retain: self.config.retain_scratch,
        })
    }
}

/// Scratch directory for one run.
#[derive(Debug)]
pub struct RunDir {
    path: PathBuf,
    retain: bool,
}

impl RunDir {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a file inside the run directory. `name` may contain `/`.
    pub fn file(&self, name: &str) -> PathBuf {
        name.split('/')
            .filter(|part| !part.is_empty() && *part != "..")
            .fold(self.path.clone(), |path, part| path.join(part))
    }

    /// Remove the directory unless scratch files are retained.
    pub async fn finish(self) {
        if self.retain {
            info!(path = %self.path.display(), "Retaining run directory");
            return;
        }
        if let Err(e) = tokio::fs::remove_dir_all(&self.path).await {
            warn!(path = %self.path.display(), error = %e, "Could not remove run directory");
        }
    }
}
