//! Loading published items into hosted feature layers.

use tracing::{info, instrument, warn};

use hydro_common::EtlResult;

use crate::host::{FeatureHost, JobStatus};
use crate::poll::{wait_for_load, PollPolicy};

/// How to refresh a layer from an item.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayerRefresh {
    /// Remove existing features before loading.
    pub truncate: bool,
    /// Wait for the load job; `None` returns as soon as it is started.
    pub poll: Option<PollPolicy>,
}

/// Append an item's features to a layer.
///
/// Returns the final job status when polling was requested.
#[instrument(skip(host, refresh), fields(truncate = refresh.truncate))]
pub async fn refresh_layer(
    host: &dyn FeatureHost,
    layer_url: &str,
    item_id: &str,
    refresh: LayerRefresh,
) -> EtlResult<Option<JobStatus>> {
    if refresh.truncate {
        let truncated = host.truncate_layer(layer_url).await?;
        if truncated {
            info!("Truncated layer");
        } else {
            warn!("Layer truncate reported failure");
        }
    }

    let job = host.load_layer(layer_url, item_id).await?;
    info!(job = %job, "Started layer load");

    match refresh.poll {
        Some(policy) => Ok(Some(wait_for_load(host, &job, policy).await?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{LayerLoad, MemoryFeatureHost};
    use std::time::Duration;

    #[tokio::test]
    async fn test_truncate_then_append() {
        let host = MemoryFeatureHost::new();
        host.seed_item("a", "t");

        let status = refresh_layer(
            &host,
            "https://host/layer/0",
            "a",
            LayerRefresh {
                truncate: true,
                poll: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(status, None);
        assert_eq!(host.truncations("https://host/layer/0"), 1);
        assert_eq!(
            host.layer_loads("https://host/layer/0"),
            vec![LayerLoad {
                item_id: "a".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_append_with_poll() {
        let host = MemoryFeatureHost::new().with_checks_before_complete(1);
        host.seed_item("a", "t");

        let status = refresh_layer(
            &host,
            "layer",
            "a",
            LayerRefresh {
                truncate: false,
                poll: Some(PollPolicy {
                    attempts: 3,
                    interval: Duration::ZERO,
                }),
            },
        )
        .await
        .unwrap();

        assert_eq!(status, Some(JobStatus::Completed));
        assert_eq!(host.truncations("layer"), 0);
    }
}
