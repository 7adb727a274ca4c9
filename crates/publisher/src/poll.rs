//! Bounded wait for asynchronous layer loads.

use std::time::Duration;

use tracing::{debug, info, warn};

use hydro_common::EtlResult;

use crate::host::{FeatureHost, JobStatus, LoadJob};

/// How long to wait for a load job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            attempts: 30,
            interval: Duration::from_secs(10),
        }
    }
}

/// Check the job up to `policy.attempts` times, sleeping between checks.
///
/// Returns the last status seen. Running out of attempts, or a failed job,
/// is logged and handed back to the caller rather than raised.
pub async fn wait_for_load(
    host: &dyn FeatureHost,
    job: &LoadJob,
    policy: PollPolicy,
) -> EtlResult<JobStatus> {
    let mut status = JobStatus::Pending;

    for attempt in 1..=policy.attempts {
        status = host.job_status(job).await?;
        debug!(job = %job, attempt = attempt, status = ?status, "Load status");

        match &status {
            JobStatus::Completed => {
                info!(job = %job, attempts = attempt, "Layer load completed");
                return Ok(status);
            }
            JobStatus::Failed(reason) => {
                warn!(job = %job, reason = %reason, "Layer load failed");
                return Ok(status);
            }
            _ => {}
        }

        if attempt < policy.attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    warn!(
        job = %job,
        attempts = policy.attempts,
        status = ?status,
        "Layer load did not complete in time"
    );
    Ok(status)
}
