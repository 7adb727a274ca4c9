//! Invocation handling: one trigger in, one response out.

use std::path::Path;

use tokio::io::AsyncReadExt;
use tracing::{error, info, instrument};

use hydro_common::EtlResult;
use pipeline::{run_stage_one, run_stage_two, RunContext, RunResponse};

use crate::event::ObjectEvent;

/// What started this invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// A model output file was created.
    StageOne(ObjectEvent),
    /// The threshold summary was published.
    StageTwo,
}

/// Read an event document from a file, or stdin for `-`.
pub async fn read_event(source: &str) -> EtlResult<String> {
    if source == "-" {
        let mut raw = String::new();
        tokio::io::stdin().read_to_string(&mut raw).await?;
        return Ok(raw);
    }
    Ok(tokio::fs::read_to_string(Path::new(source)).await?)
}

/// Run the stage for `trigger`, folding any error into the response.
#[instrument(skip(ctx))]
pub async fn handle(ctx: &RunContext, trigger: Trigger) -> RunResponse {
    let result = match &trigger {
        Trigger::StageOne(event) => run_stage_one(ctx, &event.bucket, &event.key).await,
        Trigger::StageTwo => run_stage_two(ctx).await,
    };

    match result {
        Ok(response) => {
            info!(status = response.status_code, "Run succeeded");
            response
        }
        Err(e) => {
            error!(error = %e, status = e.status_code(), "Run failed");
            RunResponse::from_error(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use pipeline::{HostCredentials, PipelineConfig};
    use publisher::MemoryFeatureHost;
    use storage::Buckets;
    use test_utils::{fixtures, temp_test_dir};

    fn context(scratch: &Path) -> RunContext {
        let config = PipelineConfig {
            output_bucket: Some(fixtures::storage::OUTPUT_BUCKET.to_string()),
            output_key: Some(fixtures::storage::OUTPUT_KEY.to_string()),
            input_key: Some("geopackages/model.gpkg".to_string()),
            hosted_layer_url: Some("https://host.example/a/FeatureServer/0".to_string()),
            second_layer_url: Some("https://host.example/b/FeatureServer/0".to_string()),
            scratch_dir: scratch.to_path_buf(),
            ..PipelineConfig::default()
        };
        RunContext::new(
            config,
            Buckets::in_memory(),
            Arc::new(MemoryFeatureHost::new()),
            HostCredentials::default(),
        )
    }

    #[tokio::test]
    async fn test_missing_input_object_is_404() {
        let scratch = temp_test_dir();
        let ctx = context(scratch.path());
        let trigger = Trigger::StageOne(ObjectEvent {
            bucket: fixtures::storage::INPUT_BUCKET.to_string(),
            key: fixtures::storage::INPUT_KEY.to_string(),
        });

        let response = handle(&ctx, trigger).await;
        assert_eq!(response.status_code, 404);
        assert!(response.body.contains(fixtures::storage::INPUT_KEY));
    }

    #[tokio::test]
    async fn test_stage_two_missing_config_is_500() {
        let scratch = temp_test_dir();
        let mut ctx = context(scratch.path());
        ctx.config.hosted_layer_url = None;

        let response = handle(&ctx, Trigger::StageTwo).await;
        assert_eq!(response.status_code, 500);
        assert!(response.body.contains("HOSTED_FEATURE_LAYER_URL"));
    }

    #[tokio::test]
    async fn test_read_event_from_file() {
        let dir = temp_test_dir();
        let path = dir.path().join("event.json");
        let json = fixtures::s3_event_json("b", "k.nc");
        std::fs::write(&path, &json).unwrap();

        let raw = read_event(path.to_str().unwrap()).await.unwrap();
        assert_eq!(ObjectEvent::parse(&raw).unwrap().key, "k.nc");
    }
}
