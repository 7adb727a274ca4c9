//! Pipeline configuration.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use hydro_common::{EtlError, EtlResult};
use publisher::PollPolicy;
use storage::ObjectStorageConfig;

/// Top-level pipeline configuration.
///
/// Stage-specific settings are optional here and checked by the stage that
/// needs them, so one environment can drive both stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Object storage connection
    pub storage: ObjectStorageConfig,

    /// Bucket receiving published containers
    pub output_bucket: Option<String>,
    /// Threshold summary container (Stage 1 writes it; Stage 2 reads lookup
    /// and riverlines from it)
    pub output_key: Option<String>,
    /// Container holding the model table, read by Stage 2
    pub input_key: Option<String>,
    /// Where Stage 2 uploads the final container
    pub final_output_key: String,
    /// Stage 2 record of its last staging item
    pub temp_item_id_key: String,

    /// Reference container location; the bucket defaults to the event's bucket
    pub reference_bucket: Option<String>,
    pub reference_key: String,
    pub reference_layer: String,

    pub riverlines_layer: String,
    pub model_table: String,
    pub lookup_table: String,

    /// Hosting platform portal
    pub portal_url: Option<String>,
    pub portal_username: Option<String>,
    /// Name of the secret parameter holding the portal password
    pub password_parameter: Option<String>,
    pub hosted_layer_url: Option<String>,
    pub second_layer_url: Option<String>,

    /// Local working directory
    pub scratch_dir: PathBuf,
    /// Keep run containers after a run
    pub retain_scratch: bool,

    pub poll_attempts: u32,
    pub poll_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            storage: ObjectStorageConfig::default(),
            output_bucket: None,
            output_key: None,
            input_key: None,
            final_output_key: "geopackages/final_output.gpkg".to_string(),
            temp_item_id_key: "geopackages/last_temp_item_id.txt".to_string(),
            reference_bucket: None,
            reference_key: "REC1_Geopackage/a_gpkg.gpkg".to_string(),
            reference_layer: "rec1_Riverlines_SimplifyLine".to_string(),
            riverlines_layer: "riverlines".to_string(),
            model_table: "data".to_string(),
            lookup_table: "lookup".to_string(),
            portal_url: None,
            portal_username: None,
            password_parameter: None,
            hosted_layer_url: None,
            second_layer_url: None,
            scratch_dir: env::temp_dir().join("reach-publisher"),
            retain_scratch: false,
            poll_attempts: 30,
            poll_interval_secs: 10,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> EtlResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> EtlResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let storage = ObjectStorageConfig {
            endpoint: var("S3_ENDPOINT"),
            region: var("S3_REGION"),
            access_key_id: var("S3_ACCESS_KEY"),
            secret_access_key: var("S3_SECRET_KEY"),
            allow_http: var("S3_ALLOW_HTTP").map(|v| parse_flag(&v)).unwrap_or(false),
        };

        Ok(Self {
            storage,
            output_bucket: var("OUTPUT_S3_BUCKET"),
            output_key: var("OUTPUT_S3_KEY"),
            input_key: var("INPUT_S3_KEY"),
            final_output_key: var("FINAL_OUTPUT_KEY").unwrap_or(defaults.final_output_key),
            temp_item_id_key: var("TEMP_ITEM_ID_S3_KEY").unwrap_or(defaults.temp_item_id_key),
            reference_bucket: var("REFERENCE_S3_BUCKET"),
            reference_key: var("REFERENCE_S3_KEY").unwrap_or(defaults.reference_key),
            reference_layer: var("REFERENCE_LAYER").unwrap_or(defaults.reference_layer),
            riverlines_layer: var("RIVERLINES_LAYER").unwrap_or(defaults.riverlines_layer),
            model_table: var("MODEL_TABLE").unwrap_or(defaults.model_table),
            lookup_table: var("LOOKUP_TABLE").unwrap_or(defaults.lookup_table),
            portal_url: var("AGOURL"),
            portal_username: var("AGOUSERNAME"),
            password_parameter: var("AGOPASSWORD"),
            hosted_layer_url: var("HOSTED_FEATURE_LAYER_URL"),
            second_layer_url: var("SECOND_FEATURE_LAYER_URL"),
            scratch_dir: var("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.scratch_dir),
            retain_scratch: var("RETAIN_TEMP_GPKG")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            poll_attempts: parse_number(var("PUBLISH_POLL_ATTEMPTS"), "PUBLISH_POLL_ATTEMPTS")?
                .unwrap_or(defaults.poll_attempts),
            poll_interval_secs: parse_number(
                var("PUBLISH_POLL_INTERVAL_SECS"),
                "PUBLISH_POLL_INTERVAL_SECS",
            )?
            .unwrap_or(defaults.poll_interval_secs),
        })
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            attempts: self.poll_attempts,
            interval: Duration::from_secs(self.poll_interval_secs),
        }
    }

    pub fn output_bucket(&self) -> EtlResult<&str> {
        required(&self.output_bucket, "OUTPUT_S3_BUCKET")
    }

    pub fn output_key(&self) -> EtlResult<&str> {
        required(&self.output_key, "OUTPUT_S3_KEY")
    }

    pub fn input_key(&self) -> EtlResult<&str> {
        required(&self.input_key, "INPUT_S3_KEY")
    }

    pub fn hosted_layer_url(&self) -> EtlResult<&str> {
        required(&self.hosted_layer_url, "HOSTED_FEATURE_LAYER_URL")
    }

    pub fn second_layer_url(&self) -> EtlResult<&str> {
        required(&self.second_layer_url, "SECOND_FEATURE_LAYER_URL")
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> EtlResult<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| EtlError::ConfigError(format!("{} is not set", name)))
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

fn parse_number<T: std::str::FromStr>(value: Option<String>, name: &str) -> EtlResult<Option<T>> {
    value
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|_| EtlError::ConfigError(format!("{} must be a number, got '{}'", name, v)))
        })
        .transpose()
}
