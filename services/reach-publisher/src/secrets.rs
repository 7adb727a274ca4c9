//! Secret retrieval for hosting platform credentials.

use async_trait::async_trait;
use clap::ValueEnum;
use tracing::{debug, info, warn};

use hydro_common::{EtlError, EtlResult};
use pipeline::{HostCredentials, PipelineConfig};

/// Where secret parameters are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SecretBackend {
    /// AWS Systems Manager parameters, decrypted.
    Ssm,
    /// Environment variables named like the parameter.
    Env,
}

#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn get_secret(&self, name: &str) -> EtlResult<String>;
}

/// SSM parameter store client.
pub struct SsmSecrets {
    client: aws_sdk_ssm::Client,
}

impl SsmSecrets {
    pub async fn from_env() -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        Self {
            client: aws_sdk_ssm::Client::new(&config),
        }
    }
}

#[async_trait]
impl SecretSource for SsmSecrets {
    async fn get_secret(&self, name: &str) -> EtlResult<String> {
        let output = self
            .client
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await
            .map_err(|e| EtlError::SecretError(format!("{}: {}", name, e)))?;

        output
            .parameter()
            .and_then(|p| p.value())
            .map(str::to_string)
            .ok_or_else(|| EtlError::SecretError(format!("{}: parameter has no value", name)))
    }
}

/// Reads secrets from the process environment (or any lookup function).
pub struct EnvSecrets<F = fn(&str) -> Option<String>> {
    lookup: F,
}

impl EnvSecrets {
    pub fn new() -> Self {
        Self {
            lookup: |name| std::env::var(name).ok(),
        }
    }
}

impl<F> EnvSecrets<F>
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    pub fn with_lookup(lookup: F) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl<F> SecretSource for EnvSecrets<F>
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    async fn get_secret(&self, name: &str) -> EtlResult<String> {
        (self.lookup)(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| EtlError::SecretError(format!("{} is not set", name)))
    }
}

pub async fn source(backend: SecretBackend) -> Box<dyn SecretSource> {
    match backend {
        SecretBackend::Ssm => Box::new(SsmSecrets::from_env().await),
        SecretBackend::Env => Box::new(EnvSecrets::new()),
    }
}

/// Resolve portal credentials once for the run context.
///
/// Without a configured password parameter the credentials carry no password.
pub async fn resolve_credentials(
    config: &PipelineConfig,
    secrets: &dyn SecretSource,
) -> EtlResult<HostCredentials> {
    let password = match &config.password_parameter {
        Some(parameter) => {
            debug!(parameter = %parameter, "Fetching portal password");
            Some(secrets.get_secret(parameter).await?)
        }
        None => {
            warn!("No password parameter configured, continuing without portal password");
            None
        }
    };

    let credentials = HostCredentials::new(
        config.portal_url.clone(),
        config.portal_username.clone(),
        password,
    );
    info!(
        portal = ?credentials.portal_url,
        username = ?credentials.username,
        "Resolved portal credentials"
    );
    Ok(credentials)
}
