//! Error types for reach-publisher services.

use thiserror::Error;

/// Result type alias using EtlError.
pub type EtlResult<T> = Result<T, EtlError>;

/// Primary error type for pipeline operations.
#[derive(Debug, Error)]
pub enum EtlError {
    // === Extraction Errors ===
    #[error("Missing required variable: {0}")]
    MissingVariable(String),

    #[error("Shape mismatch for '{variable}': {axis} axis has length {actual}, expected {expected}")]
    ShapeMismatch {
        variable: String,
        axis: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid time units: {0}")]
    InvalidTimeUnits(String),

    #[error("Failed to read dataset: {0}")]
    DatasetError(String),

    // === Relational Errors ===
    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Invalid join key: {0}")]
    InvalidJoinKey(String),

    #[error("Relational query failed: {0}")]
    QueryError(String),

    // === Container Errors ===
    #[error("Layer not found: {0}")]
    LayerNotFound(String),

    #[error("Table has no geometry column: {0}")]
    MissingGeometry(String),

    #[error("Invalid geometry blob: {0}")]
    InvalidGeometry(String),

    #[error("Container error: {0}")]
    ContainerError(String),

    // === Storage Errors ===
    #[error("Artifact not found: s3://{bucket}/{key}")]
    ArtifactNotFound { bucket: String, key: String },

    #[error("Storage error: {0}")]
    StorageError(String),

    // === Publishing Errors ===
    #[error("Publish failed: {0}")]
    PublishFailure(String),

    #[error("Cleanup failed: {0}")]
    CleanupFailure(String),

    // === Infrastructure Errors ===
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Secret retrieval failed: {0}")]
    SecretError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl EtlError {
    /// Status code reported back to the trigger for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            EtlError::ArtifactNotFound { .. } => 404,
            _ => 500,
        }
    }

    /// Whether this error aborts the run.
    ///
    /// Only stale-artifact cleanup is allowed to fail without stopping a run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, EtlError::CleanupFailure(_))
    }

    pub fn shape_mismatch(
        variable: impl Into<String>,
        axis: &'static str,
        expected: usize,
        actual: usize,
    ) -> Self {
        EtlError::ShapeMismatch {
            variable: variable.into(),
            axis,
            expected,
            actual,
        }
    }

    pub fn artifact_not_found(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        EtlError::ArtifactNotFound {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl From<serde_json::Error> for EtlError {
    fn from(err: serde_json::Error) -> Self {
        EtlError::StorageError(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(EtlError::artifact_not_found("bucket", "key.gpkg").status_code(), 404);
        assert_eq!(EtlError::MissingVariable("time".into()).status_code(), 500);
        assert_eq!(EtlError::PublishFailure("rejected".into()).status_code(), 500);
    }

    #[test]
    fn test_only_cleanup_is_non_fatal() {
        assert!(!EtlError::CleanupFailure("gone".into()).is_fatal());
        assert!(EtlError::InvalidJoinKey("".into()).is_fatal());
        assert!(EtlError::shape_mismatch("absoluteValues", "time", 4, 3).is_fatal());
    }

    #[test]
    fn test_shape_mismatch_message() {
        let err = EtlError::shape_mismatch("relative_thresholds_2yr", "reach", 3, 2);
        assert_eq!(
            err.to_string(),
            "Shape mismatch for 'relative_thresholds_2yr': reach axis has length 2, expected 3"
        );
    }
}
