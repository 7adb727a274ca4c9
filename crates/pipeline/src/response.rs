//! Result reported back to the trigger.

use serde::{Deserialize, Serialize};

use hydro_common::EtlError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl RunResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status_code: 200,
            body: body.into(),
        }
    }

    pub fn from_error(err: &EtlError) -> Self {
        Self {
            status_code: err.status_code(),
            body: err.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let json = serde_json::to_string(&RunResponse::ok("done")).unwrap();
        assert_eq!(json, r#"{"statusCode":200,"body":"done"}"#);
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let response = RunResponse::from_error(&EtlError::artifact_not_found("b", "k.gpkg"));
        assert_eq!(response.status_code, 404);
        assert!(response.body.contains("s3://b/k.gpkg"));
        assert!(!response.is_success());
    }
}
