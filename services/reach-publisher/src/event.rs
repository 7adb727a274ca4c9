//! Object-created notifications.

use percent_encoding::percent_decode_str;
use serde::Deserialize;

use hydro_common::{EtlError, EtlResult};

#[derive(Debug, Deserialize)]
struct Notification {
    #[serde(rename = "Records", default)]
    records: Vec<Record>,
}

#[derive(Debug, Deserialize)]
struct Record {
    s3: S3Entity,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    bucket: BucketEntity,
    object: ObjectEntity,
}

#[derive(Debug, Deserialize)]
struct BucketEntity {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ObjectEntity {
    key: String,
}

/// The object named by the first record of a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEvent {
    pub bucket: String,
    pub key: String,
}

impl ObjectEvent {
    /// Parse an S3 notification document. Keys arrive form-encoded.
    pub fn parse(json: &str) -> EtlResult<Self> {
        let notification: Notification = serde_json::from_str(json)
            .map_err(|e| EtlError::ConfigError(format!("Malformed event: {}", e)))?;

        let record = notification
            .records
            .into_iter()
            .next()
            .ok_or_else(|| EtlError::ConfigError("Event has no records".to_string()))?;

        Ok(Self {
            bucket: record.s3.bucket.name,
            key: decode_key(&record.s3.object.key)?,
        })
    }
}

fn decode_key(raw: &str) -> EtlResult<String> {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|key| key.into_owned())
        .map_err(|e| EtlError::ConfigError(format!("Invalid UTF-8 in object key '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::fixtures;

    #[test]
    fn test_parse_fixture_event() {
        let json = fixtures::s3_event_json("model-output", "runs/forecast.nc");
        let event = ObjectEvent::parse(&json).unwrap();
        assert_eq!(event.bucket, "model-output");
        assert_eq!(event.key, "runs/forecast.nc");
    }

    #[test]
    fn test_key_is_url_decoded() {
        let json = fixtures::s3_event_json("b", "runs/NZ+forecast%282024%29.nc");
        let event = ObjectEvent::parse(&json).unwrap();
        assert_eq!(event.key, "runs/NZ forecast(2024).nc");
    }

    #[test]
    fn test_missing_record() {
        let err = ObjectEvent::parse(r#"{"Records":[]}"#).unwrap_err();
        assert!(matches!(err, EtlError::ConfigError(m) if m.contains("no records")));

        let err = ObjectEvent::parse("{}").unwrap_err();
        assert!(matches!(err, EtlError::ConfigError(_)));
    }

    #[test]
    fn test_malformed_event() {
        assert!(matches!(
            ObjectEvent::parse("not json"),
            Err(EtlError::ConfigError(_))
        ));
    }
}
