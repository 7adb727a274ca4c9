//! Common test fixtures for reach-publisher tests.

/// Time coordinate fixtures.
pub mod time {
    /// CF units paired with [`create_hourly_offsets`](crate::create_hourly_offsets).
    pub const HOURLY_UNITS: &str = "hours since 2024-01-15 00:00:00";

    /// The instant `HOURLY_UNITS` counts from.
    pub const REFERENCE_TIME: &str = "2024-01-15T00:00:00Z";
}

/// Layer and table names used across stages.
pub mod layers {
    pub const RIVERLINES: &str = "riverlines";
    pub const REFERENCE: &str = "rec1_Riverlines_SimplifyLine";
    pub const MODEL: &str = "data";
    pub const LOOKUP: &str = "lookup";
}

/// Object-store locations.
pub mod storage {
    pub const INPUT_BUCKET: &str = "model-output";
    pub const INPUT_KEY: &str = "runs/forecast.nc";
    pub const OUTPUT_BUCKET: &str = "published";
    pub const OUTPUT_KEY: &str = "geopackages/threshold_summary.gpkg";
    pub const REFERENCE_BUCKET: &str = "reference";
    pub const REFERENCE_KEY: &str = "riverlines.gpkg";
}

/// No-data markers used by the model.
pub const SENTINELS: [f64; 3] = [-888.0, 888.0, 999.0];

/// A minimal S3 put notification for `bucket`/`key`.
pub fn s3_event_json(bucket: &str, key: &str) -> String {
    format!(
        r#"{{"Records":[{{"eventName":"ObjectCreated:Put","s3":{{"bucket":{{"name":"{}"}},"object":{{"key":"{}"}}}}}}]}}"#,
        bucket, key
    )
}
