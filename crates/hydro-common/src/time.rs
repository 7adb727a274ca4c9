//! Time handling for CF-convention time coordinates.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{EtlError, EtlResult};

/// Parsed CF `units` attribute, e.g. `hours since 1970-01-01 00:00:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CfTimeUnits {
    /// Length of one unit in milliseconds.
    pub unit_millis: i64,
    /// Reference epoch.
    pub epoch: DateTime<Utc>,
}

impl CfTimeUnits {
    pub fn parse(units: &str) -> EtlResult<Self> {
        let trimmed = units.trim();
        let (unit, epoch) = trimmed
            .split_once(" since ")
            .ok_or_else(|| EtlError::InvalidTimeUnits(trimmed.to_string()))?;

        let unit_millis = match unit.trim().to_lowercase().as_str() {
            "seconds" | "second" | "secs" | "sec" | "s" => 1_000,
            "minutes" | "minute" | "mins" | "min" => 60_000,
            "hours" | "hour" | "hrs" | "hr" | "h" => 3_600_000,
            "days" | "day" | "d" => 86_400_000,
            _ => return Err(EtlError::InvalidTimeUnits(trimmed.to_string())),
        };

        let epoch_str = epoch
            .trim()
            .trim_end_matches("UTC")
            .trim_end_matches('Z')
            .trim();
        let epoch = parse_timestamp(epoch_str)
            .ok_or_else(|| EtlError::InvalidTimeUnits(trimmed.to_string()))?;

        Ok(Self { unit_millis, epoch })
    }

    /// Convert one encoded value to a timestamp.
    pub fn decode(&self, value: f64) -> EtlResult<DateTime<Utc>> {
        if !value.is_finite() {
            return Err(EtlError::InvalidTimeUnits(format!(
                "non-finite time value {}",
                value
            )));
        }
        let out_of_range = || {
            EtlError::InvalidTimeUnits(format!("time value {} is out of range", value))
        };

        // `i64::MAX as f64` rounds up to 2^63, so the upper bound is exclusive.
        let millis = (value * self.unit_millis as f64).round();
        if millis < i64::MIN as f64 || millis >= i64::MAX as f64 {
            return Err(out_of_range());
        }
        let offset = Duration::try_milliseconds(millis as i64).ok_or_else(out_of_range)?;
        self.epoch.checked_add_signed(offset).ok_or_else(out_of_range)
    }
}

/// Decode a whole time coordinate with its `units` attribute.
pub fn decode_cf_times(values: &[f64], units: &str) -> EtlResult<Vec<DateTime<Utc>>> {
    let units = CfTimeUnits::parse(units)?;
    values.iter().map(|v| units.decode(*v)).collect()
}

/// Parse a timestamp string leniently; `None` when nothing matches.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]`, `YYYY-MM-DDTHH:MM:SS[.fff]`
/// and a bare date (midnight UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| Utc.from_utc_datetime(&ndt))
}
