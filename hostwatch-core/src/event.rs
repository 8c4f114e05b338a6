use crate::error::{HostwatchError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed-width UTC encoding used for the `timestamp` column. Lexicographic
/// order of encoded values matches chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Ok,
    Warn,
    Critical,
}

impl Status {
    pub const ALL: [Status; 3] = [Status::Ok, Status::Warn, Status::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Warn => "WARN",
            Status::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = HostwatchError;

    fn from_str(s: &str) -> Result<Self> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| HostwatchError::InvalidArgument(format!("unknown status '{}'", s)))
    }
}

impl ToSql for Status {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Status {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse().map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Severity bands for one producer. Values below `warn_at` are OK; with a
/// `critical_at` bound, values at or above it are CRITICAL; anything else is
/// WARN. Both bounds are inclusive lower bounds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ThresholdPolicy {
    pub warn_at: f64,
    pub critical_at: Option<f64>,
}

impl ThresholdPolicy {
    pub const fn two_tier(warn_at: f64) -> Self {
        Self {
            warn_at,
            critical_at: None,
        }
    }

    pub const fn three_tier(warn_at: f64, critical_at: f64) -> Self {
        Self {
            warn_at,
            critical_at: Some(critical_at),
        }
    }

    pub fn classify(&self, value: f64) -> Status {
        if value < self.warn_at {
            return Status::Ok;
        }

        match self.critical_at {
            Some(critical_at) if value >= critical_at => Status::Critical,
            _ => Status::Warn,
        }
    }
}

/// A persisted row of the event log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub hostname: String,
    pub metric: String,
    pub value: f64,
    pub status: Status,
}

/// An event before the store has assigned it an id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewEvent {
    pub timestamp: DateTime<Utc>,
    pub hostname: String,
    pub metric: String,
    pub value: f64,
    pub status: Status,
}

impl NewEvent {
    pub fn new(
        timestamp: DateTime<Utc>,
        hostname: &str,
        metric: impl Into<String>,
        value: f64,
        status: Status,
    ) -> Self {
        Self {
            timestamp,
            hostname: hostname.to_string(),
            metric: metric.into(),
            value,
            status,
        }
    }
}

pub fn encode_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

pub fn decode_timestamp(text: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.fZ")
        .map(|naive| naive.and_utc())
        .map_err(|e| HostwatchError::Storage(format!("bad timestamp '{}': {}", text, e)))
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn two_tier_boundary_is_warn() {
        let policy = ThresholdPolicy::two_tier(80.0);
        assert_eq!(policy.classify(0.0), Status::Ok);
        assert_eq!(policy.classify(79.99), Status::Ok);
        assert_eq!(policy.classify(80.0), Status::Warn);
        assert_eq!(policy.classify(100.0), Status::Warn);
    }

    #[test]
    fn three_tier_boundaries_are_inclusive() {
        let policy = ThresholdPolicy::three_tier(80.0, 90.0);
        assert_eq!(policy.classify(79.99), Status::Ok);
        assert_eq!(policy.classify(80.0), Status::Warn);
        assert_eq!(policy.classify(89.99), Status::Warn);
        assert_eq!(policy.classify(90.0), Status::Critical);
        assert_eq!(policy.classify(100.0), Status::Critical);
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("critical".parse::<Status>().unwrap(), Status::Critical);
        assert_eq!("WARN".parse::<Status>().unwrap(), Status::Warn);
        assert!(matches!(
            "bad".parse::<Status>(),
            Err(HostwatchError::InvalidArgument(_))
        ));
    }

    #[test]
    fn status_serializes_as_wire_literal() {
        assert_eq!(serde_json::to_string(&Status::Ok).unwrap(), "\"OK\"");
        assert_eq!(serde_json::to_string(&Status::Critical).unwrap(), "\"CRITICAL\"");
    }

    #[test]
    fn timestamp_encoding_is_fixed_width_and_ordered() {
        let early = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let late = early + chrono::Duration::microseconds(1);

        let a = encode_timestamp(&early);
        let b = encode_timestamp(&late);
        assert_eq!(a, "2024-01-02T03:04:05.000000Z");
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(decode_timestamp(&b).unwrap(), late);
    }

    #[test]
    fn round2_keeps_two_decimals() {
        assert_eq!(round2(85.456), 85.46);
        assert_eq!(round2(12.0), 12.0);
    }
}
