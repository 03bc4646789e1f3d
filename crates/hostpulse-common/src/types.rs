use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single metric value bound to the host it is posted for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub host_id: String,
    pub name: String,
    /// Epoch seconds of the snapshot the value was collected in.
    pub time: i64,
    pub value: f64,
}

/// A bundle of samples waiting in the post queue.
///
/// `retry_count` starts at zero and grows by exactly one for every failed
/// delivery attempt that included this batch.
///
/// # Examples
///
/// ```
/// use hostpulse_common::types::PostBatch;
///
/// let mut batch = PostBatch::new(Vec::new());
/// assert_eq!(batch.retry_count, 0);
/// assert_eq!(batch.record_failure(), 1);
/// assert!(batch.is_exhausted(0));
/// assert!(!batch.is_exhausted(1));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostBatch {
    pub values: Vec<MetricSample>,
    pub retry_count: u32,
}

impl PostBatch {
    pub fn new(values: Vec<MetricSample>) -> Self {
        Self {
            values,
            retry_count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Counts one more failed delivery and returns the new count.
    pub fn record_failure(&mut self) -> u32 {
        self.retry_count += 1;
        self.retry_count
    }

    /// A batch is abandoned once its retry count exceeds `retry_max`.
    pub fn is_exhausted(&self, retry_max: u32) -> bool {
        self.retry_count > retry_max
    }
}

/// One group of values produced by a single generator.
///
/// Values declaring a `custom_identifier` belong to the host registered
/// under that identifier instead of the agent's own host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueSet {
    pub custom_identifier: Option<String>,
    pub values: HashMap<String, f64>,
}

/// Everything collected in one metrics tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub created: DateTime<Utc>,
    pub values: Vec<ValueSet>,
}

/// Health-check status, as understood by the monitoring service.
///
/// `Undefined` is never reported; it is the initial state a checker
/// remembers before its first successful run.
///
/// # Examples
///
/// ```
/// use hostpulse_common::types::CheckStatus;
///
/// let status: CheckStatus = "warning".parse().unwrap();
/// assert_eq!(status, CheckStatus::Warning);
/// assert_eq!(status.to_string(), "WARNING");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Ok,
    Warning,
    Critical,
    Unknown,
    Undefined,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckStatus::Ok => write!(f, "OK"),
            CheckStatus::Warning => write!(f, "WARNING"),
            CheckStatus::Critical => write!(f, "CRITICAL"),
            CheckStatus::Unknown => write!(f, "UNKNOWN"),
            CheckStatus::Undefined => write!(f, "UNDEFINED"),
        }
    }
}

impl std::str::FromStr for CheckStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OK" => Ok(CheckStatus::Ok),
            "WARNING" => Ok(CheckStatus::Warning),
            "CRITICAL" => Ok(CheckStatus::Critical),
            "UNKNOWN" => Ok(CheckStatus::Unknown),
            "UNDEFINED" => Ok(CheckStatus::Undefined),
            _ => Err(format!("unknown check status: {s}")),
        }
    }
}

/// Result of one invocation of a health check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub occurred_at: DateTime<Utc>,
}

impl CheckReport {
    pub fn new(name: impl Into<String>, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }
}

/// A host record as known by the monitoring service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub custom_identifier: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetInterface {
    pub name: String,
    pub mac_address: Option<String>,
    #[serde(default)]
    pub ipv4_addresses: Vec<String>,
    #[serde(default)]
    pub ipv6_addresses: Vec<String>,
}

/// Descriptive host metadata sent on registration and on every refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostSpec {
    pub name: String,
    pub meta: serde_json::Value,
    pub interfaces: Vec<NetInterface>,
    pub role_fullnames: Vec<String>,
    pub checks: Vec<String>,
    pub display_name: Option<String>,
    pub custom_identifier: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_is_exhausted_only_past_retry_max() {
        let mut batch = PostBatch::new(vec![MetricSample {
            host_id: "h1".into(),
            name: "loadavg1".into(),
            time: 1_700_000_000,
            value: 0.5,
        }]);
        for expected in 1..=3 {
            assert_eq!(batch.record_failure(), expected);
            assert!(!batch.is_exhausted(3));
        }
        batch.record_failure();
        assert!(batch.is_exhausted(3));
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn sample_serializes_with_wire_field_names() {
        let sample = MetricSample {
            host_id: "h1".into(),
            name: "memory.used".into(),
            time: 42,
            value: 1024.0,
        };
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["hostId"], "h1");
        assert_eq!(json["time"], 42);
    }

    #[test]
    fn report_serializes_status_and_epoch() {
        let report = CheckReport::new("disk", CheckStatus::Critical, "full");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "CRITICAL");
        assert_eq!(json["occurredAt"], report.occurred_at.timestamp());
    }

    #[test]
    fn status_rejects_unknown_names() {
        assert!("bogus".parse::<CheckStatus>().is_err());
        assert_eq!("ok".parse::<CheckStatus>().unwrap(), CheckStatus::Ok);
    }
}
