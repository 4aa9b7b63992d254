// Aggregated payload: one per flush window, POSTed as JSON to the collector.
// Field names are the collector's wire names.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::SystemInfo;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    /// When the window was drained (UTC, RFC 3339). Offset-less ISO stamps read as UTC.
    #[serde(deserialize_with = "utc_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub system_info: SystemInfo,
    pub metrics: AggregateMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub cpu: CpuAggregate,
    pub memory: MemoryAggregate,
    pub disk: DiskAggregate,
    pub network: NetworkAggregate,
}

/// Latest reading plus min/max/sample std-dev of usage across the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuAggregate {
    pub usage_percent: f64,
    pub core_count: u32,
    pub frequency_mhz: Option<f64>,
    pub per_core: Vec<f64>,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryAggregate {
    pub total: u64,
    pub used: u64,
    pub percent: f64,
    pub used_avg: f64,
    pub percent_avg: f64,
    pub peak_usage: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskAggregate {
    pub total: u64,
    pub used: u64,
    pub percent: f64,
    pub used_avg: f64,
    pub percent_avg: f64,
}

/// Raw fields and `*_total` fields both carry the last snapshot's cumulative counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkAggregate {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub errin: u64,
    pub errout: u64,
    pub bytes_sent_total: u64,
    pub bytes_recv_total: u64,
    pub packets_sent_total: u64,
    pub packets_recv_total: u64,
    pub errors_in_total: u64,
    pub errors_out_total: u64,
    /// Bytes/sec over the window; omitted when the window spans no time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_rate_send: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_rate_recv: Option<f64>,
}

/// RFC 3339, or a naive `YYYY-MM-DDTHH:MM:SS[.f]` taken as UTC (older spool records).
fn utc_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}
