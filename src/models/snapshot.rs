// Point-in-time host readings, as produced by the sampler

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CollectionError;

/// Host identity reported alongside every reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub hostname: String,
    pub ip_address: String,
    pub os: String,
    pub platform: String,
    pub processor: String,
    pub machine: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuSample {
    pub usage_percent: f64,
    pub core_count: u32,
    /// None when the platform does not expose a clock frequency.
    pub frequency_mhz: Option<f64>,
    pub per_core: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySample {
    pub total: u64,
    pub used: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskSample {
    pub total: u64,
    pub used: u64,
    pub percent: f64,
}

/// Cumulative OS interface counters, summed over all interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub errin: u64,
    pub errout: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Set by the sampler; `MetricBuffer::add_snapshot` stamps it when missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collected_at: Option<DateTime<Utc>>,
    pub system_info: SystemInfo,
    pub cpu: CpuSample,
    pub memory: MemorySample,
    pub disk: DiskSample,
    pub network: NetworkCounters,
}

impl Snapshot {
    /// Rejects readings the buffer must never hold: non-finite or out-of-range
    /// percentages, zero cores, used > total.
    pub fn validate(&self) -> Result<(), CollectionError> {
        check_percent("cpu.usage_percent", self.cpu.usage_percent)?;
        for (i, p) in self.cpu.per_core.iter().enumerate() {
            check_percent(&format!("cpu.per_core[{}]", i), *p)?;
        }
        check_percent("memory.percent", self.memory.percent)?;
        check_percent("disk.percent", self.disk.percent)?;
        if self.cpu.core_count == 0 {
            return Err(CollectionError::Unavailable {
                subsystem: "cpu",
                reason: "core count is zero".into(),
            });
        }
        if self.memory.used > self.memory.total {
            return Err(CollectionError::Inconsistent {
                subsystem: "memory",
                used: self.memory.used,
                total: self.memory.total,
            });
        }
        if self.disk.used > self.disk.total {
            return Err(CollectionError::Inconsistent {
                subsystem: "disk",
                used: self.disk.used,
                total: self.disk.total,
            });
        }
        Ok(())
    }
}

fn check_percent(field: &str, value: f64) -> Result<(), CollectionError> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(CollectionError::OutOfRange {
            field: field.to_string(),
            value,
        })
    }
}
