// Host metric sampling via sysinfo

mod linux;

use crate::error::CollectionError;
use crate::models::{CpuSample, DiskSample, MemorySample, NetworkCounters, Snapshot, SystemInfo};
use chrono::Utc;
use std::future::Future;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::{Disks, Networks, System};
use tracing::instrument;

/// Source of host snapshots. `collect` either returns a fully populated snapshot or fails.
pub trait Sampler: Send + Sync {
    fn collect(&self) -> impl Future<Output = Result<Snapshot, CollectionError>> + Send;
}

struct SamplerState {
    sys: System,
    disks: Disks,
    networks: Networks,
    last_cpu_refresh: Instant,
}

pub struct SysinfoSampler {
    state: Arc<std::sync::Mutex<SamplerState>>,
    identity: SystemInfo,
    timeout: Duration,
}

impl SysinfoSampler {
    /// `timeout` bounds one `collect` call; the scheduler passes its collection interval.
    pub fn new(timeout: Duration) -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_all();
        sys.refresh_memory();
        let disks = Disks::new_with_refreshed_list();
        let networks = Networks::new_with_refreshed_list();
        let identity = read_identity(&sys);
        Self {
            state: Arc::new(std::sync::Mutex::new(SamplerState {
                sys,
                disks,
                networks,
                last_cpu_refresh: Instant::now(),
            })),
            identity,
            timeout,
        }
    }

    pub fn identity(&self) -> &SystemInfo {
        &self.identity
    }
}

impl Sampler for SysinfoSampler {
    #[instrument(skip(self), fields(sampler = "sysinfo", operation = "collect"))]
    async fn collect(&self) -> Result<Snapshot, CollectionError> {
        let state = self.state.clone();
        let identity = self.identity.clone();
        let task = tokio::task::spawn_blocking(move || {
            let mut state = state
                .lock()
                .map_err(|e| CollectionError::Task(format!("sysinfo lock poisoned: {}", e)))?;
            state.read(identity)
        });
        let snapshot = tokio::time::timeout(self.timeout, task)
            .await
            .map_err(|_| CollectionError::Timeout(self.timeout))?
            .map_err(|e| CollectionError::Task(format!("sysinfo task join: {}", e)))??;
        snapshot.validate()?;
        Ok(snapshot)
    }
}

impl SamplerState {
    fn read(&mut self, identity: SystemInfo) -> Result<Snapshot, CollectionError> {
        // Usage is computed from the delta between two refreshes; too short a gap reads as 0.
        let since = self.last_cpu_refresh.elapsed();
        if since < sysinfo::MINIMUM_CPU_UPDATE_INTERVAL {
            std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL - since);
        }
        self.sys.refresh_cpu_all();
        self.last_cpu_refresh = Instant::now();
        self.sys.refresh_memory();
        self.disks.refresh(false);
        self.networks.refresh(true);

        let cpu = self.read_cpu()?;
        let memory = self.read_memory()?;
        let disk = self.read_disk()?;
        let network = self.read_network();

        Ok(Snapshot {
            collected_at: Some(Utc::now()),
            system_info: SystemInfo {
                ip_address: primary_ipv4(&self.networks),
                ..identity
            },
            cpu,
            memory,
            disk,
            network,
        })
    }

    fn read_cpu(&self) -> Result<CpuSample, CollectionError> {
        let cpus = self.sys.cpus();
        if cpus.is_empty() {
            return Err(CollectionError::Unavailable {
                subsystem: "cpu",
                reason: "no CPUs reported".into(),
            });
        }
        let per_core: Vec<f64> = cpus
            .iter()
            .map(|c| (c.cpu_usage() as f64).clamp(0.0, 100.0))
            .collect();
        let frequency_mhz = cpus
            .first()
            .map(|c| c.frequency())
            .filter(|f| *f > 0)
            .map(|f| f as f64);
        Ok(CpuSample {
            usage_percent: (self.sys.global_cpu_usage() as f64).clamp(0.0, 100.0),
            core_count: cpus.len() as u32,
            frequency_mhz,
            per_core,
        })
    }

    fn read_memory(&self) -> Result<MemorySample, CollectionError> {
        let total = self.sys.total_memory();
        if total == 0 {
            return Err(CollectionError::Unavailable {
                subsystem: "memory",
                reason: "total memory reported as 0".into(),
            });
        }
        let used = total.saturating_sub(self.sys.available_memory());
        Ok(MemorySample {
            total,
            used,
            percent: percent_of(used, total),
        })
    }

    /// Root filesystem, or the first listed disk where there is no "/" mount.
    fn read_disk(&self) -> Result<DiskSample, CollectionError> {
        let list = self.disks.list();
        let disk = list
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))
            .or_else(|| list.first())
            .ok_or_else(|| CollectionError::Unavailable {
                subsystem: "disk",
                reason: "no disks reported".into(),
            })?;
        let total = disk.total_space();
        let used = total.saturating_sub(disk.available_space());
        Ok(DiskSample {
            total,
            used,
            percent: percent_of(used, total),
        })
    }

    fn read_network(&self) -> NetworkCounters {
        self.networks
            .list()
            .values()
            .fold(NetworkCounters::default(), |acc, data| NetworkCounters {
                bytes_sent: acc.bytes_sent + data.total_transmitted(),
                bytes_recv: acc.bytes_recv + data.total_received(),
                packets_sent: acc.packets_sent + data.total_packets_transmitted(),
                packets_recv: acc.packets_recv + data.total_packets_received(),
                errin: acc.errin + data.total_errors_on_received(),
                errout: acc.errout + data.total_errors_on_transmitted(),
            })
    }
}

fn percent_of(used: u64, total: u64) -> f64 {
    if total > 0 {
        ((used as f64 / total as f64) * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    }
}

fn read_identity(sys: &System) -> SystemInfo {
    let name = System::name().unwrap_or_else(|| std::env::consts::OS.into());
    let os_version = System::os_version().unwrap_or_default();
    let kernel = System::kernel_version().unwrap_or_default();
    let processor = linux::read_cpu_model_linux()
        .or_else(|| {
            sys.cpus()
                .first()
                .map(|c| c.brand().trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| "Unknown".into());
    let os = linux::read_os_pretty_name_linux()
        .unwrap_or_else(|| format!("{} {}", name, os_version).trim().to_string());
    SystemInfo {
        hostname: System::host_name().unwrap_or_default(),
        ip_address: String::new(),
        os,
        platform: format!("{}-{}-{}", name, kernel, std::env::consts::ARCH),
        processor,
        machine: std::env::consts::ARCH.to_string(),
    }
}

/// First non-loopback IPv4 address, by interface name for a stable pick.
fn primary_ipv4(networks: &Networks) -> String {
    let mut names: Vec<&String> = networks.list().keys().collect();
    names.sort();
    names
        .into_iter()
        .filter_map(|name| networks.list().get(name))
        .flat_map(|data| data.ip_networks().iter().map(|n| n.addr))
        .find(|addr| matches!(addr, IpAddr::V4(v4) if !v4.is_loopback()))
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "127.0.0.1".into())
}
