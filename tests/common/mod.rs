// Shared test helpers: snapshot builder and in-memory fakes for each pipeline seam
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use telemetry_agent::delivery::{Ack, DeliveryClient};
use telemetry_agent::error::{CollectionError, DeliveryError, SpoolError};
use telemetry_agent::models::*;
use telemetry_agent::sampler::Sampler;
use telemetry_agent::spool::Spool;
use tokio::time::Instant;

pub fn system_info() -> SystemInfo {
    SystemInfo {
        hostname: "test-host".into(),
        ip_address: "10.0.0.5".into(),
        os: "Linux 6.1".into(),
        platform: "Linux-6.1-x86_64".into(),
        processor: "Test CPU".into(),
        machine: "x86_64".into(),
    }
}

pub fn snapshot(cpu_percent: f64) -> Snapshot {
    Snapshot {
        collected_at: None,
        system_info: system_info(),
        cpu: CpuSample {
            usage_percent: cpu_percent,
            core_count: 4,
            frequency_mhz: Some(2400.0),
            per_core: vec![cpu_percent; 4],
        },
        memory: MemorySample {
            total: 8_000,
            used: 4_000,
            percent: 50.0,
        },
        disk: DiskSample {
            total: 100_000,
            used: 25_000,
            percent: 25.0,
        },
        network: NetworkCounters::default(),
    }
}

/// Snapshot stamped at `at` with the given cumulative byte counters.
pub fn snapshot_at(
    at: chrono::DateTime<chrono::Utc>,
    bytes_sent: u64,
    bytes_recv: u64,
) -> Snapshot {
    let mut s = snapshot(10.0);
    s.collected_at = Some(at);
    s.network.bytes_sent = bytes_sent;
    s.network.bytes_recv = bytes_recv;
    s
}

pub fn aggregate(cpu_percent: f64) -> Aggregate {
    telemetry_agent::buffer::aggregation::aggregate_window(
        &[snapshot(cpu_percent)],
        chrono::Utc::now(),
    )
    .unwrap()
}

/// Returns snapshots whose CPU usage counts up 1, 2, 3... so windows are distinguishable.
#[derive(Clone, Default)]
pub struct FakeSampler {
    pub calls: Arc<AtomicU64>,
    pub fail: Arc<AtomicBool>,
}

impl Sampler for FakeSampler {
    async fn collect(&self) -> Result<Snapshot, CollectionError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollectionError::Unavailable {
                subsystem: "cpu",
                reason: "fake failure".into(),
            });
        }
        Ok(snapshot(n as f64))
    }
}

/// Records every attempt; fails the first `fail_first` attempts with a 503.
#[derive(Clone, Default)]
pub struct FakeClient {
    pub attempts: Arc<Mutex<Vec<(Instant, Aggregate)>>>,
    pub fail_first: Arc<AtomicU32>,
    pub always_fail: Arc<AtomicBool>,
    pub latency: Duration,
}

impl FakeClient {
    pub fn failing() -> Self {
        let c = Self::default();
        c.always_fail.store(true, Ordering::SeqCst);
        c
    }

    pub fn failing_first(n: u32) -> Self {
        let c = Self::default();
        c.fail_first.store(n, Ordering::SeqCst);
        c
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    pub fn delivered(&self) -> Vec<Aggregate> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, a)| a.clone())
            .collect()
    }
}

impl DeliveryClient for FakeClient {
    async fn deliver(&self, payload: &Aggregate) -> Result<Ack, DeliveryError> {
        self.attempts
            .lock()
            .unwrap()
            .push((Instant::now(), payload.clone()));
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.always_fail.load(Ordering::SeqCst) {
            return Err(DeliveryError::Status(503));
        }
        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            return Err(DeliveryError::Status(503));
        }
        Ok(Ack { status: 200 })
    }
}

#[derive(Clone, Default)]
pub struct MemorySpool {
    pub stored: Arc<Mutex<Vec<Aggregate>>>,
}

impl MemorySpool {
    pub fn len(&self) -> usize {
        self.stored.lock().unwrap().len()
    }
}

impl Spool for MemorySpool {
    async fn store(&self, payload: &Aggregate) -> Result<i64, SpoolError> {
        let mut stored = self.stored.lock().unwrap();
        stored.push(payload.clone());
        Ok(stored.len() as i64)
    }
}

pub struct FailingSpool;

impl Spool for FailingSpool {
    async fn store(&self, _payload: &Aggregate) -> Result<i64, SpoolError> {
        Err(SpoolError::Io(std::io::Error::other("disk full")))
    }
}
