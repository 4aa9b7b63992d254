// Pure window aggregation: snapshots in, one Aggregate out.
// The buffer owns draining; this module only computes.

use chrono::{DateTime, Utc};

use crate::models::{
    Aggregate, AggregateMetrics, CpuAggregate, DiskAggregate, MemoryAggregate, NetworkAggregate,
    Snapshot,
};

/// Aggregates a window of snapshots. Descriptive fields come from the last snapshot;
/// `timestamp` is the drain time. Returns None for an empty window.
pub fn aggregate_window(snapshots: &[Snapshot], timestamp: DateTime<Utc>) -> Option<Aggregate> {
    let first = snapshots.first()?;
    let last = snapshots.last()?;
    Some(summarize(first, last, snapshots, timestamp))
}

/// One-sample window: the payload shape the collector expects, for a single reading.
pub fn aggregate_single(snapshot: &Snapshot, timestamp: DateTime<Utc>) -> Aggregate {
    summarize(snapshot, snapshot, std::slice::from_ref(snapshot), timestamp)
}

fn summarize(
    first: &Snapshot,
    last: &Snapshot,
    snapshots: &[Snapshot],
    timestamp: DateTime<Utc>,
) -> Aggregate {

    let cpu_usages: Vec<f64> = snapshots.iter().map(|s| s.cpu.usage_percent).collect();
    let memory_used: Vec<f64> = snapshots.iter().map(|s| s.memory.used as f64).collect();
    let memory_percent: Vec<f64> = snapshots.iter().map(|s| s.memory.percent).collect();
    let disk_used: Vec<f64> = snapshots.iter().map(|s| s.disk.used as f64).collect();
    let disk_percent: Vec<f64> = snapshots.iter().map(|s| s.disk.percent).collect();

    let cpu = CpuAggregate {
        usage_percent: last.cpu.usage_percent,
        core_count: last.cpu.core_count,
        frequency_mhz: last.cpu.frequency_mhz,
        per_core: last.cpu.per_core.clone(),
        min: cpu_usages.iter().copied().fold(f64::INFINITY, f64::min),
        max: cpu_usages.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        std_dev: sample_std_dev(&cpu_usages),
    };

    let memory = MemoryAggregate {
        total: last.memory.total,
        used: last.memory.used,
        percent: last.memory.percent,
        used_avg: mean_f64(&memory_used),
        percent_avg: mean_f64(&memory_percent),
        peak_usage: snapshots.iter().map(|s| s.memory.used).max().unwrap_or(0),
    };

    let disk = DiskAggregate {
        total: last.disk.total,
        used: last.disk.used,
        percent: last.disk.percent,
        used_avg: mean_f64(&disk_used),
        percent_avg: mean_f64(&disk_percent),
    };

    let span_secs = window_span_secs(first, last);
    let rate = |start: u64, end: u64| {
        span_secs
            .filter(|s| *s > 0.0)
            .map(|s| end.saturating_sub(start) as f64 / s)
    };
    let net = &last.network;
    let network = NetworkAggregate {
        bytes_sent: net.bytes_sent,
        bytes_recv: net.bytes_recv,
        packets_sent: net.packets_sent,
        packets_recv: net.packets_recv,
        errin: net.errin,
        errout: net.errout,
        bytes_sent_total: net.bytes_sent,
        bytes_recv_total: net.bytes_recv,
        packets_sent_total: net.packets_sent,
        packets_recv_total: net.packets_recv,
        errors_in_total: net.errin,
        errors_out_total: net.errout,
        transfer_rate_send: rate(first.network.bytes_sent, net.bytes_sent),
        transfer_rate_recv: rate(first.network.bytes_recv, net.bytes_recv),
    };

    Aggregate {
        timestamp,
        system_info: last.system_info.clone(),
        metrics: AggregateMetrics {
            cpu,
            memory,
            disk,
            network,
        },
    }
}

/// Seconds between the first and last `collected_at`; None if either is unstamped.
fn window_span_secs(first: &Snapshot, last: &Snapshot) -> Option<f64> {
    let start = first.collected_at?;
    let end = last.collected_at?;
    Some((end - start).num_milliseconds() as f64 / 1000.0)
}

pub(crate) fn mean_f64(v: &[f64]) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    v.iter().sum::<f64>() / (v.len() as f64)
}

/// Sample standard deviation (n-1 denominator); 0 for fewer than two values.
pub(crate) fn sample_std_dev(v: &[f64]) -> f64 {
    if v.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(v);
    let sum_sq: f64 = v.iter().map(|x| (x - mean).powi(2)).sum();
    (sum_sq / (v.len() - 1) as f64).sqrt()
}
