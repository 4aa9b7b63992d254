// Agent data model: raw snapshots and the aggregated wire payload

mod aggregate;
mod snapshot;

pub use aggregate::{
    Aggregate, AggregateMetrics, CpuAggregate, DiskAggregate, MemoryAggregate, NetworkAggregate,
};
pub use snapshot::{CpuSample, DiskSample, MemorySample, NetworkCounters, Snapshot, SystemInfo};
