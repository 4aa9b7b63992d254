// Pipeline error types. None of these stop the agent; the scheduler logs and moves on.

use std::time::Duration;
use thiserror::Error;

/// Sampler read failed; the whole snapshot is dropped.
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("{subsystem} unavailable: {reason}")]
    Unavailable {
        subsystem: &'static str,
        reason: String,
    },
    #[error("{field} out of range: {value}")]
    OutOfRange { field: String, value: f64 },
    #[error("{subsystem} reports used {used} > total {total}")]
    Inconsistent {
        subsystem: &'static str,
        used: u64,
        total: u64,
    },
    #[error("collection timed out after {0:?}")]
    Timeout(Duration),
    #[error("sampler task: {0}")]
    Task(String),
}

/// One delivery attempt failed. Transient and permanent failures are not distinguished.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("collector answered {0}")]
    Status(u16),
    #[error("encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Every attempt failed; the payload goes to the spool.
#[derive(Debug, Error)]
#[error("delivery failed after {attempts} attempts")]
pub struct RetryExhausted {
    pub attempts: u32,
    #[source]
    pub last: DeliveryError,
}

/// Local spool write or read failed. On the write path the payload is lost.
#[derive(Debug, Error)]
pub enum SpoolError {
    #[error("sqlite: {0}")]
    Database(#[from] sqlx::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("decode record: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("unsupported record version {0}")]
    Version(u8),
}
