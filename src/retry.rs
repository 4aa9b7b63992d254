// Bounded retry around a DeliveryClient, falling back to the spool.
// Attempts are separated by a fixed sleep on the calling task; there is no backoff growth.

use crate::delivery::DeliveryClient;
use crate::error::RetryExhausted;
use crate::models::Aggregate;
use crate::spool::Spool;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total delivery attempts per payload (not additional retries).
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(60),
        }
    }
}

pub struct RetryCoordinator<D, P> {
    client: D,
    spool: P,
    policy: RetryPolicy,
    delivered_total: AtomicU64,
    spooled_total: AtomicU64,
    lost_total: AtomicU64,
}

impl<D: DeliveryClient, P: Spool> RetryCoordinator<D, P> {
    pub fn new(client: D, spool: P, policy: RetryPolicy) -> Self {
        Self {
            client,
            spool,
            policy,
            delivered_total: AtomicU64::new(0),
            spooled_total: AtomicU64::new(0),
            lost_total: AtomicU64::new(0),
        }
    }

    /// Up to `max_retries` attempts, `retry_delay` apart. On exhaustion the payload is
    /// spooled and false is returned; callers read that as "offline", not as an error.
    pub async fn send_with_retry(&self, payload: &Aggregate) -> bool {
        let max = self.policy.max_retries;
        let mut last_error = None;
        for attempt in 1..=max {
            match self.client.deliver(payload).await {
                Ok(ack) => {
                    self.delivered_total.fetch_add(1, Ordering::Relaxed);
                    debug!(attempt, status = ack.status, "aggregate delivered");
                    return true;
                }
                Err(e) => {
                    warn!(error = %e, attempt, max_retries = max, "delivery attempt failed");
                    last_error = Some(e);
                    if attempt < max {
                        tokio::time::sleep(self.policy.retry_delay).await;
                    }
                }
            }
        }
        if let Some(last) = last_error {
            let exhausted = RetryExhausted {
                attempts: max,
                last,
            };
            warn!(error = %exhausted, cause = %exhausted.last, "spooling undelivered aggregate");
        }
        self.spool_payload(payload).await;
        false
    }

    /// Single attempt, spooling on failure. Used for the shutdown flush.
    pub async fn send_once(&self, payload: &Aggregate) -> bool {
        match self.client.deliver(payload).await {
            Ok(ack) => {
                self.delivered_total.fetch_add(1, Ordering::Relaxed);
                debug!(status = ack.status, "aggregate delivered");
                true
            }
            Err(e) => {
                warn!(error = %e, "delivery failed; spooling aggregate");
                self.spool_payload(payload).await;
                false
            }
        }
    }

    async fn spool_payload(&self, payload: &Aggregate) {
        match self.spool.store(payload).await {
            Ok(id) => {
                self.spooled_total.fetch_add(1, Ordering::Relaxed);
                debug!(record_id = id, timestamp = %payload.timestamp, "aggregate spooled");
            }
            Err(e) => {
                self.lost_total.fetch_add(1, Ordering::Relaxed);
                error!(
                    error = %e,
                    operation = "spool_store",
                    timestamp = %payload.timestamp,
                    "spool write failed; aggregate lost"
                );
            }
        }
    }

    pub fn client(&self) -> &D {
        &self.client
    }

    pub fn spool(&self) -> &P {
        &self.spool
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn delivered_total(&self) -> u64 {
        self.delivered_total.load(Ordering::Relaxed)
    }

    pub fn spooled_total(&self) -> u64 {
        self.spooled_total.load(Ordering::Relaxed)
    }

    /// Aggregates neither delivered nor spooled.
    pub fn lost_total(&self) -> u64 {
        self.lost_total.load(Ordering::Relaxed)
    }
}
