// Agent scheduler: one task drives sample cadence, flush cadence and delivery.
// The task exclusively owns the MetricBuffer. Status leaves through a watch channel.
// Delivery runs either inline (retry sleeps pause collection) or on a dedicated
// worker fed by a bounded FIFO queue; a single consumer keeps aggregates in window order.

use crate::buffer::MetricBuffer;
use crate::delivery::DeliveryClient;
use crate::models::Aggregate;
use crate::retry::RetryCoordinator;
use crate::sampler::Sampler;
use crate::spool::Spool;
use crate::status::{AgentStatus, DeliveryReport, SchedulerState};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, Instant, MissedTickBehavior, interval};
use tracing::Instrument;

/// Upper bound on the loop tick, which bounds status latency and stop latency.
const MAX_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Deliver and retry on the scheduler task.
    #[default]
    Inline,
    /// Hand aggregates to a dedicated delivery worker over a bounded queue.
    Queued,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub collection_interval: Duration,
    pub delivery_mode: DeliveryMode,
    /// Queued mode only; a full queue blocks the scheduler until the worker catches up.
    pub queue_capacity: usize,
}

/// Loop tick: min(1s, collection interval).
pub fn tick_period(collection_interval: Duration) -> Duration {
    collection_interval.min(MAX_TICK).max(Duration::from_millis(1))
}

struct DeliveryJob {
    aggregate: Aggregate,
    /// Shutdown flush: one attempt, no retry.
    single_attempt: bool,
}

struct QueuedDelivery {
    tx: mpsc::Sender<DeliveryJob>,
    report_rx: watch::Receiver<Option<DeliveryReport>>,
    worker: tokio::task::JoinHandle<()>,
}

pub struct Scheduler<S, D, P> {
    sampler: S,
    buffer: MetricBuffer,
    coordinator: Arc<RetryCoordinator<D, P>>,
    config: SchedulerConfig,
    queue: Option<QueuedDelivery>,
    status_tx: watch::Sender<AgentStatus>,
    state: SchedulerState,
    last_collection: Option<Instant>,
    last_collection_success: bool,
    last_delivery: Option<DeliveryReport>,
}

/// Control side of a spawned scheduler.
pub struct SchedulerHandle {
    stop_tx: watch::Sender<bool>,
    status_rx: watch::Receiver<AgentStatus>,
    join: tokio::task::JoinHandle<()>,
}

impl SchedulerHandle {
    /// Requests a graceful stop. Idempotent; the loop sees it within one tick.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn status(&self) -> watch::Receiver<AgentStatus> {
        self.status_rx.clone()
    }

    /// Waits for the loop (and the final flush) to finish.
    pub async fn join(self) -> Result<(), tokio::task::JoinError> {
        self.join.await
    }

    pub async fn shutdown(self) -> Result<(), tokio::task::JoinError> {
        self.stop();
        self.join().await
    }
}

impl<S, D, P> Scheduler<S, D, P>
where
    S: Sampler + 'static,
    D: DeliveryClient + 'static,
    P: Spool + 'static,
{
    pub fn new(
        sampler: S,
        buffer: MetricBuffer,
        coordinator: RetryCoordinator<D, P>,
        config: SchedulerConfig,
    ) -> Self {
        let (status_tx, _) = watch::channel(AgentStatus::idle());
        Self {
            sampler,
            buffer,
            coordinator: Arc::new(coordinator),
            config,
            queue: None,
            status_tx,
            state: SchedulerState::Idle,
            last_collection: None,
            last_collection_success: false,
            last_delivery: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AgentStatus> {
        self.status_tx.subscribe()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn coordinator(&self) -> &Arc<RetryCoordinator<D, P>> {
        &self.coordinator
    }

    pub fn spawn(self) -> SchedulerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let status_rx = self.status_tx.subscribe();
        let span = tracing::debug_span!(
            "scheduler",
            collection_interval_secs = self.config.collection_interval.as_secs(),
            flush_interval_secs = self.buffer.flush_interval().as_secs()
        );
        let join = tokio::spawn(self.run(stop_rx).instrument(span));
        SchedulerHandle {
            stop_tx,
            status_rx,
            join,
        }
    }

    async fn run(mut self, mut stop_rx: watch::Receiver<bool>) {
        if self.config.delivery_mode == DeliveryMode::Queued {
            self.queue = Some(self.start_delivery_worker());
        }
        self.state = SchedulerState::Running;
        self.publish_status();

        let period = tick_period(self.config.collection_interval);
        tracing::info!(
            tick_ms = period.as_millis() as u64,
            mode = ?self.config.delivery_mode,
            "scheduler running"
        );

        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                deadline = tick.tick() => {
                    self.tick(deadline).await;
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }

        self.state = SchedulerState::Stopping;
        self.publish_status();
        self.final_flush().await;
        self.state = SchedulerState::Stopped;
        self.publish_status();
        tracing::info!("scheduler stopped");
    }

    /// One loop iteration: collect if due, flush if due, then publish status.
    /// Collection cadence is measured on tick deadlines, not wake-up time.
    async fn tick(&mut self, deadline: Instant) {
        let collection_due = self.last_collection.is_none_or(|t| {
            deadline.saturating_duration_since(t) >= self.config.collection_interval
        });
        if collection_due {
            self.last_collection = Some(deadline);
            match self.sampler.collect().await {
                Ok(snapshot) => {
                    self.buffer.add_snapshot(snapshot);
                    self.last_collection_success = true;
                }
                Err(e) => {
                    // Dropped, not retried: the next collection resamples.
                    tracing::warn!(error = %e, operation = "collect", "metrics collection failed");
                    self.last_collection_success = false;
                }
            }
        }

        let now = Instant::now();
        if self.buffer.should_flush(now)
            && let Some(aggregate) = self.buffer.drain_aggregate(now)
        {
            self.dispatch(aggregate, false).await;
        }

        self.publish_status();
    }

    /// Best effort: one attempt for whatever is still buffered, then drain the queue.
    async fn final_flush(&mut self) {
        if let Some(aggregate) = self.buffer.drain_aggregate(Instant::now()) {
            tracing::info!("flushing buffered samples before stop");
            self.dispatch(aggregate, true).await;
        }
        if let Some(QueuedDelivery { tx, report_rx, worker }) = self.queue.take() {
            drop(tx);
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "delivery worker join failed");
            }
            if let Some(report) = *report_rx.borrow() {
                self.last_delivery = Some(report);
            }
        }
    }

    async fn dispatch(&mut self, aggregate: Aggregate, single_attempt: bool) {
        if let Some(queue) = &self.queue {
            let job = DeliveryJob {
                aggregate,
                single_attempt,
            };
            if queue.tx.send(job).await.is_err() {
                tracing::error!("delivery worker gone; aggregate dropped");
            }
            return;
        }
        let success = if single_attempt {
            self.coordinator.send_once(&aggregate).await
        } else {
            self.coordinator.send_with_retry(&aggregate).await
        };
        self.last_delivery = Some(DeliveryReport {
            success,
            at: Utc::now(),
        });
    }

    fn start_delivery_worker(&self) -> QueuedDelivery {
        let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let (report_tx, report_rx) = watch::channel(None);
        let worker = spawn_delivery_worker(rx, self.coordinator.clone(), report_tx);
        QueuedDelivery {
            tx,
            report_rx,
            worker,
        }
    }

    fn publish_status(&mut self) {
        if let Some(queue) = &self.queue
            && let Some(report) = *queue.report_rx.borrow()
        {
            self.last_delivery = Some(report);
        }
        let connected =
            self.last_collection_success && self.last_delivery.is_none_or(|r| r.success);
        let now = Instant::now();
        self.status_tx.send_replace(AgentStatus {
            state: self.state,
            connected,
            last_collection_success: self.last_collection_success,
            last_delivery: self.last_delivery,
            buffered_samples: self.buffer.len(),
            next_flush_in: self.buffer.time_until_flush(now),
            dropped_samples: self.buffer.dropped_total(),
            delivered_total: self.coordinator.delivered_total(),
            spooled_total: self.coordinator.spooled_total(),
        });
    }
}

/// Delivery worker for queued mode: a single consumer, so jobs complete in send order.
/// Exits after the sender is dropped and the queue is drained.
fn spawn_delivery_worker<D, P>(
    mut rx: mpsc::Receiver<DeliveryJob>,
    coordinator: Arc<RetryCoordinator<D, P>>,
    report_tx: watch::Sender<Option<DeliveryReport>>,
) -> tokio::task::JoinHandle<()>
where
    D: DeliveryClient + 'static,
    P: Spool + 'static,
{
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let success = if job.single_attempt {
                coordinator.send_once(&job.aggregate).await
            } else {
                coordinator.send_with_retry(&job.aggregate).await
            };
            report_tx.send_replace(Some(DeliveryReport {
                success,
                at: Utc::now(),
            }));
        }
        tracing::debug!("delivery worker shutting down");
    })
}
