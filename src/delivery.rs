// HTTP transport for aggregates. One POST per call; retrying is the coordinator's job.

use crate::buffer::aggregation::aggregate_single;
use crate::error::DeliveryError;
use crate::models::{Aggregate, Snapshot};
use crate::version;
use chrono::Utc;
use reqwest::StatusCode;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::instrument;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Collector acknowledgement. Only the status is inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub status: u16,
}

pub trait DeliveryClient: Send + Sync {
    fn deliver(&self, payload: &Aggregate) -> impl Future<Output = Result<Ack, DeliveryError>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpDeliveryClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl HttpDeliveryClient {
    pub fn new(url: &str, api_key: &str, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(version::user_agent())
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Posts one reading wrapped as a single-sample aggregate; checks URL and key
    /// before the first window closes.
    #[instrument(skip(self, snapshot), fields(url = %self.url, operation = "test_connection"))]
    pub async fn test_connection(&self, snapshot: &Snapshot) -> Result<Ack, DeliveryError> {
        let payload = aggregate_single(snapshot, Utc::now());
        self.post_json(&payload).await
    }

    async fn post_json<T: Serialize + ?Sized>(&self, body: &T) -> Result<Ack, DeliveryError> {
        let body = serde_json::to_vec(body)?;
        let resp = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header("X-API-Key", &self.api_key)
            .body(body)
            .send()
            .await?;
        let status = resp.status();
        // Drain body for connection reuse.
        let _ = resp.bytes().await;
        if status != StatusCode::OK {
            return Err(DeliveryError::Status(status.as_u16()));
        }
        Ok(Ack {
            status: status.as_u16(),
        })
    }
}

impl DeliveryClient for HttpDeliveryClient {
    #[instrument(skip(self, payload), fields(url = %self.url, operation = "deliver"))]
    async fn deliver(&self, payload: &Aggregate) -> Result<Ack, DeliveryError> {
        self.post_json(payload).await
    }
}
