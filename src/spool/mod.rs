// SQLite spool for aggregates that could not be delivered.
// Append-only; the only mutation is flipping `sent`. Nothing in the agent reads it back
// automatically: it is a backstop log that operator tooling (demos/dump_spool.rs) can replay.

mod blob;

use crate::error::SpoolError;
use crate::models::Aggregate;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

/// Durable sink for undeliverable payloads. Returns the new record id.
pub trait Spool: Send + Sync {
    fn store(&self, payload: &Aggregate) -> impl Future<Output = Result<i64, SpoolError>> + Send;
}

/// One spooled payload. `data` is the compressed BLOB as stored.
#[derive(Debug, Clone)]
pub struct SpoolRecord {
    pub id: i64,
    pub timestamp: String,
    pub data: Vec<u8>,
    pub sent: bool,
}

impl SpoolRecord {
    /// Decompressed JSON, byte-identical to what was serialized at store time.
    pub fn payload_json(&self) -> Result<Vec<u8>, SpoolError> {
        blob::decode(&self.data)
    }

    pub fn aggregate(&self) -> Result<Aggregate, SpoolError> {
        serde_json::from_slice(&self.payload_json()?).map_err(SpoolError::Decode)
    }
}

pub struct DurableSpool {
    pool: SqlitePool,
}

impl DurableSpool {
    /// Connect to SQLite at `path`, creating the parent dir and DB if missing.
    pub async fn connect(path: &str) -> Result<Self, SpoolError> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> Result<(), SpoolError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                data BLOB NOT NULL,
                sent INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_metrics_sent ON metrics(sent, id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[instrument(skip(self), fields(spool = "sqlite", operation = "count_unsent"))]
    pub async fn count_unsent(&self) -> Result<u64, SpoolError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM metrics WHERE sent = 0")
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n as u64)
    }

    /// Oldest unsent records first, at most `limit`.
    pub async fn unsent(&self, limit: u32) -> Result<Vec<SpoolRecord>, SpoolError> {
        let rows = sqlx::query(
            "SELECT id, timestamp, data, sent FROM metrics WHERE sent = 0 ORDER BY id ASC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let sent: i64 = row.try_get("sent")?;
            out.push(SpoolRecord {
                id: row.try_get("id")?,
                timestamp: row.try_get("timestamp")?,
                data: row.try_get("data")?,
                sent: sent != 0,
            });
        }
        Ok(out)
    }

    /// Flags a record as sent. Returns false if no unsent record has that id.
    #[instrument(skip(self), fields(spool = "sqlite", operation = "mark_sent"))]
    pub async fn mark_sent(&self, id: i64) -> Result<bool, SpoolError> {
        let result = sqlx::query("UPDATE metrics SET sent = 1 WHERE id = $1 AND sent = 0")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

impl Spool for DurableSpool {
    #[instrument(skip(self, payload), fields(spool = "sqlite", operation = "store"))]
    async fn store(&self, payload: &Aggregate) -> Result<i64, SpoolError> {
        let json = serde_json::to_vec(payload)?;
        let data = blob::encode(&json)?;
        let result = sqlx::query("INSERT INTO metrics (timestamp, data, sent) VALUES ($1, $2, 0)")
            .bind(payload.timestamp.to_rfc3339())
            .bind(&data)
            .execute(&self.pool)
            .await?;
        let id = result.last_insert_rowid();
        tracing::debug!(
            record_id = id,
            raw_bytes = json.len(),
            stored_bytes = data.len(),
            "aggregate spooled"
        );
        Ok(id)
    }
}
