//! Metrics history with SQLite persistence.
//!
//! One aggregate row per source per poll cycle, plus one row per Proxmox node,
//! queried by trailing window.

use crate::error::{Result, VigilError};
use crate::types::{HistoryRecord, NodeHistoryRecord, SourceKind};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub mod migrations;

/// Upper bound on rows returned by one query. The newest rows are kept.
const QUERY_LIMIT: i64 = 10_000;

/// History store backed by SQLite.
#[derive(Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    /// Create a store with an in-memory database (for tests).
    pub async fn new_in_memory() -> Result<Self> {
        Self::new(":memory:").await
    }

    /// Open (or create) the database at `db_path` and run migrations.
    #[instrument(skip(db_path))]
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        info!("Opening history store at {:?}", db_path);

        let in_memory = db_path == Path::new(":memory:");
        if !in_memory {
            if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| VigilError::IoError { path: parent.to_path_buf(), source: e })?;
            }
        }

        let path = db_path.to_str().ok_or_else(|| VigilError::InvalidConfig {
            reason: "Invalid database path".to_string(),
        })?;
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| VigilError::DatabaseError(e.to_string()))?
            .create_if_missing(true);

        // every :memory: connection is its own database
        let max_connections = if in_memory { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| VigilError::DatabaseError(e.to_string()))?;

        migrations::run(&pool).await?;

        info!("History store ready");
        Ok(Self { pool })
    }

    /// Append one record.
    #[instrument(skip(self, record), fields(source = %record.source))]
    pub async fn record(&self, record: &HistoryRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO metrics_history (source, timestamp, cpu_percent, memory_percent,
                                         memory_used, memory_total, nodes_count,
                                         vms_running, vms_total)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.source.as_str())
        .bind(record.timestamp.timestamp_millis())
        .bind(record.cpu_percent)
        .bind(record.memory_percent)
        .bind(record.memory_used as i64)
        .bind(record.memory_total as i64)
        .bind(record.nodes_count as i64)
        .bind(record.vms_running as i64)
        .bind(record.vms_total as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            metrics::counter!("vigil_db_errors_total", "operation" => "record").increment(1);
            VigilError::DatabaseError(e.to_string())
        })?;

        metrics::counter!("vigil_history_writes_total", "source" => record.source.as_str())
            .increment(1);
        Ok(())
    }

    /// Records of `source` newer than `window`, oldest first.
    #[instrument(skip(self))]
    pub async fn query(&self, source: SourceKind, window: Duration) -> Result<Vec<HistoryRecord>> {
        self.query_since(source, since_millis(window), QUERY_LIMIT).await
    }

    async fn query_since(
        &self,
        source: SourceKind,
        since_millis: i64,
        limit: i64,
    ) -> Result<Vec<HistoryRecord>> {
        // newest first so the limit drops the oldest rows
        let rows = sqlx::query(
            r#"
            SELECT timestamp, cpu_percent, memory_percent, memory_used, memory_total,
                   nodes_count, vms_running, vms_total
            FROM metrics_history
            WHERE source = ? AND timestamp >= ?
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(source.as_str())
        .bind(since_millis)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            metrics::counter!("vigil_db_errors_total", "operation" => "query").increment(1);
            VigilError::DatabaseError(e.to_string())
        })?;

        let mut records: Vec<HistoryRecord> = rows
            .into_iter()
            .filter_map(|row| {
                let timestamp = row_timestamp(&row)?;
                Some(HistoryRecord {
                    source,
                    timestamp,
                    cpu_percent: row.get::<f64, _>("cpu_percent"),
                    memory_percent: row.get::<f64, _>("memory_percent"),
                    memory_used: row.get::<i64, _>("memory_used") as u64,
                    memory_total: row.get::<i64, _>("memory_total") as u64,
                    nodes_count: row.get::<i64, _>("nodes_count") as u32,
                    vms_running: row.get::<i64, _>("vms_running") as u32,
                    vms_total: row.get::<i64, _>("vms_total") as u32,
                })
            })
            .collect();
        records.reverse();

        Ok(records)
    }

    /// Append one cycle's node rows.
    #[instrument(skip(self, records), fields(nodes = records.len()))]
    pub async fn record_nodes(&self, records: &[NodeHistoryRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let db_error = |e: sqlx::Error| {
            metrics::counter!("vigil_db_errors_total", "operation" => "record_nodes").increment(1);
            VigilError::DatabaseError(e.to_string())
        };

        let mut tx = self.pool.begin().await.map_err(db_error)?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO node_history (node_name, timestamp, status, cpu_percent,
                                          memory_used, memory_total, memory_percent)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.node)
            .bind(record.timestamp.timestamp_millis())
            .bind(&record.status)
            .bind(record.cpu_percent)
            .bind(record.memory_used as i64)
            .bind(record.memory_total as i64)
            .bind(record.memory_percent)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }
        tx.commit().await.map_err(db_error)?;

        metrics::counter!("vigil_history_writes_total", "source" => "proxmox_node")
            .increment(records.len() as u64);
        Ok(())
    }

    /// Samples of one node newer than `window`, oldest first.
    #[instrument(skip(self))]
    pub async fn query_node(&self, node: &str, window: Duration) -> Result<Vec<NodeHistoryRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT node_name, timestamp, status, cpu_percent, memory_used, memory_total,
                   memory_percent
            FROM node_history
            WHERE node_name = ? AND timestamp >= ?
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(node)
        .bind(since_millis(window))
        .bind(QUERY_LIMIT)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            metrics::counter!("vigil_db_errors_total", "operation" => "query_node").increment(1);
            VigilError::DatabaseError(e.to_string())
        })?;

        let mut records: Vec<NodeHistoryRecord> = rows
            .into_iter()
            .filter_map(|row| {
                let timestamp = row_timestamp(&row)?;
                Some(NodeHistoryRecord {
                    node: row.get::<String, _>("node_name"),
                    timestamp,
                    status: row.get::<String, _>("status"),
                    cpu_percent: row.get::<f64, _>("cpu_percent"),
                    memory_used: row.get::<i64, _>("memory_used") as u64,
                    memory_total: row.get::<i64, _>("memory_total") as u64,
                    memory_percent: row.get::<f64, _>("memory_percent"),
                })
            })
            .collect();
        records.reverse();

        Ok(records)
    }

    /// Delete rows older than `retention`. Returns the number of rows removed.
    #[instrument(skip(self))]
    pub async fn prune(&self, retention: Duration) -> Result<u64> {
        let cutoff = since_millis(retention);

        let mut deleted = 0;
        for table in ["metrics_history", "node_history"] {
            let result = sqlx::query(&format!("DELETE FROM {} WHERE timestamp < ?", table))
                .bind(cutoff)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    metrics::counter!("vigil_db_errors_total", "operation" => "prune").increment(1);
                    VigilError::DatabaseError(e.to_string())
                })?;
            deleted += result.rows_affected();
        }

        if deleted > 0 {
            debug!(deleted, "Pruned old history rows");
        }
        Ok(deleted)
    }

    /// Close the pool and wait for connections to finish. Later calls fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Cheap round trip, run by the `/health` handler.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| VigilError::DatabaseError(e.to_string()))?;
        Ok(())
    }
}

/// Unix millis `window` ago.
fn since_millis(window: Duration) -> i64 {
    Utc::now().timestamp_millis() - window.as_millis() as i64
}

fn row_timestamp(row: &sqlx::sqlite::SqliteRow) -> Option<DateTime<Utc>> {
    let millis = row.get::<i64, _>("timestamp");
    let timestamp = DateTime::<Utc>::from_timestamp_millis(millis);
    if timestamp.is_none() {
        warn!(millis, "Skipping history row with invalid timestamp");
    }
    timestamp
}
