//! Database migrations.

use crate::error::{Result, VigilError};
use sqlx::SqlitePool;
use tracing::{info, instrument};

const SCHEMA_VERSION: i64 = 3;

#[instrument(skip(pool))]
pub async fn run(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| VigilError::MigrationFailed { reason: e.to_string() })?;

    let current_version: Option<i64> =
        sqlx::query_scalar("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(pool)
            .await
            .map_err(|e| VigilError::MigrationFailed { reason: e.to_string() })?;

    let current_version = current_version.unwrap_or(0);

    if current_version >= SCHEMA_VERSION {
        info!("History schema is up to date (version {})", current_version);
        return Ok(());
    }

    info!("Migrating history database from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        migrate_to_v1(pool).await?;
    }

    if current_version < 2 {
        migrate_to_v2(pool).await?;
    }

    if current_version < 3 {
        migrate_to_v3(pool).await?;
    }

    Ok(())
}

#[instrument(skip(pool))]
async fn migrate_to_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration to schema version 1");

    // timestamp is unix milliseconds
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS metrics_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            cpu_percent REAL NOT NULL,
            memory_percent REAL NOT NULL,
            memory_used INTEGER NOT NULL,
            memory_total INTEGER NOT NULL,
            nodes_count INTEGER NOT NULL,
            vms_running INTEGER NOT NULL,
            vms_total INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| VigilError::MigrationFailed { reason: e.to_string() })?;

    set_version(pool, 1).await?;
    info!("Migration to schema version 1 complete");
    Ok(())
}

#[instrument(skip(pool))]
async fn migrate_to_v2(pool: &SqlitePool) -> Result<()> {
    info!("Running migration to schema version 2");

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_metrics_history_source_ts
        ON metrics_history(source, timestamp)
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| VigilError::MigrationFailed { reason: e.to_string() })?;

    set_version(pool, 2).await?;
    info!("Migration to schema version 2 complete");
    Ok(())
}

/// Per-node samples next to the cluster aggregates.
#[instrument(skip(pool))]
async fn migrate_to_v3(pool: &SqlitePool) -> Result<()> {
    info!("Running migration to schema version 3");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS node_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            node_name TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            status TEXT NOT NULL,
            cpu_percent REAL NOT NULL,
            memory_used INTEGER NOT NULL,
            memory_total INTEGER NOT NULL,
            memory_percent REAL NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| VigilError::MigrationFailed { reason: e.to_string() })?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_node_history_node_ts ON node_history(node_name, timestamp)",
    )
    .execute(pool)
    .await
    .map_err(|e| VigilError::MigrationFailed { reason: e.to_string() })?;

    set_version(pool, 3).await?;
    info!("Migration to schema version 3 complete");
    Ok(())
}

async fn set_version(pool: &SqlitePool, version: i64) -> Result<()> {
    sqlx::query("DELETE FROM schema_version")
        .execute(pool)
        .await
        .map_err(|e| VigilError::MigrationFailed { reason: e.to_string() })?;

    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await
        .map_err(|e| VigilError::MigrationFailed { reason: e.to_string() })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_upgrade_from_version_2_adds_node_history() {
        let pool = SqlitePoolOptions::new().max_connections(1).connect(":memory:").await.unwrap();
        sqlx::query("CREATE TABLE schema_version (version INTEGER PRIMARY KEY)")
            .execute(&pool)
            .await
            .unwrap();
        migrate_to_v1(&pool).await.unwrap();
        migrate_to_v2(&pool).await.unwrap();

        run(&pool).await.unwrap();
        run(&pool).await.unwrap();

        let version: i64 =
            sqlx::query_scalar("SELECT version FROM schema_version")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'node_history'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(tables, 1);
    }
}
