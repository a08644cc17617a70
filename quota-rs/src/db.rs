//! Database initialization

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::platform::CredentialStore;
use crate::quota::QuotaService;

/// Open the connection pool, creating the database file if needed
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool> {
    // WAL lets readers continue while a publish confirmation holds the write lock
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    info!("Opened database: {}", config.url);
    Ok(pool)
}

/// Create all tables (idempotent)
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    QuotaService::new(pool.clone()).init_db().await?;
    CredentialStore::new(pool.clone()).init_db().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_creates_file_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("quota.db").display());

        let pool = connect(&DatabaseConfig {
            url,
            max_connections: 2,
        })
        .await
        .unwrap();
        init_schema(&pool).await.unwrap();
        // Second run must not fail on existing tables
        init_schema(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        assert_eq!(tables, vec!["platform_credentials", "posts", "users"]);
    }
}
