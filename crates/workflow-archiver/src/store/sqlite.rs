use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::{check_moved_rows, check_still_terminal, ArchiveStore, UnitStatements};
use crate::types::{ArchiveCriteria, UnitKey};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::Connection;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    sql: UnitStatements,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, config: &Config) -> Self {
        Self {
            pool,
            sql: UnitStatements::new(&config.workflow_table, &config.archive_table),
        }
    }

    /// Create a new SQLite store.
    ///
    /// This initializes the pool with:
    /// - WAL mode enabled
    /// - 5s busy timeout
    /// - the database file created if missing
    pub async fn connect(config: &Config) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.dsn)
            .map_err(|e| Error::InvalidConfig {
                field: "dsn".to_string(),
                message: format!("Invalid SQLite DSN: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA journal_mode=WAL")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA busy_timeout=5000")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(options)
            .await
            .map_err(|e| Error::ConnectionFailed {
                source: Box::new(e),
                context: "Failed to open sqlite database".into(),
            })?;

        Ok(Self::new(pool, config))
    }

    async fn move_unit(
        conn: &mut SqliteConnection,
        sql: &UnitStatements,
        criteria: &ArchiveCriteria,
    ) -> Result<u64> {
        let mut tx = conn.begin().await.map_err(|e| Error::TransactionFailed {
            source: Box::new(e),
            context: format!("Failed to begin transaction for {}", criteria.unit()),
        })?;

        match Self::copy_and_delete(&mut tx, sql, criteria).await {
            Ok(rows) => {
                tx.commit().await.map_err(|e| Error::TransactionFailed {
                    source: Box::new(e),
                    context: format!("Failed to commit {}", criteria.unit()),
                })?;
                Ok(rows)
            }
            Err(e) => {
                tracing::error!("Rolling back transaction for {} due to: {}", criteria.unit(), e);
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!("Rollback failed for {}: {}", criteria.unit(), rollback);
                }
                Err(e)
            }
        }
    }

    async fn copy_and_delete(
        conn: &mut SqliteConnection,
        sql: &UnitStatements,
        criteria: &ArchiveCriteria,
    ) -> Result<u64> {
        let pending_sql = sql.pending(criteria);
        let mut pending = sqlx::query_scalar::<_, i64>(pending_sql)
            .bind(criteria.druid())
            .bind(criteria.datastream());
        if let Some(repository) = criteria.repository() {
            pending = pending.bind(repository);
        }
        let pending = pending
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| Error::QueryFailed {
                query: pending_sql.to_string(),
                source: Box::new(e),
                context: format!("Failed to check step statuses for {}", criteria.unit()),
            })?;
        check_still_terminal(criteria, pending)?;

        let copy_sql = sql.copy(criteria);
        let mut copy = sqlx::query(copy_sql)
            .bind(criteria.druid())
            .bind(criteria.datastream())
            .bind(criteria.version());
        if let Some(repository) = criteria.repository() {
            copy = copy.bind(repository);
        }
        let copied = copy
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::QueryFailed {
                query: copy_sql.to_string(),
                source: Box::new(e),
                context: format!("Failed to copy {} into archive", criteria.unit()),
            })?
            .rows_affected();

        let delete_sql = sql.delete(criteria);
        let mut delete = sqlx::query(delete_sql)
            .bind(criteria.druid())
            .bind(criteria.datastream());
        if let Some(repository) = criteria.repository() {
            delete = delete.bind(repository);
        }
        let deleted = delete
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::QueryFailed {
                query: delete_sql.to_string(),
                source: Box::new(e),
                context: format!("Failed to delete {} from workflow table", criteria.unit()),
            })?
            .rows_affected();

        check_moved_rows(criteria, copied, deleted)
    }
}

#[async_trait]
impl ArchiveStore for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn find_completed_units(&self) -> Result<Vec<UnitKey>> {
        let units = sqlx::query_as::<_, UnitKey>(&self.sql.find_completed)
            .fetch_all(&self.pool)
            .await?;
        Ok(units)
    }

    async fn archive_unit(&self, criteria: &ArchiveCriteria) -> Result<u64> {
        let mut conn = self.pool.acquire().await.map_err(|e| Error::ConnectionFailed {
            source: Box::new(e),
            context: "Failed to acquire connection from pool".into(),
        })?;

        let result = Self::move_unit(&mut conn, &self.sql, criteria).await;
        if result.is_err() {
            drop(conn.detach());
        }
        result
    }

    async fn execute_raw(&self, sql: &str) -> Result<()> {
        sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::QueryFailed {
                query: sql.to_string(),
                source: Box::new(e),
                context: "Failed to execute raw SQL".into(),
            })?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
