//! AnyStore enum for runtime backend selection.
//!
//! This module provides the `AnyStore` enum which wraps the database backend
//! implementations and provides a unified interface via the [`ArchiveStore`] trait.

use super::*;
use crate::config::Config;
#[cfg(feature = "postgres")]
use crate::store::postgres::PostgresStore;
#[cfg(feature = "sqlite")]
use crate::store::sqlite::SqliteStore;

/// Runtime-selectable database backend.
#[derive(Clone, Debug)]
pub enum AnyStore {
    /// PostgreSQL backend
    #[cfg(feature = "postgres")]
    Postgres(PostgresStore),
    /// SQLite backend
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteStore),
}

impl AnyStore {
    /// Connect to the database named by `config.dsn`.
    ///
    /// The DSN scheme picks the backend; pool size, connection timeout and
    /// table names come from the rest of the configuration.
    pub async fn connect(config: &Config) -> Result<Self> {
        let backend = BackendType::detect(&config.dsn)?;
        tracing::debug!("Connecting to {:?} backend", backend);

        match backend {
            #[cfg(feature = "postgres")]
            BackendType::Postgres => Ok(AnyStore::Postgres(PostgresStore::connect(config).await?)),
            #[cfg(feature = "sqlite")]
            BackendType::Sqlite => Ok(AnyStore::Sqlite(SqliteStore::connect(config).await?)),
        }
    }
}

#[async_trait]
impl ArchiveStore for AnyStore {
    fn backend_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "postgres")]
            AnyStore::Postgres(s) => s.backend_name(),
            #[cfg(feature = "sqlite")]
            AnyStore::Sqlite(s) => s.backend_name(),
        }
    }

    async fn find_completed_units(&self) -> Result<Vec<UnitKey>> {
        match self {
            #[cfg(feature = "postgres")]
            AnyStore::Postgres(s) => s.find_completed_units().await,
            #[cfg(feature = "sqlite")]
            AnyStore::Sqlite(s) => s.find_completed_units().await,
        }
    }

    async fn archive_unit(&self, criteria: &ArchiveCriteria) -> Result<u64> {
        match self {
            #[cfg(feature = "postgres")]
            AnyStore::Postgres(s) => s.archive_unit(criteria).await,
            #[cfg(feature = "sqlite")]
            AnyStore::Sqlite(s) => s.archive_unit(criteria).await,
        }
    }

    async fn execute_raw(&self, sql: &str) -> Result<()> {
        match self {
            #[cfg(feature = "postgres")]
            AnyStore::Postgres(s) => s.execute_raw(sql).await,
            #[cfg(feature = "sqlite")]
            AnyStore::Sqlite(s) => s.execute_raw(sql).await,
        }
    }

    async fn close(&self) {
        match self {
            #[cfg(feature = "postgres")]
            AnyStore::Postgres(s) => s.close().await,
            #[cfg(feature = "sqlite")]
            AnyStore::Sqlite(s) => s.close().await,
        }
    }
}
