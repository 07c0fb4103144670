//! Database access for the workflow and archive tables.
//!
//! This module defines the [`ArchiveStore`] trait, the seam between the archiving
//! pipeline and the database, plus its PostgreSQL and SQLite implementations.
//!
//! ## What
//!
//! - [`ArchiveStore::find_completed_units`] discovers units whose steps are all done.
//! - [`ArchiveStore::archive_unit`] copies one unit into the archive table and deletes
//!   it from the active table in a single transaction.
//! - [`ArchiveStore::execute_raw`] runs maintenance statements such as index DDL.
//! - [`AnyStore`] selects the backend at runtime from the DSN.
//!
//! ## How
//!
//! ```no_run
//! # use workflow_archiver::config::Config;
//! # use workflow_archiver::store::{AnyStore, ArchiveStore};
//! # async fn example() -> workflow_archiver::Result<()> {
//! let config = Config::from_dsn("postgresql://wf@localhost/workflow");
//! let store = AnyStore::connect(&config).await?;
//! let units = store.find_completed_units().await?;
//! println!("{} units ready", units.len());
//! store.close().await;
//! # Ok(())
//! # }
//! ```
use crate::error::{Error, Result};
use crate::types::{ArchiveCriteria, UnitKey, WorkflowStatus};
use async_trait::async_trait;

pub mod any;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use any::AnyStore;

/// Database backend, detected from the DSN scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    #[cfg(feature = "postgres")]
    Postgres,
    #[cfg(feature = "sqlite")]
    Sqlite,
}

impl BackendType {
    /// Detect the backend for a DSN.
    ///
    /// - `postgres://` or `postgresql://` → PostgreSQL
    /// - `sqlite:` → SQLite
    pub fn detect(dsn: &str) -> Result<Self> {
        #[cfg(feature = "postgres")]
        if dsn.starts_with("postgres://") || dsn.starts_with("postgresql://") {
            return Ok(BackendType::Postgres);
        }
        #[cfg(feature = "sqlite")]
        if dsn.starts_with("sqlite:") {
            return Ok(BackendType::Sqlite);
        }
        Err(Error::InvalidConfig {
            field: "dsn".to_string(),
            message: format!("Unsupported or disabled database backend for DSN '{}'", dsn),
        })
    }
}

/// Storage operations needed by one archive run.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Short backend name, e.g. "postgres".
    fn backend_name(&self) -> &'static str;

    /// Distinct unit keys whose rows are all completed or skipped.
    ///
    /// Read-only. Errors propagate as-is; discovery is never retried.
    async fn find_completed_units(&self) -> Result<Vec<UnitKey>>;

    /// Copy every active row of the unit into the archive table, stamped with the
    /// criteria's version, then delete them, then commit.
    ///
    /// Returns the number of rows moved. On error nothing has been changed.
    async fn archive_unit(&self, criteria: &ArchiveCriteria) -> Result<u64>;

    /// Execute a statement without parameters.
    async fn execute_raw(&self, sql: &str) -> Result<()>;

    /// Close the underlying pool.
    async fn close(&self);
}

// SQL templates shared by every backend. `$n` placeholders work for both
// PostgreSQL and SQLite.
const FIND_COMPLETED_UNITS: &str = r#"
    SELECT repository, druid, datastream
    FROM {WORKFLOW_TABLE}
    GROUP BY repository, druid, datastream
    HAVING SUM(CASE WHEN status IN ({TERMINAL_STATUSES}) THEN 0 ELSE 1 END) = 0
    ORDER BY druid, datastream
"#;

const COPY_UNIT: &str = r#"
    INSERT INTO {ARCHIVE_TABLE} (
        druid, datastream, process, status, error_msg, error_txt, datetime,
        attempts, lifecycle, elapsed, repository, note, priority, lane_id, version
    )
    SELECT
        w.druid, w.datastream, w.process, w.status, w.error_msg, w.error_txt, w.datetime,
        w.attempts, w.lifecycle, w.elapsed, w.repository, w.note, w.priority, w.lane_id,
        CAST($3 AS INTEGER)
    FROM {WORKFLOW_TABLE} w
    WHERE w.druid = $1
      AND w.datastream = $2
      AND w.status IN ({TERMINAL_STATUSES})
"#;

const DELETE_UNIT: &str = r#"
    DELETE FROM {WORKFLOW_TABLE}
    WHERE druid = $1
      AND datastream = $2
      AND status IN ({TERMINAL_STATUSES})
"#;

// Steps of a unit that were reopened after discovery.
const COUNT_PENDING_STEPS: &str = r#"
    SELECT COUNT(*)
    FROM {WORKFLOW_TABLE}
    WHERE druid = $1
      AND datastream = $2
      AND (status IS NULL OR status NOT IN ({TERMINAL_STATUSES}))
"#;

/// Statements for one pair of workflow/archive tables, rendered once per store.
///
/// A NULL repository never matches `repository = $n`, so units without a
/// repository get their own `IS NULL` variants.
#[derive(Debug, Clone)]
pub(crate) struct UnitStatements {
    pub find_completed: String,
    copy_with_repository: String,
    copy_without_repository: String,
    delete_with_repository: String,
    delete_without_repository: String,
    pending_with_repository: String,
    pending_without_repository: String,
}

impl UnitStatements {
    pub fn new(workflow_table: &str, archive_table: &str) -> Self {
        let terminal = WorkflowStatus::TERMINAL
            .iter()
            .map(|status| format!("'{}'", status.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        let render = |template: &str| {
            template
                .replace("{WORKFLOW_TABLE}", workflow_table)
                .replace("{ARCHIVE_TABLE}", archive_table)
                .replace("{TERMINAL_STATUSES}", &terminal)
        };

        let copy = render(COPY_UNIT);
        let delete = render(DELETE_UNIT);
        let pending = render(COUNT_PENDING_STEPS);
        Self {
            find_completed: render(FIND_COMPLETED_UNITS),
            copy_with_repository: format!("{}      AND w.repository = $4", copy),
            copy_without_repository: format!("{}      AND w.repository IS NULL", copy),
            delete_with_repository: format!("{}      AND repository = $3", delete),
            delete_without_repository: format!("{}      AND repository IS NULL", delete),
            pending_with_repository: format!("{}      AND repository = $3", pending),
            pending_without_repository: format!("{}      AND repository IS NULL", pending),
        }
    }

    /// Copy statement. Binds: druid, datastream, version, then repository if present.
    pub fn copy(&self, criteria: &ArchiveCriteria) -> &str {
        match criteria.repository() {
            Some(_) => &self.copy_with_repository,
            None => &self.copy_without_repository,
        }
    }

    /// Count of non-terminal steps. Binds: druid, datastream, then repository if present.
    pub fn pending(&self, criteria: &ArchiveCriteria) -> &str {
        match criteria.repository() {
            Some(_) => &self.pending_with_repository,
            None => &self.pending_without_repository,
        }
    }

    /// Delete statement. Binds: druid, datastream, then repository if present.
    pub fn delete(&self, criteria: &ArchiveCriteria) -> &str {
        match criteria.repository() {
            Some(_) => &self.delete_with_repository,
            None => &self.delete_without_repository,
        }
    }
}

/// Refuse to move a unit that has steps outside the terminal set.
pub(crate) fn check_still_terminal(criteria: &ArchiveCriteria, pending: i64) -> Result<()> {
    if pending > 0 {
        return Err(Error::UnitNotTerminal {
            unit: criteria.unit().to_string(),
            pending,
        });
    }
    Ok(())
}

/// Check the row counts of a copy/delete pair before committing.
pub(crate) fn check_moved_rows(criteria: &ArchiveCriteria, copied: u64, deleted: u64) -> Result<u64> {
    if copied == 0 {
        return Err(Error::NoRowsCopied {
            unit: criteria.unit().to_string(),
        });
    }
    if deleted != copied {
        return Err(Error::RowCountMismatch {
            unit: criteria.unit().to_string(),
            copied,
            deleted,
        });
    }
    Ok(copied)
}
