//! Shared fixtures: a file-backed SQLite database with the workflow tables, row
//! seeding helpers and a scripted version service.
#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use workflow_archiver::store::{AnyStore, ArchiveStore};
use workflow_archiver::types::{ArchiveCriteria, ArchivedWorkflowStepRow, UnitKey, WorkflowStepRow};
use workflow_archiver::{Config, Error, Result, VersionService, WorkflowArchiver};

const CREATE_WORKFLOW: &str = r#"
    CREATE TABLE workflow (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        druid TEXT NOT NULL,
        datastream TEXT NOT NULL,
        process TEXT,
        status TEXT,
        error_msg TEXT,
        error_txt TEXT,
        datetime TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        attempts INTEGER DEFAULT 0,
        lifecycle TEXT,
        elapsed REAL,
        repository TEXT,
        note TEXT,
        priority INTEGER DEFAULT 0,
        lane_id TEXT DEFAULT 'default'
    )
"#;

const CREATE_WORKFLOW_ARCHIVE: &str = r#"
    CREATE TABLE workflow_archive (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        druid TEXT NOT NULL,
        datastream TEXT NOT NULL,
        process TEXT,
        status TEXT,
        error_msg TEXT,
        error_txt TEXT,
        datetime TIMESTAMP,
        attempts INTEGER,
        lifecycle TEXT,
        elapsed REAL,
        repository TEXT,
        note TEXT,
        priority INTEGER,
        lane_id TEXT,
        version INTEGER NOT NULL,
        archive_dt TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )
"#;

/// A scratch database living in a temporary directory.
pub struct TestDb {
    _dir: TempDir,
    pub dsn: String,
    pub pool: SqlitePool,
}

impl TestDb {
    /// Create the database with both tables and the two archive indexes.
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let dsn = format!("sqlite://{}", dir.path().join("workflow.db").display());
        let options = SqliteConnectOptions::from_str(&dsn)
            .expect("Invalid sqlite DSN")
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .expect("Failed to open test database");

        for sql in [
            CREATE_WORKFLOW,
            CREATE_WORKFLOW_ARCHIVE,
            "CREATE INDEX ds_wf_ar_bitmap_idx ON workflow_archive (datastream)",
            "CREATE INDEX repo_wf_ar_bitmap_idx ON workflow_archive (repository)",
        ] {
            sqlx::query(sql)
                .execute(&pool)
                .await
                .expect("Failed to create schema");
        }

        Self {
            _dir: dir,
            dsn,
            pool,
        }
    }

    /// Config for this database with no retry delay.
    pub fn config(&self) -> Config {
        Config::from_dsn(self.dsn.clone())
            .with_service_uri("http://localhost:1")
            .with_retry_delay(0)
    }

    pub async fn insert_step(
        &self,
        repository: Option<&str>,
        druid: &str,
        datastream: &str,
        process: &str,
        status: &str,
    ) {
        sqlx::query(
            "INSERT INTO workflow (repository, druid, datastream, process, status, lifecycle, elapsed, note)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(repository)
        .bind(druid)
        .bind(datastream)
        .bind(process)
        .bind(status)
        .bind("registered")
        .bind(0.25_f64)
        .bind(format!("{} {}", process, status))
        .execute(&self.pool)
        .await
        .expect("Failed to insert workflow step");
    }

    /// Insert one step per (process, status) pair for a unit.
    pub async fn insert_unit(
        &self,
        repository: Option<&str>,
        druid: &str,
        datastream: &str,
        steps: &[(&str, &str)],
    ) {
        for (process, status) in steps {
            self.insert_step(repository, druid, datastream, process, status)
                .await;
        }
    }

    /// Insert `count` completed single-step units in one transaction.
    pub async fn insert_completed_units(&self, count: usize) {
        let mut tx = self.pool.begin().await.expect("Failed to begin");
        for i in 0..count {
            sqlx::query(
                "INSERT INTO workflow (druid, datastream, process, status) VALUES ($1, 'accessionWF', 'start-accession', 'completed')",
            )
            .bind(format!("druid:bulk{:04}", i))
            .execute(&mut *tx)
            .await
            .expect("Failed to insert bulk unit");
        }
        tx.commit().await.expect("Failed to commit");
    }

    pub async fn active_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM workflow")
            .fetch_one(&self.pool)
            .await
            .expect("Failed to count active rows")
    }

    pub async fn active_count_for(&self, druid: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM workflow WHERE druid = $1")
            .bind(druid)
            .fetch_one(&self.pool)
            .await
            .expect("Failed to count active rows")
    }

    pub async fn archive_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM workflow_archive")
            .fetch_one(&self.pool)
            .await
            .expect("Failed to count archived rows")
    }

    pub async fn active_rows(&self, druid: &str) -> Vec<WorkflowStepRow> {
        sqlx::query_as::<_, WorkflowStepRow>("SELECT * FROM workflow WHERE druid = $1 ORDER BY id")
            .bind(druid)
            .fetch_all(&self.pool)
            .await
            .expect("Failed to read active rows")
    }

    pub async fn archived_rows(&self, druid: &str) -> Vec<ArchivedWorkflowStepRow> {
        sqlx::query_as::<_, ArchivedWorkflowStepRow>(
            "SELECT * FROM workflow_archive WHERE druid = $1 ORDER BY id",
        )
        .bind(druid)
        .fetch_all(&self.pool)
        .await
        .expect("Failed to read archived rows")
    }

    pub async fn index_names(&self) -> Vec<String> {
        sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = 'workflow_archive' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .expect("Failed to list indexes")
    }

    /// Make every delete of a matching druid abort after its copy succeeded.
    pub async fn fail_deletes_like(&self, pattern: &str) {
        let sql = format!(
            "CREATE TRIGGER fail_delete BEFORE DELETE ON workflow WHEN OLD.druid LIKE '{}' BEGIN SELECT RAISE(ABORT, 'injected delete failure'); END",
            pattern
        );
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .expect("Failed to create trigger");
    }

    pub async fn store(&self, config: &Config) -> AnyStore {
        AnyStore::connect(config).await.expect("Failed to connect store")
    }

    pub async fn archiver(
        &self,
        config: Config,
        versions: FakeVersions,
    ) -> WorkflowArchiver<AnyStore> {
        let store = self.store(&config).await;
        WorkflowArchiver::new(store, Arc::new(versions), config)
    }
}

/// What the scripted version service answers for a druid.
#[derive(Debug, Clone)]
pub enum Answer {
    Version(&'static str),
    NotFound,
    Broken,
}

/// Version service answering from a fixed script.
#[derive(Debug)]
pub struct FakeVersions {
    answers: HashMap<String, Answer>,
    default: Answer,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeVersions {
    pub fn always(answer: Answer) -> Self {
        Self {
            answers: HashMap::new(),
            default: answer,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with(mut self, druid: &str, answer: Answer) -> Self {
        self.answers.insert(druid.to_string(), answer);
        self
    }

    /// Shared log of the druids looked up.
    pub fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl VersionService for FakeVersions {
    async fn current_version(&self, druid: &str) -> Result<String> {
        self.calls.lock().unwrap().push(druid.to_string());
        match self.answers.get(druid).unwrap_or(&self.default) {
            Answer::Version(v) => Ok(v.to_string()),
            Answer::NotFound => Err(Error::VersionNotFound {
                druid: druid.to_string(),
                message: format!("500 Internal Server Error: Unable to find '{}' in fedora", druid),
            }),
            Answer::Broken => Err(Error::VersionLookup {
                druid: druid.to_string(),
                message: "503 Service Unavailable".to_string(),
            }),
        }
    }
}

/// Store wrapper counting archive attempts per druid and logging raw statements.
///
/// Clones share their counters, so a test can keep one while the archiver
/// owns another.
#[derive(Clone)]
pub struct CountingStore<S> {
    inner: S,
    attempts: Arc<Mutex<HashMap<String, u32>>>,
    total: Arc<AtomicU32>,
    raw: Arc<Mutex<Vec<String>>>,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            attempts: Arc::new(Mutex::new(HashMap::new())),
            total: Arc::new(AtomicU32::new(0)),
            raw: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn attempts_for(&self, druid: &str) -> u32 {
        self.attempts.lock().unwrap().get(druid).copied().unwrap_or(0)
    }

    pub fn total_attempts(&self) -> u32 {
        self.total.load(Ordering::SeqCst)
    }

    pub fn raw_statements(&self) -> Vec<String> {
        self.raw.lock().unwrap().clone()
    }
}

#[async_trait]
impl<S: ArchiveStore> ArchiveStore for CountingStore<S> {
    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    async fn find_completed_units(&self) -> Result<Vec<UnitKey>> {
        self.inner.find_completed_units().await
    }

    async fn archive_unit(&self, criteria: &ArchiveCriteria) -> Result<u64> {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(criteria.druid().to_string())
            .or_insert(0) += 1;
        self.total.fetch_add(1, Ordering::SeqCst);
        self.inner.archive_unit(criteria).await
    }

    async fn execute_raw(&self, sql: &str) -> Result<()> {
        self.raw.lock().unwrap().push(sql.to_string());
        self.inner.execute_raw(sql).await
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}
