//! Batch orchestration for one archive run.
//!
//! ## What
//!
//! [`WorkflowArchiver`] ties the pipeline together: discovery, the batch cap,
//! version resolution, index suspension and the transaction runner. It returns a
//! [`RunReport`] and always closes the store before returning.
//!
//! ## How
//!
//! ```no_run
//! # use workflow_archiver::{Config, WorkflowArchiver};
//! # async fn example() -> workflow_archiver::Result<()> {
//! let config = Config::from_dsn("postgresql://wf@localhost/workflow")
//!     .with_service_uri("https://dor.example.edu");
//! let archiver = WorkflowArchiver::connect(&config).await?;
//! let report = archiver.run().await?;
//! println!("{}", report);
//! # Ok(())
//! # }
//! ```
use crate::config::Config;
use crate::criteria::CriteriaBuilder;
use crate::error::Result;
use crate::index::IndexSuspender;
use crate::policy::RetryPolicy;
use crate::runner::ArchiveTransactionRunner;
use crate::store::{AnyStore, ArchiveStore};
use crate::types::{RunReport, UnitKey};
use crate::version::{HttpVersionService, VersionResolver, VersionService};
use std::sync::Arc;
use std::time::Duration;

pub struct WorkflowArchiver<S: ArchiveStore = AnyStore> {
    store: S,
    resolver: VersionResolver,
    config: Config,
}

impl WorkflowArchiver<AnyStore> {
    /// Validate the configuration, open the database pool and build the HTTP
    /// version client.
    pub async fn connect(config: &Config) -> Result<Self> {
        config.validate()?;
        let service = HttpVersionService::new(
            config.require_service_uri()?,
            Duration::from_secs(config.service_timeout_seconds),
        )?;
        let store = AnyStore::connect(config).await?;
        tracing::debug!("Connected to {} backend", store.backend_name());
        Ok(Self::new(store, Arc::new(service), config.clone()))
    }
}

impl<S: ArchiveStore> WorkflowArchiver<S> {
    pub fn new(store: S, service: Arc<dyn VersionService>, config: Config) -> Self {
        Self {
            store,
            resolver: VersionResolver::new(service),
            config,
        }
    }

    /// Units currently eligible for archiving. Read-only.
    pub async fn candidates(&self) -> Result<Vec<UnitKey>> {
        self.store.find_completed_units().await
    }

    /// Archive one batch and close the store.
    ///
    /// Returns an error only when discovery fails; per-unit failures are
    /// counted in the report.
    pub async fn run(self) -> Result<RunReport> {
        let result = self.archive_batch().await;
        self.store.close().await;
        result
    }

    /// Close the store without running.
    pub async fn close(self) {
        self.store.close().await;
    }

    async fn archive_batch(&self) -> Result<RunReport> {
        let mut report = RunReport::default();

        let mut units = self.store.find_completed_units().await?;
        report.found = units.len();
        if units.is_empty() {
            tracing::info!("Nothing to archive");
            return Ok(report);
        }
        tracing::info!("Found {} completed workflows", units.len());

        if units.len() > self.config.batch_limit {
            tracing::info!(
                "Limiting this run to {} of {} workflows",
                self.config.batch_limit,
                units.len()
            );
            units.truncate(self.config.batch_limit);
        }
        report.selected = units.len();

        let (items, skipped) = CriteriaBuilder::new(self.resolver.clone()).build(units).await;
        report.skipped = skipped;

        let runner = ArchiveTransactionRunner::new(
            &self.store,
            RetryPolicy::from_config(&self.config),
            self.config.error_budget,
        );
        let suspender = IndexSuspender::new(
            &self.store,
            &self.config.archive_table,
            &self.config.archive_indexes,
            self.config.suspend_indexes,
        );
        let batch = suspender.around(runner.run(&items)).await;

        report.archived = batch.archived;
        report.errors = batch.errors;
        report.rows_archived = batch.rows_archived;
        report.not_attempted = batch.not_attempted;
        report.halted = batch.halted;

        tracing::info!(
            "DONE! Processed {} objects with {} errors",
            report.archived,
            report.errors
        );
        Ok(report)
    }
}
