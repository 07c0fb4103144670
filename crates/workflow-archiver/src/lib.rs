//! # workflow-archiver
//!
//! **workflow-archiver** moves finished workflow-step rows out of the live
//! `workflow` table into `workflow_archive`, keeping the table the processing
//! robots poll small.
//!
//! ## Features
//!
//! - **Unit-atomic**: all rows of one (repository, druid, datastream) unit are
//!   copied and deleted in one transaction, or none are.
//! - **Versioned**: archived rows are stamped with the object's current version,
//!   fetched from the object registry, with version 1 for objects it does not know.
//! - **Bounded**: per-unit retry, a run-wide error budget and a batch cap keep a
//!   scheduled run short and predictable.
//! - **Bulk friendly**: archive-table indexes are dropped for the run and rebuilt
//!   afterwards.
//! - **PostgreSQL and SQLite** backends, picked from the DSN.
//!
//! ## Quick Start
//!
//! ```no_run
//! use workflow_archiver::{Config, WorkflowArchiver};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?.with_service_uri("https://dor.example.edu");
//! let report = WorkflowArchiver::connect(&config).await?.run().await?;
//! println!("Archived {} units with {} errors", report.archived, report.errors);
//! std::process::exit(report.status().exit_code());
//! # }
//! ```

pub mod archiver;
pub mod config;
pub mod criteria;
pub mod error;
pub mod index;
pub mod policy;
pub mod runner;
pub mod store;
pub mod types;
pub mod version;

pub use crate::archiver::WorkflowArchiver;
pub use crate::config::Config;
pub use crate::error::{Error, Result};
pub use crate::store::{AnyStore, ArchiveStore};
pub use crate::types::{
    ArchiveCriteria, ArchivedWorkflowStepRow, RunReport, RunStatus, UnitKey, UnitOutcome,
    UnitState, WorkflowStatus, WorkflowStepRow,
};
pub use crate::version::{HttpVersionService, VersionResolver, VersionService};
