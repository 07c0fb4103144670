//! Data model for workflow archiving.
//!
//! Rows are read from the active workflow table, grouped into units by
//! (repository, druid, datastream), and moved into the archive table once every
//! step of the unit is done.
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use tabled::Tabled;

/// Status of one workflow step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Waiting for a robot to pick the step up
    Waiting,
    /// Handed to a robot queue
    Queued,
    /// A robot is running the step
    Started,
    /// Step finished successfully
    Completed,
    /// Step was not needed for this object
    Skipped,
    /// Step failed
    Error,
    /// Step is held for manual intervention
    Hold,
}

impl WorkflowStatus {
    /// Statuses after which a step will not change again.
    pub const TERMINAL: [WorkflowStatus; 2] = [WorkflowStatus::Completed, WorkflowStatus::Skipped];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Waiting => "waiting",
            WorkflowStatus::Queued => "queued",
            WorkflowStatus::Started => "started",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Skipped => "skipped",
            WorkflowStatus::Error => "error",
            WorkflowStatus::Hold => "hold",
        }
    }

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(WorkflowStatus::Waiting),
            "queued" => Ok(WorkflowStatus::Queued),
            "started" => Ok(WorkflowStatus::Started),
            "completed" => Ok(WorkflowStatus::Completed),
            "skipped" => Ok(WorkflowStatus::Skipped),
            "error" => Ok(WorkflowStatus::Error),
            "hold" => Ok(WorkflowStatus::Hold),
            _ => Err(format!("Invalid workflow status: {}", s)),
        }
    }
}

/// One workflow step as stored in the active table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct WorkflowStepRow {
    pub id: i64,
    pub repository: Option<String>,
    pub druid: String,
    pub datastream: String,
    pub process: Option<String>,
    pub status: Option<String>,
    pub error_msg: Option<String>,
    pub error_txt: Option<String>,
    pub datetime: Option<NaiveDateTime>,
    pub attempts: Option<i32>,
    pub lifecycle: Option<String>,
    pub elapsed: Option<f64>,
    pub note: Option<String>,
    pub priority: Option<i32>,
    pub lane_id: Option<String>,
}

/// One workflow step after it has been moved to the archive table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct ArchivedWorkflowStepRow {
    pub id: i64,
    pub repository: Option<String>,
    pub druid: String,
    pub datastream: String,
    pub process: Option<String>,
    pub status: Option<String>,
    pub error_msg: Option<String>,
    pub error_txt: Option<String>,
    pub datetime: Option<NaiveDateTime>,
    pub attempts: Option<i32>,
    pub lifecycle: Option<String>,
    pub elapsed: Option<f64>,
    pub note: Option<String>,
    pub priority: Option<i32>,
    pub lane_id: Option<String>,
    pub version: i32,
    pub archive_dt: Option<NaiveDateTime>,
}

fn display_repository(repository: &Option<String>) -> String {
    repository.clone().unwrap_or_else(|| "-".to_string())
}

/// Key of one workflow instance: every row sharing it is archived together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Tabled, sqlx::FromRow)]
pub struct UnitKey {
    #[tabled(display_with = "display_repository")]
    pub repository: Option<String>,
    pub druid: String,
    pub datastream: String,
}

impl UnitKey {
    pub fn new<D: Into<String>, S: Into<String>>(
        repository: Option<String>,
        druid: D,
        datastream: S,
    ) -> Self {
        Self {
            repository,
            druid: druid.into(),
            datastream: datastream.into(),
        }
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repository {
            Some(repository) => write!(f, "{}:{}/{}", repository, self.druid, self.datastream),
            None => write!(f, "{}/{}", self.druid, self.datastream),
        }
    }
}

/// Work item for the transaction runner: a unit key with its resolved version.
///
/// Built once per run and never persisted. Fields are private so the version
/// cannot change after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveCriteria {
    unit: UnitKey,
    version: i32,
}

impl ArchiveCriteria {
    pub fn new(unit: UnitKey, version: i32) -> Self {
        Self { unit, version }
    }

    pub fn unit(&self) -> &UnitKey {
        &self.unit
    }

    pub fn repository(&self) -> Option<&str> {
        self.unit.repository.as_deref()
    }

    pub fn druid(&self) -> &str {
        &self.unit.druid
    }

    pub fn datastream(&self) -> &str {
        &self.unit.datastream
    }

    pub fn version(&self) -> i32 {
        self.version
    }
}

/// Lifecycle of one unit inside the transaction runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    /// Not attempted yet
    Pending,
    /// A transaction is in flight
    Attempting,
    /// Rows copied, deleted and committed
    Committed,
    /// The last attempt was rolled back
    RolledBack,
    /// Given up after exhausting attempts
    Abandoned,
}

impl UnitState {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: UnitState) -> bool {
        matches!(
            (self, next),
            (UnitState::Pending, UnitState::Attempting)
                | (UnitState::Attempting, UnitState::Committed)
                | (UnitState::Attempting, UnitState::RolledBack)
                | (UnitState::RolledBack, UnitState::Attempting)
                | (UnitState::RolledBack, UnitState::Abandoned)
        )
    }

}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitState::Pending => "pending",
            UnitState::Attempting => "attempting",
            UnitState::Committed => "committed",
            UnitState::RolledBack => "rolled_back",
            UnitState::Abandoned => "abandoned",
        };
        f.write_str(s)
    }
}

/// Final result of archiving one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    Committed { rows: u64, attempts: u32 },
    Abandoned { attempts: u32, last_error: String },
}

impl UnitOutcome {
    pub fn state(&self) -> UnitState {
        match self {
            UnitOutcome::Committed { .. } => UnitState::Committed,
            UnitOutcome::Abandoned { .. } => UnitState::Abandoned,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            UnitOutcome::Committed { attempts, .. } | UnitOutcome::Abandoned { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// How a run ended, mapped onto the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No candidate units were found
    NothingToArchive,
    /// Every selected unit was archived
    Clean,
    /// Some units were skipped or abandoned, but the error budget held
    Partial,
    /// The error budget was exhausted and the run stopped early
    Halted,
}

impl RunStatus {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::NothingToArchive | RunStatus::Clean => 0,
            RunStatus::Partial => 2,
            RunStatus::Halted => 3,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::NothingToArchive => "nothing_to_archive",
            RunStatus::Clean => "clean",
            RunStatus::Partial => "partial",
            RunStatus::Halted => "halted",
        };
        f.write_str(s)
    }
}

/// Counts accumulated by one archive run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Tabled)]
pub struct RunReport {
    /// Candidate units discovered
    pub found: usize,
    /// Units selected after applying the batch limit
    pub selected: usize,
    /// Units dropped because their version could not be resolved
    pub skipped: usize,
    /// Units committed
    pub archived: usize,
    /// Units abandoned after exhausting their attempts
    pub errors: usize,
    /// Rows moved into the archive table
    pub rows_archived: u64,
    /// Work items never attempted because the run halted
    pub not_attempted: usize,
    /// Whether the error budget stopped the run
    pub halted: bool,
}

impl RunReport {
    pub fn status(&self) -> RunStatus {
        if self.found == 0 {
            RunStatus::NothingToArchive
        } else if self.halted {
            RunStatus::Halted
        } else if self.errors > 0 || self.skipped > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Clean
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RunReport {{ found: {}, selected: {}, skipped: {}, archived: {}, errors: {}, rows: {}, halted: {} }}",
            self.found,
            self.selected,
            self.skipped,
            self.archived,
            self.errors,
            self.rows_archived,
            self.halted
        )
    }
}
