//! Per-unit transaction protocol with bounded retry.
//!
//! [`ArchiveTransactionRunner::archive_unit`] drives one unit through
//! `Pending → Attempting → Committed | RolledBack`, retrying rolled-back
//! attempts until the [`RetryPolicy`] gives up and the unit is abandoned.
//! [`ArchiveTransactionRunner::run`] processes work items one at a time and
//! stops early once the [`ErrorBudget`] is exhausted.
use crate::error::{Error, Result};
use crate::policy::{ErrorBudget, RetryPolicy};
use crate::store::ArchiveStore;
use crate::types::{ArchiveCriteria, UnitOutcome, UnitState};

/// Result of one copy+delete+commit attempt.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// Committed; carries the number of rows moved
    Success(u64),
    /// Rolled back, another attempt may succeed
    TransientFailure(Error),
    /// Rolled back, retrying cannot help
    PermanentFailure(Error),
}

impl From<Result<u64>> for AttemptOutcome {
    fn from(result: Result<u64>) -> Self {
        match result {
            Ok(rows) => AttemptOutcome::Success(rows),
            Err(e) if e.is_transient() => AttemptOutcome::TransientFailure(e),
            Err(e) => AttemptOutcome::PermanentFailure(e),
        }
    }
}

/// Counts produced by one pass of the runner over its work items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub archived: usize,
    pub errors: usize,
    pub rows_archived: u64,
    pub not_attempted: usize,
    pub halted: bool,
}

pub struct ArchiveTransactionRunner<'a, S: ArchiveStore + ?Sized> {
    store: &'a S,
    policy: RetryPolicy,
    error_budget: u32,
}

impl<'a, S: ArchiveStore + ?Sized> ArchiveTransactionRunner<'a, S> {
    pub fn new(store: &'a S, policy: RetryPolicy, error_budget: u32) -> Self {
        Self {
            store,
            policy,
            error_budget,
        }
    }

    /// Archive every item in order until done or the error budget runs out.
    pub async fn run(&self, items: &[ArchiveCriteria]) -> BatchOutcome {
        let mut budget = ErrorBudget::new(self.error_budget);
        let mut outcome = BatchOutcome::default();

        for (position, criteria) in items.iter().enumerate() {
            match self.archive_unit(criteria).await {
                UnitOutcome::Committed { rows, .. } => {
                    outcome.archived += 1;
                    outcome.rows_archived += rows;
                }
                UnitOutcome::Abandoned { .. } => {
                    outcome.errors += 1;
                    if budget.record_failure() {
                        tracing::error!("Too many errors. Archiving halted");
                        outcome.halted = true;
                        outcome.not_attempted = items.len() - position - 1;
                        break;
                    }
                }
            }
        }

        outcome
    }

    /// Move one unit into the archive, retrying rolled-back attempts.
    pub async fn archive_unit(&self, criteria: &ArchiveCriteria) -> UnitOutcome {
        let unit = criteria.unit();
        let mut state = UnitState::Pending;
        let mut attempts = 0;

        loop {
            advance(&mut state, UnitState::Attempting);
            attempts += 1;
            tracing::info!(
                druid = %unit.druid,
                datastream = %unit.datastream,
                repository = ?unit.repository,
                attempt = attempts,
                "Archiving {} at version {}",
                unit,
                criteria.version()
            );

            match AttemptOutcome::from(self.store.archive_unit(criteria).await) {
                AttemptOutcome::Success(rows) => {
                    advance(&mut state, UnitState::Committed);
                    tracing::debug!("Archived {} rows for {}", rows, unit);
                    return UnitOutcome::Committed { rows, attempts };
                }
                AttemptOutcome::TransientFailure(e) if self.policy.should_retry(attempts) => {
                    advance(&mut state, UnitState::RolledBack);
                    tracing::warn!(
                        attempt = attempts,
                        "Attempt {} for {} failed: {}. Retrying in {:?}",
                        attempts,
                        unit,
                        e,
                        self.policy.delay
                    );
                    tokio::time::sleep(self.policy.delay).await;
                }
                AttemptOutcome::TransientFailure(e) | AttemptOutcome::PermanentFailure(e) => {
                    advance(&mut state, UnitState::RolledBack);
                    advance(&mut state, UnitState::Abandoned);
                    tracing::error!(
                        attempt = attempts,
                        "Giving up on {} after {} attempt(s): {}",
                        unit,
                        attempts,
                        e
                    );
                    return UnitOutcome::Abandoned {
                        attempts,
                        last_error: e.to_string(),
                    };
                }
            }
        }
    }
}

fn advance(state: &mut UnitState, next: UnitState) {
    debug_assert!(
        state.can_transition_to(next),
        "illegal unit transition {} -> {}",
        state,
        next
    );
    *state = next;
}
