//! Bidirectional reconciliation between the beads issue store and ClickUp.
//!
//! This module handles:
//! - Run coordination: exclusive lock, Pull strictly before Push, ledger commit
//! - Change detection by content fingerprint against the sync ledger
//! - Duplicate avoidance by title fallback matching
//! - Create-then-link with explicit recovery instructions when linking fails
//!
//! The ledger is written only when a run finishes with an empty error list;
//! otherwise the on-disk ledger is left exactly as it was.

pub mod decision;
pub mod fingerprint;
pub mod ledger;
pub mod lock;
pub mod mapping;
mod pull;
mod push;

pub use decision::{Decision, Direction, Reason, decide};
pub use ledger::SyncLedger;
pub use lock::RunLock;
pub use mapping::FieldMapper;

use crate::error::Result;
use crate::model::{LocalIssue, SyncResult};
use crate::remote::RemoteService;
use crate::storage::IssueStore;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Default `external_ref` prefix for ClickUp links.
pub const DEFAULT_REMOTE_TAG: &str = "clickup";

/// Prefix of the remote comment that carries a local close reason.
pub const CLOSE_COMMENT_PREFIX: &str = "[Closed]";

/// Per-run options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Remote list being reconciled.
    pub list_id: String,
    /// Prefix of `external_ref` values that point into this remote.
    pub remote_tag: String,
    /// Decide and count, but write nothing to either store or the ledger.
    pub dry_run: bool,
}

impl SyncOptions {
    #[must_use]
    pub fn new(list_id: impl Into<String>) -> Self {
        Self {
            list_id: list_id.into(),
            remote_tag: DEFAULT_REMOTE_TAG.to_string(),
            dry_run: false,
        }
    }

    #[must_use]
    pub fn with_remote_tag(mut self, tag: impl Into<String>) -> Self {
        self.remote_tag = tag.into();
        self
    }

    #[must_use]
    pub const fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Coordinator states, logged as a run progresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    LockAcquired,
    PullDone,
    PushDone,
    LockReleased,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::LockAcquired => "lock-acquired",
            Self::PullDone => "pull-done",
            Self::PushDone => "push-done",
            Self::LockReleased => "lock-released",
        };
        f.write_str(name)
    }
}

/// Reconciles one beads workspace against one remote list.
pub struct SyncEngine<'a, S: IssueStore + ?Sized, R: RemoteService + ?Sized> {
    store: &'a mut S,
    remote: &'a mut R,
    mapper: FieldMapper,
    options: SyncOptions,
    beads_dir: PathBuf,
    phase: RunPhase,
    /// Links made during a dry run, local id -> task id.
    virtual_links: HashMap<String, String>,
}

impl<'a, S: IssueStore + ?Sized, R: RemoteService + ?Sized> SyncEngine<'a, S, R> {
    pub fn new(
        store: &'a mut S,
        remote: &'a mut R,
        mapper: FieldMapper,
        options: SyncOptions,
        beads_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            remote,
            mapper,
            options,
            beads_dir: beads_dir.into(),
            phase: RunPhase::Idle,
            virtual_links: HashMap::new(),
        }
    }

    #[must_use]
    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    #[must_use]
    pub fn beads_dir(&self) -> &Path {
        &self.beads_dir
    }

    #[must_use]
    pub const fn phase(&self) -> RunPhase {
        self.phase
    }

    fn enter(&mut self, phase: RunPhase) {
        tracing::debug!(from = %self.phase, to = %phase, "sync phase");
        self.phase = phase;
    }

    /// Run one full reconciliation.
    ///
    /// Per-item failures are reported in the returned result, never as `Err`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SyncError::SyncInProgress`] if another run holds the
    /// lock, or an I/O error if the lock file cannot be created. Nothing is
    /// read from or written to either store in that case.
    pub fn run(&mut self) -> Result<SyncResult> {
        let lock = RunLock::acquire(&self.beads_dir)?;
        Ok(self.run_locked(lock))
    }

    /// Run one full reconciliation under a lock the caller already holds.
    ///
    /// Callers that must not touch the store before locking (opening a
    /// database can write to it) take the lock first and hand it over here.
    /// The lock is released when the run finishes.
    pub fn run_locked(&mut self, lock: RunLock) -> SyncResult {
        self.enter(RunPhase::LockAcquired);

        let mut ledger = SyncLedger::load(&self.beads_dir);
        let mut result = self.reconcile(&mut ledger);

        if self.options.dry_run {
            tracing::info!("dry run: sync state not saved");
        } else if result.has_errors() {
            tracing::warn!(
                errors = result.errors.len(),
                "sync state not saved; the next run re-evaluates from the last good state"
            );
        } else if let Err(err) = ledger.save(&self.beads_dir) {
            tracing::error!(error = %err, "failed to save sync state");
            result.errors.push(format!("Failed to save sync state: {err}"));
        }

        drop(lock);
        self.enter(RunPhase::LockReleased);
        result
    }

    /// Run Pull then Push against `ledger` without locking or persisting it.
    pub fn reconcile(&mut self, ledger: &mut SyncLedger) -> SyncResult {
        let mut result = SyncResult::default();
        self.virtual_links.clear();

        let snapshot = match self.remote.list_all_tasks(&self.options.list_id) {
            Ok(tasks) => tasks,
            Err(err) => {
                tracing::error!(list_id = %self.options.list_id, error = %err, "cannot list remote tasks");
                result.errors.push(format!(
                    "Failed to list remote tasks in list {}: {err}",
                    self.options.list_id
                ));
                return result;
            }
        };
        tracing::info!(count = snapshot.len(), list_id = %self.options.list_id, "fetched remote tasks");

        self.pull(&snapshot, ledger, &mut result);
        self.enter(RunPhase::PullDone);

        self.push(&snapshot, ledger, &mut result);
        self.enter(RunPhase::PushDone);

        result
    }

    /// Remote task id `issue` is linked to, including dry-run links.
    fn linked_task_id(&self, issue: &LocalIssue) -> Option<String> {
        issue
            .linked_task_id(&self.options.remote_tag)
            .map(str::to_string)
            .or_else(|| self.virtual_links.get(&issue.id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_builder() {
        let options = SyncOptions::new("901").with_remote_tag("cu").dry_run(true);
        assert_eq!(options.list_id, "901");
        assert_eq!(options.remote_tag, "cu");
        assert!(options.dry_run);
        assert_eq!(SyncOptions::new("1").remote_tag, DEFAULT_REMOTE_TAG);
    }

    #[test]
    fn phase_names() {
        assert_eq!(RunPhase::LockAcquired.to_string(), "lock-acquired");
        assert_eq!(RunPhase::PushDone.to_string(), "push-done");
    }
}
