//! Pull stage: remote tasks into the local issue store.

use super::SyncEngine;
use crate::error::Result;
use crate::model::{
    IssueUpdate, LocalIssue, NewIssue, RemoteTask, Status, SyncResult, external_ref_for,
    normalize_title,
};
use crate::remote::RemoteService;
use crate::storage::IssueStore;
use crate::sync::decision::{Direction, decide};
use crate::sync::fingerprint::task_fingerprint;
use crate::sync::ledger::SyncLedger;
use crate::sync::mapping::issue_type_from_tags;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PullOutcome {
    Created,
    Updated { conflict: bool },
    Linked,
    Skipped,
}

impl<S: IssueStore + ?Sized, R: RemoteService + ?Sized> SyncEngine<'_, S, R> {
    pub(super) fn pull(
        &mut self,
        tasks: &[RemoteTask],
        ledger: &mut SyncLedger,
        result: &mut SyncResult,
    ) {
        let issues = match self.store.list_issues(true) {
            Ok(issues) => issues,
            Err(err) => {
                tracing::error!(error = %err, "cannot list local issues; pull skipped");
                result
                    .errors
                    .push(format!("Failed to list local issues for pull: {err}"));
                return;
            }
        };

        let tag = self.options.remote_tag.clone();
        let mut by_task: HashMap<String, LocalIssue> = HashMap::new();
        let mut unlinked: HashMap<String, VecDeque<LocalIssue>> = HashMap::new();
        for issue in issues {
            if let Some(task_id) = issue.linked_task_id(&tag) {
                by_task.insert(task_id.to_string(), issue);
            } else if issue.external_ref.is_none() {
                unlinked
                    .entry(normalize_title(&issue.title))
                    .or_default()
                    .push_back(issue);
            }
        }
        tracing::debug!(linked = by_task.len(), "indexed local issues by remote id");

        for task in tasks {
            let outcome = match by_task.get(&task.id) {
                Some(local) => self.pull_matched(local, task, ledger),
                None => match take_title_match(&mut unlinked, &task.name) {
                    Some(local) => self.link_by_title(&local, task, ledger),
                    None => self.create_from_task(task, ledger),
                },
            };

            match outcome {
                Ok(PullOutcome::Created) => result.pulled_created += 1,
                Ok(PullOutcome::Updated { conflict }) => {
                    result.pulled_updated += 1;
                    if conflict {
                        if let Some(local) = by_task.get(&task.id) {
                            result.conflicts.push(local.id.clone());
                        }
                    }
                }
                Ok(PullOutcome::Linked) => result.pulled_linked += 1,
                Ok(PullOutcome::Skipped) => result.pulled_skipped += 1,
                Err(err) => {
                    tracing::error!(task_id = %task.id, error = %err, "pull failed");
                    result
                        .errors
                        .push(format!("Pull error for task {}: {err}", task.id));
                }
            }
        }

        tracing::info!(
            created = result.pulled_created,
            updated = result.pulled_updated,
            linked = result.pulled_linked,
            skipped = result.pulled_skipped,
            "pull complete"
        );
    }

    fn pull_matched(
        &mut self,
        local: &LocalIssue,
        task: &RemoteTask,
        ledger: &mut SyncLedger,
    ) -> Result<PullOutcome> {
        let decision = decide(local, task, ledger.get(&local.id), &self.mapper);
        tracing::debug!(
            issue = %local.id,
            task_id = %task.id,
            reason = ?decision.reason,
            direction = ?decision.direction,
            "pull decision"
        );

        match decision.direction {
            None => {
                // Already agreed; make sure the ledger says so.
                ledger.record(&local.id, &decision.local_hash, &decision.remote_hash);
                Ok(PullOutcome::Skipped)
            }
            Some(Direction::Push) => Ok(PullOutcome::Skipped),
            Some(Direction::Pull) => {
                let conflict = decision.is_conflict();
                if conflict {
                    tracing::warn!(
                        issue = %local.id,
                        task_id = %task.id,
                        "both sides changed since last sync; remote is newer and wins"
                    );
                }
                self.apply_task(local, task)?;
                ledger.record(&local.id, &decision.remote_hash, &decision.remote_hash);
                tracing::info!(issue = %local.id, task_id = %task.id, "updated local issue from remote");
                Ok(PullOutcome::Updated { conflict })
            }
        }
    }

    /// Copy remote fields onto `local`, closing through the close operation.
    pub(super) fn apply_task(&mut self, local: &LocalIssue, task: &RemoteTask) -> Result<()> {
        let status = self.mapper.status_to_local(&task.status);
        let update = IssueUpdate {
            title: Some(task.name.clone()),
            description: Some(task.description.clone().unwrap_or_default()),
            priority: Some(self.mapper.priority_to_local(task.priority)),
            // Reopen and lane changes are plain status writes.
            status: (!status.is_closed() && status != local.status).then_some(status),
            external_ref: None,
        };

        if self.options.dry_run {
            tracing::info!(issue = %local.id, "dry run: would update local issue");
            return Ok(());
        }

        self.store.update_issue(&local.id, &update)?;
        if status.is_closed() && !local.status.is_closed() {
            self.store.close_issue(&local.id, None)?;
        }
        Ok(())
    }

    fn link_by_title(
        &mut self,
        local: &LocalIssue,
        task: &RemoteTask,
        ledger: &mut SyncLedger,
    ) -> Result<PullOutcome> {
        // The link write bumps the local timestamp; decide before it.
        let decision = decide(local, task, None, &self.mapper);
        tracing::debug!(
            issue = %local.id,
            task_id = %task.id,
            direction = ?decision.direction,
            "title link decision"
        );
        let external_ref = external_ref_for(&self.options.remote_tag, &task.id);
        if self.options.dry_run {
            tracing::info!(issue = %local.id, task_id = %task.id, "dry run: would link by title");
            self.virtual_links.insert(local.id.clone(), task.id.clone());
        } else {
            self.store
                .update_issue(&local.id, &IssueUpdate::link(&external_ref))?;
            tracing::info!(issue = %local.id, external_ref = %external_ref, "linked existing issue by title");
        }

        match decision.direction {
            None => ledger.record(&local.id, &decision.local_hash, &decision.remote_hash),
            Some(Direction::Pull) => {
                self.apply_task(local, task)?;
                // Unapplied in a dry run: keep the pair reading as a remote change.
                let agreed = if self.options.dry_run {
                    &decision.local_hash
                } else {
                    &decision.remote_hash
                };
                ledger.record(&local.id, agreed, agreed);
            }
            // Baseline is the remote content, so Push reads a local change.
            Some(Direction::Push) => {
                ledger.record(&local.id, &decision.remote_hash, &decision.remote_hash);
            }
        }
        Ok(PullOutcome::Linked)
    }

    fn create_from_task(&mut self, task: &RemoteTask, ledger: &mut SyncLedger) -> Result<PullOutcome> {
        let status = self.mapper.status_to_local(&task.status);
        let issue = NewIssue {
            title: task.name.clone(),
            description: task.description.clone().filter(|d| !d.trim().is_empty()),
            priority: self.mapper.priority_to_local(task.priority),
            external_ref: Some(external_ref_for(&self.options.remote_tag, &task.id)),
            labels: task.tags.clone(),
            issue_type: issue_type_from_tags(&task.tags),
        };

        if self.options.dry_run {
            tracing::info!(task_id = %task.id, title = %task.name, "dry run: would create local issue");
            return Ok(PullOutcome::Created);
        }

        let id = self.store.create_issue(&issue)?;
        match status {
            Status::Open => {}
            Status::Closed => self.store.close_issue(&id, None)?,
            other => self.store.update_issue(&id, &IssueUpdate::status(other))?,
        }

        let hash = task_fingerprint(task, &self.mapper);
        ledger.record(&id, &hash, &hash);
        tracing::info!(issue = %id, task_id = %task.id, "created local issue from remote");
        Ok(PullOutcome::Created)
    }
}

/// First unlinked issue whose normalized title matches `name`, removed from
/// the index so it cannot be linked twice.
fn take_title_match(
    unlinked: &mut HashMap<String, VecDeque<LocalIssue>>,
    name: &str,
) -> Option<LocalIssue> {
    let key = normalize_title(name);
    let candidates = unlinked.get_mut(&key)?;
    let issue = candidates.pop_front();
    if candidates.is_empty() {
        unlinked.remove(&key);
    }
    issue
}
