//! Push stage: local issues out to the remote service.

use super::{CLOSE_COMMENT_PREFIX, SyncEngine};
use crate::error::SyncError;
use crate::model::{
    IssueUpdate, LocalIssue, NewTask, RemoteTask, Status, SyncResult, TaskUpdate,
    external_ref_for, normalize_title,
};
use crate::remote::RemoteService;
use crate::storage::IssueStore;
use crate::sync::decision::{Direction, decide};
use crate::sync::fingerprint::{issue_fingerprint, task_fingerprint};
use crate::sync::ledger::SyncLedger;
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PushOutcome {
    Created,
    Updated { conflict: bool },
    Linked,
    Skipped,
}

/// Failure of one issue's push.
#[derive(Debug, Error)]
enum PushItemError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("failed to create remote task: {0}")]
    CreateFailed(#[source] SyncError),

    #[error(
        "created remote task {task_id} but could not link it: {source}. \
         The task exists remotely; link it by hand with: bd update {issue_id} --external-ref {external_ref}"
    )]
    LinkFailed {
        issue_id: String,
        task_id: String,
        external_ref: String,
        #[source]
        source: SyncError,
    },

    #[error("linked remote task {task_id} no longer exists (external ref {external_ref})")]
    TaskMissing { task_id: String, external_ref: String },
}

type ItemResult<T> = std::result::Result<T, PushItemError>;

impl<S: IssueStore + ?Sized, R: RemoteService + ?Sized> SyncEngine<'_, S, R> {
    pub(super) fn push(
        &mut self,
        snapshot: &[RemoteTask],
        ledger: &mut SyncLedger,
        result: &mut SyncResult,
    ) {
        let issues = match self.store.list_issues(true) {
            Ok(issues) => issues,
            Err(err) => {
                tracing::error!(error = %err, "cannot list local issues; push skipped");
                result
                    .errors
                    .push(format!("Failed to list local issues for push: {err}"));
                return;
            }
        };

        for (title, ids) in duplicate_title_groups(&issues) {
            tracing::warn!(
                title = %title,
                ids = %ids.join(", "),
                "multiple local issues share a title; review for duplicates"
            );
        }

        let linked: HashSet<String> = issues
            .iter()
            .filter_map(|issue| self.linked_task_id(issue))
            .collect();
        let mut by_title: HashMap<String, &RemoteTask> = HashMap::new();
        for task in snapshot.iter().filter(|t| !linked.contains(&t.id)) {
            by_title.entry(normalize_title(&task.name)).or_insert(task);
        }

        for issue in &issues {
            match self.push_issue(issue, &mut by_title, ledger) {
                Ok(PushOutcome::Created) => result.pushed_created += 1,
                Ok(PushOutcome::Updated { conflict }) => {
                    result.pushed_updated += 1;
                    if conflict {
                        result.conflicts.push(issue.id.clone());
                    }
                }
                Ok(PushOutcome::Linked) => result.pushed_linked += 1,
                Ok(PushOutcome::Skipped) => result.pushed_skipped += 1,
                Err(err) => {
                    tracing::error!(issue = %issue.id, error = %err, "push failed");
                    result
                        .errors
                        .push(format!("Push error for issue {}: {err}", issue.id));
                }
            }
        }

        tracing::info!(
            created = result.pushed_created,
            updated = result.pushed_updated,
            linked = result.pushed_linked,
            skipped = result.pushed_skipped,
            "push complete"
        );
    }

    fn push_issue(
        &mut self,
        issue: &LocalIssue,
        by_title: &mut HashMap<String, &RemoteTask>,
        ledger: &mut SyncLedger,
    ) -> ItemResult<PushOutcome> {
        if let Some(task_id) = self.linked_task_id(issue) {
            return self.push_linked(issue, &task_id, ledger);
        }

        if let Some(external_ref) = &issue.external_ref {
            tracing::debug!(issue = %issue.id, external_ref = %external_ref, "linked to another system; skipped");
            return Ok(PushOutcome::Skipped);
        }

        if let Some(task) = by_title.remove(&normalize_title(&issue.title)) {
            self.link_to_task(issue, task, ledger)?;
            return Ok(PushOutcome::Linked);
        }

        self.create_and_link(issue, ledger)
    }

    fn push_linked(
        &mut self,
        issue: &LocalIssue,
        task_id: &str,
        ledger: &mut SyncLedger,
    ) -> ItemResult<PushOutcome> {
        let task = self.remote.get_task(task_id).map_err(|err| {
            if err.is_not_found() {
                PushItemError::TaskMissing {
                    task_id: task_id.to_string(),
                    external_ref: external_ref_for(&self.options.remote_tag, task_id),
                }
            } else {
                err.into()
            }
        })?;

        let decision = decide(issue, &task, ledger.get(&issue.id), &self.mapper);
        tracing::debug!(
            issue = %issue.id,
            task_id,
            reason = ?decision.reason,
            direction = ?decision.direction,
            "push decision"
        );

        match decision.direction {
            None => {
                ledger.record(&issue.id, &decision.local_hash, &decision.remote_hash);
                Ok(PushOutcome::Skipped)
            }
            Some(Direction::Pull) => Ok(PushOutcome::Skipped),
            Some(Direction::Push) => {
                let conflict = decision.is_conflict();
                if conflict {
                    tracing::warn!(
                        issue = %issue.id,
                        task_id,
                        "both sides changed since last sync; local is newer and wins"
                    );
                }
                let expected = self.apply_issue(issue, &task)?;
                self.record_pushed(ledger, issue, &decision.local_hash, &expected);
                tracing::info!(issue = %issue.id, task_id, "updated remote task from local");
                Ok(PushOutcome::Updated { conflict })
            }
        }
    }

    /// Push `issue` onto `task`. Returns the task as it should now read.
    fn apply_issue(&mut self, issue: &LocalIssue, task: &RemoteTask) -> ItemResult<RemoteTask> {
        let mut expected = task.clone();
        expected.name.clone_from(&issue.title);
        expected.description = Some(issue.description.clone().unwrap_or_default());
        expected.priority = self.mapper.priority_to_remote(issue.priority);

        let status_changed = self.mapper.status_to_local(&task.status) != issue.status;

        if self.options.dry_run {
            tracing::info!(issue = %issue.id, task_id = %task.id, "dry run: would update remote task");
            if status_changed {
                expected.status = self.mapper.status_to_remote(issue.status).to_string();
            }
            return Ok(expected);
        }

        // Structural fields always go in their own call.
        let structural = TaskUpdate {
            name: Some(expected.name.clone()),
            description: expected.description.clone(),
            status: None,
            priority: Some(expected.priority),
        };
        self.remote.update_task(&task.id, &structural)?;

        if status_changed && self.apply_status(&task.id, issue.status) {
            expected.status = self.mapper.status_to_remote(issue.status).to_string();
        }

        if issue.status.is_closed() {
            if let Some(reason) = issue.close_reason.as_deref() {
                self.post_close_reason(&task.id, reason)?;
            }
        }

        Ok(expected)
    }

    /// Record the pair after a push. If the remote kept a different lane
    /// than the issue's status, the agreed baseline is the remote content,
    /// so the next run still reads a local change and retries the lane.
    fn record_pushed(
        &self,
        ledger: &mut SyncLedger,
        issue: &LocalIssue,
        local_hash: &str,
        expected: &RemoteTask,
    ) {
        let remote_hash = task_fingerprint(expected, &self.mapper);
        if self.mapper.status_to_local(&expected.status) == issue.status {
            ledger.record(&issue.id, local_hash, &remote_hash);
        } else {
            tracing::warn!(
                issue = %issue.id,
                task_id = %expected.id,
                status = %issue.status,
                "remote lane differs from local status; will retry next run"
            );
            ledger.record(&issue.id, &remote_hash, &remote_hash);
        }
    }

    /// Best-effort remote status write. A lane the workspace lacks is logged
    /// and skipped.
    fn apply_status(&mut self, task_id: &str, status: Status) -> bool {
        let lane = self.mapper.status_to_remote(status).to_string();
        match self.remote.update_task(task_id, &TaskUpdate::status(&lane)) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    task_id,
                    lane = %lane,
                    error = %err,
                    "remote status not applied; other fields were updated"
                );
                false
            }
        }
    }

    /// Post `"[Closed] <reason>"` on the task unless an equivalent comment is
    /// already there. Returns whether a comment was posted.
    ///
    /// # Errors
    ///
    /// Returns an error if the comments cannot be listed or the new comment
    /// cannot be posted.
    pub fn post_close_reason(&mut self, task_id: &str, reason: &str) -> crate::Result<bool> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Ok(false);
        }

        let comments = self.remote.list_comments(task_id)?;
        let already_posted = comments
            .iter()
            .any(|c| c.text.starts_with(CLOSE_COMMENT_PREFIX) && c.text.contains(reason));
        if already_posted {
            tracing::debug!(task_id, "close reason already posted");
            return Ok(false);
        }

        if self.options.dry_run {
            tracing::info!(task_id, "dry run: would post close reason");
            return Ok(true);
        }

        self.remote
            .add_comment(task_id, &format!("{CLOSE_COMMENT_PREFIX} {reason}"))?;
        tracing::info!(task_id, "posted close reason");
        Ok(true)
    }

    fn link_to_task(
        &mut self,
        issue: &LocalIssue,
        task: &RemoteTask,
        ledger: &mut SyncLedger,
    ) -> ItemResult<()> {
        // Decided on the timestamps from before the link write.
        let decision = decide(issue, task, None, &self.mapper);
        let external_ref = external_ref_for(&self.options.remote_tag, &task.id);
        if self.options.dry_run {
            tracing::info!(issue = %issue.id, task_id = %task.id, "dry run: would link by title");
            self.virtual_links.insert(issue.id.clone(), task.id.clone());
        } else {
            self.store
                .update_issue(&issue.id, &IssueUpdate::link(&external_ref))?;
            tracing::info!(issue = %issue.id, external_ref = %external_ref, "linked to existing remote task by title");
        }

        match decision.direction {
            None => ledger.record(&issue.id, &decision.local_hash, &decision.remote_hash),
            Some(Direction::Push) => {
                let expected = self.apply_issue(issue, task)?;
                self.record_pushed(ledger, issue, &decision.local_hash, &expected);
            }
            Some(Direction::Pull) => {
                self.apply_task(issue, task)?;
                ledger.record(&issue.id, &decision.remote_hash, &decision.remote_hash);
            }
        }
        Ok(())
    }

    /// Create the remote task, then link the local issue to it. A failed link
    /// is reported with the remote id and never retried by creating again.
    fn create_and_link(&mut self, issue: &LocalIssue, ledger: &mut SyncLedger) -> ItemResult<PushOutcome> {
        let new_task = NewTask {
            name: issue.title.clone(),
            description: issue.description.clone().filter(|d| !d.trim().is_empty()),
            priority: self.mapper.priority_to_remote(issue.priority),
            tags: issue.labels.clone(),
        };

        if self.options.dry_run {
            tracing::info!(issue = %issue.id, title = %issue.title, "dry run: would create remote task");
            return Ok(PushOutcome::Created);
        }

        let task_id = self
            .remote
            .create_task(&self.options.list_id, &new_task)
            .map_err(PushItemError::CreateFailed)?;
        tracing::info!(issue = %issue.id, task_id = %task_id, "created remote task");

        let status = if issue.status != Status::Open && self.apply_status(&task_id, issue.status) {
            issue.status
        } else {
            Status::Open
        };

        let external_ref = external_ref_for(&self.options.remote_tag, &task_id);
        if let Err(source) = self
            .store
            .update_issue(&issue.id, &IssueUpdate::link(&external_ref))
        {
            return Err(PushItemError::LinkFailed {
                issue_id: issue.id.clone(),
                task_id,
                external_ref,
                source,
            });
        }

        let expected = RemoteTask {
            id: task_id.clone(),
            name: new_task.name,
            description: new_task.description,
            status: self.mapper.status_to_remote(status).to_string(),
            priority: new_task.priority,
            date_updated: chrono::Utc::now(),
            tags: new_task.tags,
        };
        self.record_pushed(ledger, issue, &issue_fingerprint(issue), &expected);

        if issue.status.is_closed() {
            if let Some(reason) = issue.close_reason.as_deref() {
                self.post_close_reason(&task_id, reason)?;
            }
        }

        Ok(PushOutcome::Created)
    }
}

/// Normalized titles shared by more than one issue, with their ids.
pub(crate) fn duplicate_title_groups(issues: &[LocalIssue]) -> Vec<(String, Vec<String>)> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for issue in issues {
        groups
            .entry(normalize_title(&issue.title))
            .or_default()
            .push(issue.id.clone());
    }
    groups.into_iter().filter(|(_, ids)| ids.len() > 1).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_groups_only_list_repeats() {
        let issues = vec![
            LocalIssue::new("bd-1", "Fix login"),
            LocalIssue::new("bd-2", "Write docs"),
            LocalIssue::new("bd-3", " fix LOGIN"),
        ];
        let groups = duplicate_title_groups(&issues);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, "fix login");
        assert_eq!(groups[0].1, vec!["bd-1", "bd-3"]);
    }

    #[test]
    fn link_failure_message_names_remote_id_and_fix() {
        let err = PushItemError::LinkFailed {
            issue_id: "bd-7".into(),
            task_id: "86x".into(),
            external_ref: "clickup-86x".into(),
            source: SyncError::Store {
                command: "bd update".into(),
                message: "database is locked".into(),
            },
        };
        let text = err.to_string();
        assert!(text.contains("86x"));
        assert!(text.contains("bd update bd-7 --external-ref clickup-86x"));
        assert!(text.contains("database is locked"));
    }

    #[test]
    fn create_failure_is_plain() {
        let err = PushItemError::CreateFailed(SyncError::Transport("timeout".into()));
        assert_eq!(err.to_string(), "failed to create remote task: transport error: timeout");
    }
}
