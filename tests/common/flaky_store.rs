#![allow(dead_code)]

use clickup_sync::model::{Comment, IssueUpdate, LocalIssue, NewIssue};
use clickup_sync::storage::IssueStore;
use clickup_sync::{Result, SyncError};

/// Wraps a real store and fails selected operations.
pub struct FlakyStore<S> {
    pub inner: S,
    /// Reject updates that set an external ref.
    pub fail_link: bool,
    pub fail_list: bool,
    pub fail_create: bool,
}

impl<S: IssueStore> FlakyStore<S> {
    pub const fn new(inner: S) -> Self {
        Self {
            inner,
            fail_link: false,
            fail_list: false,
            fail_create: false,
        }
    }

    fn injected(command: &str) -> SyncError {
        SyncError::Store {
            command: command.to_string(),
            message: "injected failure".to_string(),
        }
    }
}

impl<S: IssueStore> IssueStore for FlakyStore<S> {
    fn list_issues(&self, include_closed: bool) -> Result<Vec<LocalIssue>> {
        if self.fail_list {
            return Err(Self::injected("bd list"));
        }
        self.inner.list_issues(include_closed)
    }

    fn get_issue(&self, id: &str) -> Result<LocalIssue> {
        self.inner.get_issue(id)
    }

    fn create_issue(&mut self, issue: &NewIssue) -> Result<String> {
        if self.fail_create {
            return Err(Self::injected("bd create"));
        }
        self.inner.create_issue(issue)
    }

    fn update_issue(&mut self, id: &str, update: &IssueUpdate) -> Result<()> {
        if self.fail_link && update.external_ref.is_some() {
            return Err(Self::injected("bd update"));
        }
        self.inner.update_issue(id, update)
    }

    fn close_issue(&mut self, id: &str, reason: Option<&str>) -> Result<()> {
        self.inner.close_issue(id, reason)
    }

    fn list_comments(&self, id: &str) -> Result<Vec<Comment>> {
        self.inner.list_comments(id)
    }

    fn add_comment(&mut self, id: &str, text: &str) -> Result<()> {
        self.inner.add_comment(id, text)
    }
}
