//! Data types shared by the stores, the ClickUp transport and the sync engine.
//!
//! The cross-system link is a plain string: [`LocalIssue::external_ref`] holds
//! `"<tag>-<task id>"` and is resolved through lookups built per stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Local issue status, the canonical vocabulary used for fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Open,
    InProgress,
    Blocked,
    Closed,
}

impl Status {
    pub const ALL: [Self; 4] = [Self::Open, Self::InProgress, Self::Blocked, Self::Closed];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Closed => "closed",
        }
    }

    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "open" => Ok(Self::Open),
            "in_progress" => Ok(Self::InProgress),
            "blocked" => Ok(Self::Blocked),
            "closed" => Ok(Self::Closed),
            other => Err(format!(
                "unknown status: {other} (valid: open, in_progress, blocked, closed)"
            )),
        }
    }
}

/// Local priority, 0 (critical) through 4 (backlog).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub i32);

impl Priority {
    pub const CRITICAL: Self = Self(0);
    pub const HIGH: Self = Self(1);
    pub const MEDIUM: Self = Self(2);
    pub const LOW: Self = Self(3);
    pub const BACKLOG: Self = Self(4);
}

impl Default for Priority {
    fn default() -> Self {
        Self::MEDIUM
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// One unit of work in the local issue store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalIssue {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<String>,
    #[serde(default = "default_issue_type")]
    pub issue_type: String,
}

pub(crate) fn default_issue_type() -> String {
    "task".to_string()
}

impl LocalIssue {
    /// Minimal open issue, used by tests and as a builder base.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            status: Status::Open,
            priority: Priority::MEDIUM,
            created_at: now,
            updated_at: now,
            external_ref: None,
            labels: Vec::new(),
            close_reason: None,
            issue_type: default_issue_type(),
        }
    }

    /// Remote task id this issue is linked to, if its ref carries `tag`.
    #[must_use]
    pub fn linked_task_id(&self, tag: &str) -> Option<&str> {
        self.external_ref
            .as_deref()
            .and_then(|r| r.strip_prefix(tag))
            .and_then(|r| r.strip_prefix('-'))
            .filter(|id| !id.is_empty())
    }
}

/// Build the external ref string for a remote task id.
#[must_use]
pub fn external_ref_for(tag: &str, task_id: &str) -> String {
    format!("{tag}-{task_id}")
}

/// Trimmed, case-folded title used for duplicate and fallback matching.
#[must_use]
pub fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// One unit of work in the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTask {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Raw lane name, compared case-insensitively.
    pub status: String,
    /// 1 (urgent) through 4 (low); `None` means no priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    pub date_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// A comment on either side. Only the text matters to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Fields for creating a local issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIssue {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub external_ref: Option<String>,
    pub labels: Vec<String>,
    pub issue_type: String,
}

/// Partial update of a local issue. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub external_ref: Option<String>,
}

impl IssueUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.external_ref.is_none()
    }

    #[must_use]
    pub fn link(external_ref: impl Into<String>) -> Self {
        Self {
            external_ref: Some(external_ref.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Fields for creating a remote task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub name: String,
    pub description: Option<String>,
    pub priority: Option<u8>,
    pub tags: Vec<String>,
}

/// Partial update of a remote task. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    /// `Some(None)` clears the remote priority.
    pub priority: Option<Option<u8>>,
}

impl TaskUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
    }

    #[must_use]
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Self::default()
        }
    }
}

/// Outcome of one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub pulled_created: usize,
    pub pulled_updated: usize,
    pub pulled_linked: usize,
    pub pulled_skipped: usize,
    pub pushed_created: usize,
    pub pushed_updated: usize,
    pub pushed_linked: usize,
    pub pushed_skipped: usize,
    /// Local ids of pairs where both sides changed since the last sync.
    pub conflicts: Vec<String>,
    /// Per-item failures, in the order they happened.
    pub errors: Vec<String>,
}

impl SyncResult {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

impl fmt::Display for SyncResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Pulled: {} created, {} updated, {} linked, {} skipped",
            self.pulled_created, self.pulled_updated, self.pulled_linked, self.pulled_skipped
        )?;
        write!(
            f,
            "Pushed: {} created, {} updated, {} linked, {} skipped",
            self.pushed_created, self.pushed_updated, self.pushed_linked, self.pushed_skipped
        )
    }
}
