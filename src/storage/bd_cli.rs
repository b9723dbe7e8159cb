//! Issue store backed by the `bd` executable.
//!
//! Every call spawns `bd` in the workspace directory. Reads request `--json`
//! output; a non-zero exit becomes [`SyncError::Store`] carrying the command
//! line and whatever `bd` printed.

use crate::error::{Result, SyncError};
use crate::model::{Comment, IssueUpdate, LocalIssue, NewIssue, Priority, Status};
use crate::storage::IssueStore;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, trace};

static CREATED_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)Created\b.*\s\[?([A-Za-z0-9][A-Za-z0-9._-]*)\]?\s*$")
        .unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

/// Process-backed [`IssueStore`].
#[derive(Debug, Clone)]
pub struct BdCli {
    program: PathBuf,
    cwd: PathBuf,
}

impl BdCli {
    /// Run `bd` from `cwd`, the directory containing `.beads`.
    #[must_use]
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: PathBuf::from("bd"),
            cwd: cwd.into(),
        }
    }

    /// Use a different executable, e.g. an absolute path to `bd`.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    fn run(&self, args: &[&str], json: bool) -> Result<String> {
        let mut command = Command::new(&self.program);
        command.args(args).current_dir(&self.cwd);
        if json {
            command.arg("--json");
        }

        let command_line = format!("bd {}", args.join(" "));
        trace!(command = %command_line, "running bd");

        let output = command.output().map_err(|err| SyncError::Store {
            command: command_line.clone(),
            message: if err.kind() == std::io::ErrorKind::NotFound {
                format!("{} not found on PATH", self.program.display())
            } else {
                err.to_string()
            },
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(SyncError::Store {
                command: command_line,
                message,
            });
        }

        Ok(stdout)
    }
}

impl IssueStore for BdCli {
    fn list_issues(&self, include_closed: bool) -> Result<Vec<LocalIssue>> {
        let mut args = vec!["list", "--limit", "0"];
        if include_closed {
            args.push("--all");
        }
        let stdout = self.run(&args, true)?;
        let issues = parse_issue_list(&stdout)?;
        debug!(count = issues.len(), include_closed, "listed local issues");
        Ok(issues)
    }

    fn get_issue(&self, id: &str) -> Result<LocalIssue> {
        let stdout = match self.run(&["show", id], true) {
            Ok(stdout) => stdout,
            Err(SyncError::Store { message, .. })
                if message.to_lowercase().contains("not found") =>
            {
                return Err(SyncError::IssueNotFound { id: id.to_string() });
            }
            Err(err) => return Err(err),
        };
        parse_issue_list(&stdout)?
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::IssueNotFound { id: id.to_string() })
    }

    fn create_issue(&mut self, issue: &NewIssue) -> Result<String> {
        let priority = issue.priority.0.to_string();
        let labels = issue.labels.join(",");
        let mut args = vec![
            "create",
            "--title",
            issue.title.as_str(),
            "--priority",
            priority.as_str(),
            "--type",
            issue.issue_type.as_str(),
        ];
        if let Some(description) = issue.description.as_deref().filter(|d| !d.is_empty()) {
            args.extend(["--description", description]);
        }
        if let Some(external_ref) = issue.external_ref.as_deref() {
            args.extend(["--external-ref", external_ref]);
        }
        if !labels.is_empty() {
            args.extend(["--labels", labels.as_str()]);
        }

        let stdout = self.run(&args, true)?;
        parse_created_id(&stdout).ok_or_else(|| SyncError::Store {
            command: "bd create".to_string(),
            message: format!("could not find the new issue id in output: {}", stdout.trim()),
        })
    }

    fn update_issue(&mut self, id: &str, update: &IssueUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }

        let priority = update.priority.map(|p| p.0.to_string());
        let mut args = vec!["update", id];
        if let Some(title) = update.title.as_deref() {
            args.extend(["--title", title]);
        }
        if let Some(description) = update.description.as_deref() {
            args.extend(["--description", description]);
        }
        if let Some(status) = update.status {
            args.extend(["--status", status.as_str()]);
        }
        if let Some(priority) = priority.as_deref() {
            args.extend(["--priority", priority]);
        }
        if let Some(external_ref) = update.external_ref.as_deref() {
            args.extend(["--external-ref", external_ref]);
        }

        self.run(&args, false)?;
        Ok(())
    }

    fn close_issue(&mut self, id: &str, reason: Option<&str>) -> Result<()> {
        let mut args = vec!["close", id];
        if let Some(reason) = reason.filter(|r| !r.is_empty()) {
            args.extend(["--reason", reason]);
        }
        self.run(&args, false)?;
        Ok(())
    }

    fn list_comments(&self, id: &str) -> Result<Vec<Comment>> {
        let stdout = self.run(&["comments", id], true)?;
        parse_comments(&stdout)
    }

    fn add_comment(&mut self, id: &str, text: &str) -> Result<()> {
        self.run(&["comments", "add", id, text], false)?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct BdIssue {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    priority: Option<i32>,
    #[serde(default)]
    issue_type: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    external_ref: Option<String>,
    #[serde(default)]
    labels: Option<Vec<String>>,
    #[serde(default)]
    close_reason: Option<String>,
}

impl BdIssue {
    /// Deleted issues linger as tombstones in `bd list --all`.
    fn is_tombstone(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.trim().eq_ignore_ascii_case("tombstone"))
    }
}

impl From<BdIssue> for LocalIssue {
    fn from(raw: BdIssue) -> Self {
        let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
        Self {
            id: raw.id,
            title: raw.title,
            description: non_empty(raw.description),
            status: raw
                .status
                .and_then(|s| s.parse::<Status>().ok())
                .unwrap_or_default(),
            priority: raw.priority.map_or(Priority::MEDIUM, Priority),
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            external_ref: non_empty(raw.external_ref),
            labels: raw.labels.unwrap_or_default(),
            close_reason: non_empty(raw.close_reason),
            issue_type: non_empty(raw.issue_type).unwrap_or_else(crate::model::default_issue_type),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(items) => items,
            Self::One(item) => vec![item],
        }
    }
}

/// Parse `bd list --json` or `bd show --json` output.
///
/// # Errors
///
/// Returns an error if the output is not an issue object or array.
pub fn parse_issue_list(stdout: &str) -> Result<Vec<LocalIssue>> {
    if stdout.trim().is_empty() || stdout.trim() == "null" {
        return Ok(Vec::new());
    }
    let raw: OneOrMany<BdIssue> = serde_json::from_str(stdout)?;
    Ok(raw
        .into_vec()
        .into_iter()
        .filter(|issue| !issue.is_tombstone())
        .map(LocalIssue::from)
        .collect())
}

#[derive(Debug, Deserialize)]
struct BdComment {
    #[serde(default)]
    id: serde_json::Value,
    #[serde(default)]
    author: Option<String>,
    #[serde(alias = "body")]
    text: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

/// Parse `bd comments <id> --json` output.
///
/// # Errors
///
/// Returns an error if the output is not a comment array.
pub fn parse_comments(stdout: &str) -> Result<Vec<Comment>> {
    if stdout.trim().is_empty() || stdout.trim() == "null" {
        return Ok(Vec::new());
    }
    let raw: Vec<BdComment> = serde_json::from_str(stdout)?;
    Ok(raw
        .into_iter()
        .map(|c| Comment {
            id: match c.id {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            },
            author: c.author,
            text: c.text,
            created_at: c.created_at,
        })
        .collect())
}

/// New issue id from `bd create` output: a JSON object with `id`, or a
/// `Created issue <id>` line.
#[must_use]
pub fn parse_created_id(stdout: &str) -> Option<String> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(stdout) {
        if let Some(id) = value.get("id").and_then(serde_json::Value::as_str) {
            return Some(id.to_string());
        }
    }

    CREATED_ID
        .captures(stdout)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
