//! Local issue store access.
//!
//! The sync engine only talks to the beads issue store through
//! [`IssueStore`]. Two backends exist:
//!
//! - [`bd_cli`] - drives the `bd` executable and parses its `--json` output
//! - [`sqlite`] - reads and writes a beads `SQLite` database directly
//!
//! # Submodules
//!
//! - [`schema`] - Database schema for the direct `SQLite` backend

pub mod bd_cli;
pub mod schema;
pub mod sqlite;

pub use bd_cli::BdCli;
pub use sqlite::SqliteStorage;

use crate::error::Result;
use crate::model::{Comment, IssueUpdate, LocalIssue, NewIssue};

/// Capabilities the engine needs from the local issue store.
///
/// Reads take `&self`, mutations take `&mut self`.
pub trait IssueStore {
    /// All issues, optionally including closed ones.
    fn list_issues(&self, include_closed: bool) -> Result<Vec<LocalIssue>>;

    /// One issue; fails with [`crate::SyncError::IssueNotFound`] if absent.
    fn get_issue(&self, id: &str) -> Result<LocalIssue>;

    /// Create an issue and return its store-assigned id.
    fn create_issue(&mut self, issue: &NewIssue) -> Result<String>;

    fn update_issue(&mut self, id: &str, update: &IssueUpdate) -> Result<()>;

    /// Close through the store's dedicated close operation.
    fn close_issue(&mut self, id: &str, reason: Option<&str>) -> Result<()>;

    fn list_comments(&self, id: &str) -> Result<Vec<Comment>>;

    fn add_comment(&mut self, id: &str, text: &str) -> Result<()>;
}

impl<T: IssueStore + ?Sized> IssueStore for Box<T> {
    fn list_issues(&self, include_closed: bool) -> Result<Vec<LocalIssue>> {
        (**self).list_issues(include_closed)
    }

    fn get_issue(&self, id: &str) -> Result<LocalIssue> {
        (**self).get_issue(id)
    }

    fn create_issue(&mut self, issue: &NewIssue) -> Result<String> {
        (**self).create_issue(issue)
    }

    fn update_issue(&mut self, id: &str, update: &IssueUpdate) -> Result<()> {
        (**self).update_issue(id, update)
    }

    fn close_issue(&mut self, id: &str, reason: Option<&str>) -> Result<()> {
        (**self).close_issue(id, reason)
    }

    fn list_comments(&self, id: &str) -> Result<Vec<Comment>> {
        (**self).list_comments(id)
    }

    fn add_comment(&mut self, id: &str, text: &str) -> Result<()> {
        (**self).add_comment(id, text)
    }
}
