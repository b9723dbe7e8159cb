//! Error types for `clickup_sync`.
//!
//! A single [`SyncError`] covers the store backends, the ClickUp transport,
//! configuration loading and the run coordinator. Per-item failures inside a
//! sync stage never escape as `Err`; they are rendered into
//! [`crate::model::SyncResult::errors`] instead.

use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("not a beads workspace (no .beads directory found); run 'bd init' first")]
    NotInitialized,

    #[error("issue not found: {id}")]
    IssueNotFound { id: String },

    #[error("task not found: {id}")]
    TaskNotFound { id: String },

    #[error("ClickUp API error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{command} failed: {message}")]
    Store { command: String, message: String },

    #[error("another sync run is active (lock held: {})", path.display())]
    SyncInProgress { path: PathBuf },

    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },
}

impl SyncError {
    /// Build a validation error for `field`.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// True for the "record does not exist" family on either side.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::IssueNotFound { .. } | Self::TaskNotFound { .. } | Self::Remote { status: 404, .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_covers_both_sides() {
        assert!(SyncError::IssueNotFound { id: "bd-1".into() }.is_not_found());
        assert!(SyncError::TaskNotFound { id: "9".into() }.is_not_found());
        assert!(
            SyncError::Remote {
                status: 404,
                message: "Task not found".into()
            }
            .is_not_found()
        );
        assert!(!SyncError::Config("x".into()).is_not_found());
    }

    #[test]
    fn lock_error_names_the_path() {
        let err = SyncError::SyncInProgress {
            path: PathBuf::from("/tmp/.beads/clickup-sync.lock"),
        };
        assert!(err.to_string().contains("clickup-sync.lock"));
    }
}
