//! Persisted memory of the last agreed state of every linked pair.
//!
//! The ledger lives in `.beads/clickup-sync-state.yaml`:
//!
//! ```yaml
//! version: 1
//! state:
//!   bd-a1b2:
//!     local_hash: 3f2a9c0d11e4
//!     remote_hash: 3f2a9c0d11e4
//!     last_synced_at: 2026-03-01T10:00:00Z
//! ```
//!
//! A missing file, a parse failure or a version mismatch all load as an empty
//! ledger (cold start). Saving goes through a temp file and an atomic rename,
//! so readers never observe a partially written ledger.

use crate::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Ledger filename inside the beads directory.
pub const LEDGER_FILE: &str = "clickup-sync-state.yaml";

/// Document version; any other value resets the ledger.
pub const LEDGER_VERSION: u32 = 1;

/// Agreed fingerprints of one pair, keyed by local issue id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(alias = "bead_hash", default)]
    pub local_hash: String,
    #[serde(alias = "task_hash", default)]
    pub remote_hash: String,
    #[serde(alias = "last_synced", default = "Utc::now")]
    pub last_synced_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// True when the entry carries no usable hashes.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.local_hash.is_empty() && self.remote_hash.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerDocument {
    version: u32,
    #[serde(default)]
    state: Option<BTreeMap<String, LedgerEntry>>,
}

/// In-memory ledger, owned by the run coordinator for the length of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncLedger {
    entries: BTreeMap<String, LedgerEntry>,
}

impl SyncLedger {
    #[must_use]
    pub fn path(beads_dir: &Path) -> PathBuf {
        beads_dir.join(LEDGER_FILE)
    }

    /// Load the ledger from `beads_dir`, falling back to empty on any problem.
    #[must_use]
    pub fn load(beads_dir: &Path) -> Self {
        let path = Self::path(beads_dir);
        if !path.exists() {
            debug!(path = %path.display(), "no sync ledger yet; cold start");
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(text) => Self::from_yaml_str(&text),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cannot read sync ledger; starting cold");
                Self::default()
            }
        }
    }

    /// Parse a ledger document. Never fails: bad input is an empty ledger.
    #[must_use]
    pub fn from_yaml_str(text: &str) -> Self {
        let document: LedgerDocument = match serde_yaml::from_str(text) {
            Ok(document) => document,
            Err(err) => {
                warn!(error = %err, "sync ledger is unreadable; starting cold");
                return Self::default();
            }
        };

        if document.version != LEDGER_VERSION {
            warn!(
                found = document.version,
                expected = LEDGER_VERSION,
                "sync ledger version mismatch; starting cold"
            );
            return Self::default();
        }

        Self {
            entries: document.state.unwrap_or_default(),
        }
    }

    /// Serialize the ledger document.
    ///
    /// # Errors
    ///
    /// Returns an error if YAML serialization fails.
    pub fn to_yaml_string(&self) -> Result<String> {
        let document = LedgerDocument {
            version: LEDGER_VERSION,
            state: Some(self.entries.clone()),
        };
        Ok(serde_yaml::to_string(&document)?)
    }

    /// Write the ledger atomically into `beads_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the temp file cannot be written, synced or renamed.
    pub fn save(&self, beads_dir: &Path) -> Result<()> {
        let path = Self::path(beads_dir);
        let parent = path
            .parent()
            .ok_or_else(|| SyncError::Config(format!("Invalid ledger path: {}", path.display())))?;
        fs::create_dir_all(parent)?;

        let contents = self.to_yaml_string()?;
        let temp_path = path.with_extension("yaml.tmp");
        let temp_file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(temp_file);
        writer.write_all(contents.as_bytes())?;
        writer.flush()?;
        writer
            .into_inner()
            .map_err(|e| SyncError::Io(e.into_error()))?
            .sync_all()?;

        fs::rename(&temp_path, &path)?;
        debug!(path = %path.display(), entries = self.entries.len(), "sync ledger saved");
        Ok(())
    }

    #[must_use]
    pub fn get(&self, issue_id: &str) -> Option<&LedgerEntry> {
        self.entries.get(issue_id)
    }

    /// Record the hashes both sides agreed on for `issue_id`.
    pub fn record(&mut self, issue_id: &str, local_hash: &str, remote_hash: &str) {
        self.entries.insert(
            issue_id.to_string(),
            LedgerEntry {
                local_hash: local_hash.to_string(),
                remote_hash: remote_hash.to_string(),
                last_synced_at: Utc::now(),
            },
        );
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent `last_synced_at` across all entries.
    #[must_use]
    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.entries.values().map(|e| e.last_synced_at).max()
    }
}
