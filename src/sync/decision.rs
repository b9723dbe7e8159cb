//! Per-pair reconciliation decision.
//!
//! The current fingerprints of both sides are compared with the fingerprints
//! recorded in the ledger at the last successful sync. Timestamps are only a
//! tie-break (cold start, true conflict, or a ledger that matches neither
//! side's story), because every write bumps the target's `updated_at`.

use crate::model::{LocalIssue, RemoteTask};
use crate::sync::fingerprint::{issue_fingerprint, task_fingerprint};
use crate::sync::ledger::LedgerEntry;
use crate::sync::mapping::FieldMapper;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Which side is authoritative for this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Remote → local.
    Pull,
    /// Local → remote.
    Push,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pull => f.write_str("pull"),
            Self::Push => f.write_str("push"),
        }
    }
}

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// Both sides already hash the same.
    Identical,
    /// No ledger entry for the pair; newer timestamp wins.
    ColdStart,
    /// Only the local side moved since the last sync.
    LocalChanged,
    /// Only the remote side moved since the last sync.
    RemoteChanged,
    /// Both sides moved; newer timestamp wins.
    Conflict,
    /// Neither side moved per the ledger, yet they differ; newer timestamp wins.
    StaleLedger,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub direction: Option<Direction>,
    pub reason: Reason,
    pub local_hash: String,
    pub remote_hash: String,
}

impl Decision {
    #[must_use]
    pub const fn should_sync(&self) -> bool {
        self.direction.is_some()
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.reason == Reason::Conflict
    }
}

/// Decide whether and which way to sync a linked pair.
#[must_use]
pub fn decide(
    local: &LocalIssue,
    remote: &RemoteTask,
    entry: Option<&LedgerEntry>,
    mapper: &FieldMapper,
) -> Decision {
    decide_hashes(
        issue_fingerprint(local),
        task_fingerprint(remote, mapper),
        local.updated_at,
        remote.date_updated,
        entry,
    )
}

/// Hash-level decision, independent of how the fingerprints were produced.
#[must_use]
pub fn decide_hashes(
    local_hash: String,
    remote_hash: String,
    local_updated: DateTime<Utc>,
    remote_updated: DateTime<Utc>,
    entry: Option<&LedgerEntry>,
) -> Decision {
    let newer = if local_updated > remote_updated {
        Direction::Push
    } else {
        Direction::Pull
    };

    let (direction, reason) = if local_hash == remote_hash {
        (None, Reason::Identical)
    } else {
        match entry.filter(|e| !e.is_blank()) {
            None => (Some(newer), Reason::ColdStart),
            Some(last) => {
                let local_changed = local_hash != last.local_hash;
                let remote_changed = remote_hash != last.remote_hash;
                match (local_changed, remote_changed) {
                    (true, false) => (Some(Direction::Push), Reason::LocalChanged),
                    (false, true) => (Some(Direction::Pull), Reason::RemoteChanged),
                    (true, true) => (Some(newer), Reason::Conflict),
                    (false, false) => (Some(newer), Reason::StaleLedger),
                }
            }
        }
    };

    Decision {
        direction,
        reason,
        local_hash,
        remote_hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(local: &str, remote: &str) -> LedgerEntry {
        LedgerEntry {
            local_hash: local.into(),
            remote_hash: remote.into(),
            last_synced_at: Utc::now(),
        }
    }

    fn run(local: &str, remote: &str, local_newer: bool, e: Option<&LedgerEntry>) -> Decision {
        let now = Utc::now();
        let (l, r) = if local_newer {
            (now, now - Duration::minutes(5))
        } else {
            (now - Duration::minutes(5), now)
        };
        decide_hashes(local.into(), remote.into(), l, r, e)
    }

    #[test]
    fn identical_content_never_syncs() {
        let stale = entry("x", "y");
        for e in [None, Some(&stale)] {
            for local_newer in [true, false] {
                let d = run("same", "same", local_newer, e);
                assert_eq!(d.direction, None);
                assert_eq!(d.reason, Reason::Identical);
                assert!(!d.should_sync());
            }
        }
    }

    #[test]
    fn cold_start_prefers_newer_side() {
        assert_eq!(run("a", "b", true, None).direction, Some(Direction::Push));
        assert_eq!(run("a", "b", false, None).direction, Some(Direction::Pull));
        assert_eq!(run("a", "b", true, None).reason, Reason::ColdStart);
    }

    #[test]
    fn equal_timestamps_pull() {
        let now = Utc::now();
        let d = decide_hashes("a".into(), "b".into(), now, now, None);
        assert_eq!(d.direction, Some(Direction::Pull));
    }

    #[test]
    fn blank_entry_is_cold_start() {
        let blank = entry("", "");
        assert_eq!(run("a", "b", true, Some(&blank)).reason, Reason::ColdStart);
    }

    #[test]
    fn only_local_changed_pushes_even_if_remote_is_newer() {
        let e = entry("old", "r");
        let d = run("new", "r", false, Some(&e));
        assert_eq!(d.direction, Some(Direction::Push));
        assert_eq!(d.reason, Reason::LocalChanged);
    }

    #[test]
    fn only_remote_changed_pulls_even_if_local_is_newer() {
        let e = entry("l", "old");
        let d = run("l", "new", true, Some(&e));
        assert_eq!(d.direction, Some(Direction::Pull));
        assert_eq!(d.reason, Reason::RemoteChanged);
    }

    #[test]
    fn both_changed_is_a_conflict_resolved_by_timestamp() {
        let e = entry("l0", "r0");
        let d = run("l1", "r1", true, Some(&e));
        assert_eq!(d.direction, Some(Direction::Push));
        assert!(d.is_conflict());

        let d = run("l1", "r1", false, Some(&e));
        assert_eq!(d.direction, Some(Direction::Pull));
    }

    #[test]
    fn stale_ledger_falls_back_to_timestamp() {
        let e = entry("l", "r");
        let d = run("l", "r", true, Some(&e));
        assert_eq!(d.direction, Some(Direction::Push));
        assert_eq!(d.reason, Reason::StaleLedger);
    }

    #[test]
    fn after_sync_both_sides_settle() {
        // A pull made the local side equal to the remote one; the target's
        // timestamp moved, but the hashes match the ledger.
        let e = entry("r1", "r1");
        let d = run("r1", "r1", true, Some(&e));
        assert!(!d.should_sync());
    }

    #[test]
    fn decide_uses_mapped_remote_vocabulary() {
        let mapper = FieldMapper::default();
        let mut local = LocalIssue::new("bd-1", "Fix login");
        local.priority = crate::model::Priority::HIGH;
        let remote = RemoteTask {
            id: "9".into(),
            name: "Fix login".into(),
            description: Some(String::new()),
            status: "TO DO".into(),
            priority: Some(2),
            date_updated: Utc::now() + Duration::hours(1),
            tags: vec![],
        };
        let d = decide(&local, &remote, None, &mapper);
        assert_eq!(d.reason, Reason::Identical);
    }
}
