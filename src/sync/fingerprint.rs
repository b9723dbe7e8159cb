//! Content fingerprints of the syncable fields.
//!
//! A local issue and a remote task describing the same logical state must
//! hash identically, so remote values are first mapped into the local
//! vocabulary by the [`FieldMapper`].

use crate::model::{LocalIssue, Priority, RemoteTask, Status};
use crate::sync::mapping::FieldMapper;
use sha2::{Digest, Sha256};

/// Number of hex characters kept from the digest.
pub const FINGERPRINT_LEN: usize = 12;

/// Fingerprint of normalized `(title, description, status, priority)`.
///
/// Strings are trimmed and an absent description hashes like an empty one.
#[must_use]
pub fn fingerprint(
    title: &str,
    description: Option<&str>,
    status: Status,
    priority: Priority,
) -> String {
    let content = format!(
        "{}|{}|{}|{}",
        title.trim(),
        description.unwrap_or_default().trim(),
        status.as_str(),
        priority.0
    );

    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let mut digest = format!("{:x}", hasher.finalize());
    digest.truncate(FINGERPRINT_LEN);
    digest
}

#[must_use]
pub fn issue_fingerprint(issue: &LocalIssue) -> String {
    fingerprint(
        &issue.title,
        issue.description.as_deref(),
        issue.status,
        issue.priority,
    )
}

#[must_use]
pub fn task_fingerprint(task: &RemoteTask, mapper: &FieldMapper) -> String {
    fingerprint(
        &task.name,
        task.description.as_deref(),
        mapper.status_to_local(&task.status),
        mapper.priority_to_local(task.priority),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn task(name: &str, status: &str, priority: Option<u8>) -> RemoteTask {
        RemoteTask {
            id: "9".into(),
            name: name.into(),
            description: None,
            status: status.into(),
            priority,
            date_updated: Utc::now(),
            tags: vec![],
        }
    }

    #[test]
    fn digest_is_stable_hex_of_fixed_length() {
        let a = fingerprint("Fix login", Some("body"), Status::Open, Priority::MEDIUM);
        let b = fingerprint("Fix login", Some("body"), Status::Open, Priority::MEDIUM);
        assert_eq!(a, b);
        assert_eq!(a.len(), FINGERPRINT_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn whitespace_and_missing_description_are_normalized() {
        let a = fingerprint("  Fix login ", None, Status::Open, Priority::HIGH);
        let b = fingerprint("Fix login", Some("   "), Status::Open, Priority::HIGH);
        assert_eq!(a, b);
    }

    #[test]
    fn each_field_changes_the_digest() {
        let base = fingerprint("t", Some("d"), Status::Open, Priority::MEDIUM);
        assert_ne!(base, fingerprint("t2", Some("d"), Status::Open, Priority::MEDIUM));
        assert_ne!(base, fingerprint("t", Some("d2"), Status::Open, Priority::MEDIUM));
        assert_ne!(base, fingerprint("t", Some("d"), Status::Closed, Priority::MEDIUM));
        assert_ne!(base, fingerprint("t", Some("d"), Status::Open, Priority::LOW));
    }

    #[test]
    fn equivalent_issue_and_task_hash_identically() {
        let mapper = FieldMapper::default();
        let mut issue = LocalIssue::new("bd-1", "Fix login");
        issue.status = Status::InProgress;
        issue.priority = Priority::HIGH;

        let remote = task("Fix login", "In Progress", Some(2));
        assert_eq!(issue_fingerprint(&issue), task_fingerprint(&remote, &mapper));
    }

    #[test]
    fn remote_status_synonyms_share_a_fingerprint() {
        let mapper = FieldMapper::default();
        let a = task_fingerprint(&task("x", "complete", None), &mapper);
        let b = task_fingerprint(&task("x", "Done", None), &mapper);
        let c = task_fingerprint(&task("x", "closed", None), &mapper);
        assert_eq!(a, b);
        assert_eq!(b, c);
    }
}
