//! Status and priority vocabulary mapping between beads and ClickUp.
//!
//! Both directions are total: unknown remote lanes read as `Open`, unmapped
//! remote priorities read as medium (2), and unmapped local priorities are
//! written as normal (3) unless configured otherwise.

use crate::model::{Priority, Status};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Remote priority used when a local priority has no entry.
pub const DEFAULT_REMOTE_PRIORITY: u8 = 3;

/// Local priority used when a remote priority has no entry.
pub const DEFAULT_LOCAL_PRIORITY: Priority = Priority::MEDIUM;

static REMOTE_TO_LOCAL: Lazy<HashMap<&'static str, Status>> = Lazy::new(|| {
    HashMap::from([
        ("backlog", Status::Open),
        ("to do", Status::Open),
        ("todo", Status::Open),
        ("open", Status::Open),
        ("in progress", Status::InProgress),
        ("doing", Status::InProgress),
        ("in review", Status::InProgress),
        ("review", Status::InProgress),
        ("blocked", Status::Blocked),
        ("on hold", Status::Blocked),
        ("complete", Status::Closed),
        ("done", Status::Closed),
        ("closed", Status::Closed),
    ])
});

fn default_lane(status: Status) -> &'static str {
    match status {
        Status::Open => "to do",
        Status::InProgress => "in progress",
        Status::Blocked => "on hold",
        Status::Closed => "closed",
    }
}

/// Translates statuses and priorities between the two systems.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapper {
    lanes: HashMap<Status, String>,
    remote_to_local: HashMap<String, Status>,
    default_remote_priority: u8,
}

impl Default for FieldMapper {
    fn default() -> Self {
        Self::new(&HashMap::new(), None)
    }
}

impl FieldMapper {
    /// Build a mapper with lane-name overrides for local statuses.
    ///
    /// An override whose lane name is not already known is also installed in
    /// the reverse table, so the lane reads back as the status that wrote it.
    #[must_use]
    pub fn new(overrides: &HashMap<Status, String>, default_remote_priority: Option<u8>) -> Self {
        let mut remote_to_local: HashMap<String, Status> = REMOTE_TO_LOCAL
            .iter()
            .map(|(lane, status)| ((*lane).to_string(), *status))
            .collect();

        let mut lanes = HashMap::new();
        for status in Status::ALL {
            let lane = overrides
                .get(&status)
                .map(|lane| lane.trim().to_lowercase())
                .filter(|lane| !lane.is_empty())
                .unwrap_or_else(|| default_lane(status).to_string());
            remote_to_local.entry(lane.clone()).or_insert(status);
            lanes.insert(status, lane);
        }

        Self {
            lanes,
            remote_to_local,
            default_remote_priority: default_remote_priority.unwrap_or(DEFAULT_REMOTE_PRIORITY),
        }
    }

    /// Remote lane name for a local status.
    #[must_use]
    pub fn status_to_remote(&self, status: Status) -> &str {
        self.lanes
            .get(&status)
            .map_or_else(|| default_lane(status), String::as_str)
    }

    /// Local status for a remote lane name (case-insensitive, unknown → Open).
    #[must_use]
    pub fn status_to_local(&self, lane: &str) -> Status {
        self.remote_to_local
            .get(lane.trim().to_lowercase().as_str())
            .copied()
            .unwrap_or(Status::Open)
    }

    /// Remote priority for a local priority; `None` is "no priority".
    #[must_use]
    pub fn priority_to_remote(&self, priority: Priority) -> Option<u8> {
        match priority.0 {
            0 => Some(1),
            1 => Some(2),
            2 => Some(3),
            3 => Some(4),
            4 => None,
            _ => Some(self.default_remote_priority),
        }
    }

    /// Local priority for a remote priority.
    #[must_use]
    pub fn priority_to_local(&self, priority: Option<u8>) -> Priority {
        match priority {
            Some(1) => Priority::CRITICAL,
            Some(2) => Priority::HIGH,
            Some(3) => Priority::MEDIUM,
            Some(4) => Priority::LOW,
            None => Priority::BACKLOG,
            Some(_) => DEFAULT_LOCAL_PRIORITY,
        }
    }
}

/// Local issue type from remote tags: first of bug/feature/epic, else task.
#[must_use]
pub fn issue_type_from_tags(tags: &[String]) -> String {
    tags.iter()
        .map(|tag| tag.trim().to_lowercase())
        .find(|tag| matches!(tag.as_str(), "bug" | "feature" | "epic"))
        .unwrap_or_else(|| "task".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lanes() {
        let mapper = FieldMapper::default();
        assert_eq!(mapper.status_to_remote(Status::Open), "to do");
        assert_eq!(mapper.status_to_remote(Status::InProgress), "in progress");
        assert_eq!(mapper.status_to_remote(Status::Blocked), "on hold");
        assert_eq!(mapper.status_to_remote(Status::Closed), "closed");
    }

    #[test]
    fn remote_lanes_are_case_insensitive_and_default_to_open() {
        let mapper = FieldMapper::default();
        assert_eq!(mapper.status_to_local("BACKLOG"), Status::Open);
        assert_eq!(mapper.status_to_local(" Doing "), Status::InProgress);
        assert_eq!(mapper.status_to_local("On Hold"), Status::Blocked);
        assert_eq!(mapper.status_to_local("Done"), Status::Closed);
        assert_eq!(mapper.status_to_local("qa ready"), Status::Open);
        assert_eq!(mapper.status_to_local(""), Status::Open);
    }

    #[test]
    fn default_lanes_round_trip() {
        let mapper = FieldMapper::default();
        for status in Status::ALL {
            assert_eq!(mapper.status_to_local(mapper.status_to_remote(status)), status);
        }
    }

    #[test]
    fn custom_lane_override_round_trips() {
        let overrides = HashMap::from([
            (Status::Blocked, "Stuck".to_string()),
            (Status::Closed, "shipped".to_string()),
        ]);
        let mapper = FieldMapper::new(&overrides, None);
        assert_eq!(mapper.status_to_remote(Status::Blocked), "stuck");
        assert_eq!(mapper.status_to_local("STUCK"), Status::Blocked);
        assert_eq!(mapper.status_to_local("shipped"), Status::Closed);
        // Built-in synonyms keep working.
        assert_eq!(mapper.status_to_local("on hold"), Status::Blocked);
    }

    #[test]
    fn override_onto_known_lane_keeps_existing_reverse_entry() {
        let overrides = HashMap::from([(Status::Blocked, "to do".to_string())]);
        let mapper = FieldMapper::new(&overrides, None);
        assert_eq!(mapper.status_to_remote(Status::Blocked), "to do");
        assert_eq!(mapper.status_to_local("to do"), Status::Open);
    }

    #[test]
    fn priority_tables_are_total() {
        let mapper = FieldMapper::default();
        assert_eq!(mapper.priority_to_remote(Priority::CRITICAL), Some(1));
        assert_eq!(mapper.priority_to_remote(Priority::LOW), Some(4));
        assert_eq!(mapper.priority_to_remote(Priority::BACKLOG), None);
        assert_eq!(mapper.priority_to_remote(Priority(9)), Some(3));

        assert_eq!(mapper.priority_to_local(Some(1)), Priority::CRITICAL);
        assert_eq!(mapper.priority_to_local(Some(3)), Priority::MEDIUM);
        assert_eq!(mapper.priority_to_local(None), Priority::BACKLOG);
        assert_eq!(mapper.priority_to_local(Some(7)), Priority::MEDIUM);
    }

    #[test]
    fn configured_default_remote_priority() {
        let mapper = FieldMapper::new(&HashMap::new(), Some(4));
        assert_eq!(mapper.priority_to_remote(Priority(-1)), Some(4));
        assert_eq!(mapper.priority_to_remote(Priority::MEDIUM), Some(3));
    }

    #[test]
    fn priorities_round_trip_for_valid_range() {
        let mapper = FieldMapper::default();
        for p in 0..=4 {
            let local = Priority(p);
            assert_eq!(mapper.priority_to_local(mapper.priority_to_remote(local)), local);
        }
    }

    #[test]
    fn issue_type_first_known_tag_wins() {
        let tags = |t: &[&str]| t.iter().map(|s| (*s).to_string()).collect::<Vec<_>>();
        assert_eq!(issue_type_from_tags(&tags(&["frontend", "Bug", "epic"])), "bug");
        assert_eq!(issue_type_from_tags(&tags(&["epic", "feature"])), "epic");
        assert_eq!(issue_type_from_tags(&tags(&["frontend"])), "task");
        assert_eq!(issue_type_from_tags(&[]), "task");
    }
}
