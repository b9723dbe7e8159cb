#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use clickup_sync::model::RemoteTask;

/// A fixed instant well before any issue created during a test.
pub fn long_ago() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z")
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

/// An instant after any issue created during a test.
pub fn in_an_hour() -> DateTime<Utc> {
    Utc::now() + Duration::hours(1)
}

pub fn task(id: &str, name: &str) -> RemoteTask {
    RemoteTask {
        id: id.to_string(),
        name: name.to_string(),
        description: None,
        status: "to do".to_string(),
        priority: Some(3),
        date_updated: long_ago(),
        tags: Vec::new(),
    }
}

pub fn task_with(
    id: &str,
    name: &str,
    status: &str,
    priority: Option<u8>,
    date_updated: DateTime<Utc>,
) -> RemoteTask {
    RemoteTask {
        status: status.to_string(),
        priority,
        date_updated,
        ..task(id, name)
    }
}
