#![allow(dead_code)]

use clickup_sync::model::{LocalIssue, NewIssue, Priority};
use clickup_sync::storage::{IssueStore, SqliteStorage};
use clickup_sync::sync::{FieldMapper, SyncEngine, SyncOptions};
use std::path::Path;
use std::sync::Once;
use tempfile::TempDir;

pub mod fake_remote;
pub mod fixtures;
pub mod flaky_store;

pub use fake_remote::{Call, FakeRemote};
pub use flaky_store::FlakyStore;

/// List id every scenario syncs against.
pub const LIST_ID: &str = "L1";

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        clickup_sync::logging::init_test_logging();
    });
}

pub fn test_db() -> SqliteStorage {
    init_test_logging();
    SqliteStorage::open_memory().expect("Failed to create test database")
}

/// Temp workspace root with an empty `.beads` directory.
pub fn beads_dir() -> TempDir {
    init_test_logging();
    let dir = TempDir::new().expect("Failed to create temp dir");
    std::fs::create_dir_all(dir.path().join(".beads")).expect("create .beads");
    dir
}

pub fn beads_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join(".beads")
}

/// Create an open local issue and return its id.
pub fn seed_issue(store: &mut impl IssueStore, title: &str) -> String {
    store
        .create_issue(&NewIssue {
            title: title.to_string(),
            description: None,
            priority: Priority::MEDIUM,
            external_ref: None,
            labels: Vec::new(),
            issue_type: "task".to_string(),
        })
        .expect("create issue")
}

pub fn all_issues(store: &impl IssueStore) -> Vec<LocalIssue> {
    store.list_issues(true).expect("list issues")
}

/// One full run with default mapping.
pub fn run_sync<S: IssueStore + ?Sized>(
    store: &mut S,
    remote: &mut FakeRemote,
    beads_dir: &Path,
    dry_run: bool,
) -> clickup_sync::Result<clickup_sync::model::SyncResult> {
    let options = SyncOptions::new(LIST_ID).dry_run(dry_run);
    SyncEngine::new(store, remote, FieldMapper::default(), options, beads_dir).run()
}
