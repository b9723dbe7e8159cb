//! End-to-end reconciliation runs against a real `SQLite` issue store and an
//! in-memory remote list.
//!
//! Covers: pull create/link/update, push create/link/update, the close-reason
//! comment, create-then-link failure recovery, best-effort status writes,
//! dry runs, conflict reporting, lock contention and ledger persistence.

#![allow(clippy::too_many_lines)]

mod common;

use clickup_sync::SyncError;
use clickup_sync::model::{IssueUpdate, Priority, Status};
use clickup_sync::storage::IssueStore;
use clickup_sync::sync::fingerprint::issue_fingerprint;
use clickup_sync::sync::{FieldMapper, RunLock, SyncEngine, SyncLedger, SyncOptions};
use common::fixtures::{self, long_ago, task, task_with};
use common::{
    Call, FakeRemote, FlakyStore, LIST_ID, all_issues, beads_dir, beads_path, run_sync, seed_issue,
    test_db,
};
use std::collections::HashMap;
use std::fs;

// ============================================================================
// PULL
// ============================================================================

#[test]
fn new_remote_task_creates_linked_local_issue() {
    let dir = beads_dir();
    let beads = beads_path(&dir);
    let mut store = test_db();
    let mut remote =
        FakeRemote::with_tasks([task_with("9", "Fix login", "to do", Some(2), long_ago())]);

    let result = run_sync(&mut store, &mut remote, &beads, false).expect("run");

    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.pulled_created, 1);
    assert_eq!(result.pushed_skipped, 1);
    assert_eq!(remote.create_count(), 0);

    let issues = all_issues(&store);
    assert_eq!(issues.len(), 1);
    let issue = &issues[0];
    assert_eq!(issue.title, "Fix login");
    assert_eq!(issue.external_ref.as_deref(), Some("clickup-9"));
    assert_eq!(issue.status, Status::Open);
    assert_eq!(issue.priority, Priority::HIGH);

    let ledger = SyncLedger::load(&beads);
    assert_eq!(ledger.len(), 1);
    assert!(ledger.get(&issue.id).is_some());
}

#[test]
fn pulled_closed_task_is_closed_locally_and_typed_from_tags() {
    let dir = beads_dir();
    let beads = beads_path(&dir);
    let mut store = test_db();
    let mut done = task_with("1", "Old bug", "complete", Some(1), long_ago());
    done.tags = vec!["Bug".into(), "feature".into()];
    let mut remote = FakeRemote::with_tasks([
        done,
        task_with("2", "Underway", "in progress", None, long_ago()),
    ]);

    let result = run_sync(&mut store, &mut remote, &beads, false).expect("run");
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.pulled_created, 2);

    let issues = all_issues(&store);
    let closed = issues.iter().find(|i| i.title == "Old bug").expect("closed issue");
    assert_eq!(closed.status, Status::Closed);
    assert_eq!(closed.issue_type, "bug");
    assert_eq!(closed.priority, Priority::CRITICAL);

    let underway = issues.iter().find(|i| i.title == "Underway").expect("open issue");
    assert_eq!(underway.status, Status::InProgress);
    assert_eq!(underway.priority, Priority::BACKLOG);
    assert_eq!(underway.issue_type, "task");
}

#[test]
fn title_match_links_instead_of_duplicating() {
    let dir = beads_dir();
    let beads = beads_path(&dir);
    let mut store = test_db();
    let id = seed_issue(&mut store, "Fix login");
    let mut remote = FakeRemote::with_tasks([task("9", "Fix login")]);

    let result = run_sync(&mut store, &mut remote, &beads, false).expect("run");

    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.pulled_created, 0);
    assert_eq!(result.pulled_linked, 1);
    assert_eq!(result.pushed_created, 0);
    assert_eq!(remote.create_count(), 0);

    let issues = all_issues(&store);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].id, id);
    assert_eq!(issues[0].external_ref.as_deref(), Some("clickup-9"));
}

#[test]
fn title_link_keeps_newer_remote_content() {
    let dir = beads_dir();
    let beads = beads_path(&dir);
    let mut store = test_db();
    let id = seed_issue(&mut store, "Fix login");
    store
        .update_issue(
            &id,
            &IssueUpdate {
                description: Some("old local body".into()),
                ..IssueUpdate::default()
            },
        )
        .expect("describe");

    let mut newer = task_with("9", "Fix login", "to do", Some(3), fixtures::in_an_hour());
    newer.description = Some("newer remote body".into());
    let mut remote = FakeRemote::with_tasks([newer]);

    let result = run_sync(&mut store, &mut remote, &beads, false).expect("run");
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.pulled_linked, 1);
    assert_eq!(result.pushed_updated, 0);
    assert!(remote.writes().is_empty());
    assert_eq!(remote.task("9").description.as_deref(), Some("newer remote body"));

    let issue = store.get_issue(&id).expect("issue");
    assert_eq!(issue.description.as_deref(), Some("newer remote body"));
    assert_eq!(issue.external_ref.as_deref(), Some("clickup-9"));

    let result = run_sync(&mut store, &mut remote, &beads, false).expect("second run");
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.pulled_updated + result.pushed_updated, 0);
    assert!(remote.writes().is_empty());
}

#[test]
fn title_link_pushes_newer_local_content() {
    let dir = beads_dir();
    let beads = beads_path(&dir);
    let mut store = test_db();
    let id = seed_issue(&mut store, "Fix login");
    store
        .update_issue(
            &id,
            &IssueUpdate {
                description: Some("fresh local body".into()),
                ..IssueUpdate::default()
            },
        )
        .expect("describe");

    let mut stale = task("9", "Fix login");
    stale.description = Some("stale remote body".into());
    let mut remote = FakeRemote::with_tasks([stale]);

    let result = run_sync(&mut store, &mut remote, &beads, false).expect("run");
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.pulled_linked, 1);
    assert_eq!(result.pushed_updated, 1);
    assert_eq!(remote.task("9").description.as_deref(), Some("fresh local body"));
    assert_eq!(
        store.get_issue(&id).expect("issue").description.as_deref(),
        Some("fresh local body")
    );

    remote.clear_calls();
    let result = run_sync(&mut store, &mut remote, &beads, false).expect("second run");
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.pulled_updated + result.pushed_updated, 0);
    assert!(remote.writes().is_empty());
}

#[test]
fn remote_change_closes_then_reopens_local_issue() {
    let dir = beads_dir();
    let beads = beads_path(&dir);
    let mut store = test_db();
    let id = seed_issue(&mut store, "Fix");
    store
        .update_issue(&id, &IssueUpdate::link("clickup-9"))
        .expect("link");

    // Ledger agrees with the local side only, so the remote moved.
    let local_hash = issue_fingerprint(&store.get_issue(&id).expect("issue"));
    let mut ledger = SyncLedger::default();
    ledger.record(&id, &local_hash, "000000000000");
    ledger.save(&beads).expect("save ledger");

    let mut remote =
        FakeRemote::with_tasks([task_with("9", "Fix", "complete", Some(3), long_ago())]);
    let result = run_sync(&mut store, &mut remote, &beads, false).expect("run");
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.pulled_updated, 1);
    assert!(result.conflicts.is_empty());
    assert_eq!(store.get_issue(&id).expect("issue").status, Status::Closed);
    assert!(remote.writes().is_empty());

    remote.tasks.get_mut("9").expect("task").status = "in progress".into();
    let result = run_sync(&mut store, &mut remote, &beads, false).expect("run");
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.pulled_updated, 1);
    assert_eq!(store.get_issue(&id).expect("issue").status, Status::InProgress);
}

#[test]
fn cold_start_newer_remote_wins() {
    let dir = beads_dir();
    let beads = beads_path(&dir);
    let mut store = test_db();
    let id = seed_issue(&mut store, "Draft");
    store
        .update_issue(&id, &IssueUpdate::link("clickup-9"))
        .expect("link");

    let mut remote = FakeRemote::with_tasks([task_with(
        "9",
        "Final",
        "to do",
        Some(3),
        fixtures::in_an_hour(),
    )]);
    let result = run_sync(&mut store, &mut remote, &beads, false).expect("run");

    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.pulled_updated, 1);
    assert_eq!(result.pushed_updated, 0);
    assert_eq!(store.get_issue(&id).expect("issue").title, "Final");
    assert!(remote.writes().is_empty());
}

// ============================================================================
// PUSH
// ============================================================================

#[test]
fn local_issue_is_created_remotely_once() {
    let dir = beads_dir();
    let beads = beads_path(&dir);
    let mut store = test_db();
    let id = seed_issue(&mut store, "Write docs");
    let mut remote = FakeRemote::new();

    let result = run_sync(&mut store, &mut remote, &beads, false).expect("run");
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.pushed_created, 1);
    assert_eq!(remote.tasks.len(), 1);

    let task_id = remote.tasks.keys().next().cloned().expect("task id");
    assert_eq!(
        store.get_issue(&id).expect("issue").external_ref,
        Some(format!("clickup-{task_id}"))
    );
    assert!(
        remote
            .calls()
            .contains(&Call::CreateTask { list_id: LIST_ID.into(), name: "Write docs".into() })
    );

    // Nothing changed on either side: the second run is a no-op.
    remote.clear_calls();
    let result = run_sync(&mut store, &mut remote, &beads, false).expect("second run");
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.pushed_created, 0);
    assert_eq!(result.pushed_skipped, 1);
    assert_eq!(result.pulled_skipped, 1);
    assert!(remote.writes().is_empty(), "{:?}", remote.writes());
}

#[test]
fn closed_issue_posts_reason_once() {
    let dir = beads_dir();
    let beads = beads_path(&dir);
    let mut store = test_db();
    let id = seed_issue(&mut store, "Fix login");
    store
        .update_issue(&id, &IssueUpdate::link("clickup-9"))
        .expect("link");
    store.close_issue(&id, Some("fixed in v2")).expect("close");
    let mut remote = FakeRemote::with_tasks([task("9", "Fix login")]);

    let result = run_sync(&mut store, &mut remote, &beads, false).expect("run");
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.pushed_updated, 1);
    assert_eq!(remote.task("9").status, "closed");
    assert_eq!(remote.comment_texts("9"), ["[Closed] fixed in v2"]);

    remote.clear_calls();
    let result = run_sync(&mut store, &mut remote, &beads, false).expect("second run");
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(remote.comment_texts("9").len(), 1);
    assert!(remote.writes().is_empty(), "{:?}", remote.writes());
}

#[test]
fn close_reason_already_on_remote_is_not_reposted() {
    let dir = beads_dir();
    let beads = beads_path(&dir);
    let mut store = test_db();
    let id = seed_issue(&mut store, "Fix login");
    store
        .update_issue(&id, &IssueUpdate::link("clickup-9"))
        .expect("link");
    store.close_issue(&id, Some("duplicate")).expect("close");

    let mut remote = FakeRemote::with_tasks([task("9", "Fix login")]);
    remote.comments.insert(
        "9".into(),
        vec![clickup_sync::model::Comment {
            id: "c0".into(),
            author: Some("someone".into()),
            text: "[Closed] duplicate of #12".into(),
            created_at: None,
        }],
    );

    let result = run_sync(&mut store, &mut remote, &beads, false).expect("run");
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(remote.comment_texts("9").len(), 1);
}

#[test]
fn status_write_is_best_effort() {
    let dir = beads_dir();
    let beads = beads_path(&dir);
    let mut store = test_db();
    let id = seed_issue(&mut store, "Old title");
    store
        .update_issue(
            &id,
            &IssueUpdate {
                title: Some("New title".into()),
                status: Some(Status::Blocked),
                external_ref: Some("clickup-9".into()),
                ..IssueUpdate::default()
            },
        )
        .expect("update");

    let mut remote = FakeRemote::with_tasks([task("9", "Old title")]);
    remote.restrict_lanes(&["to do", "in progress", "closed"]);

    let result = run_sync(&mut store, &mut remote, &beads, false).expect("run");

    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.pushed_updated, 1);
    assert_eq!(remote.task("9").name, "New title");
    assert_eq!(remote.task("9").status, "to do");
    let attempted = remote.calls().into_iter().any(|call| {
        matches!(call, Call::UpdateTask { update, .. } if update.status.as_deref() == Some("on hold"))
    });
    assert!(attempted, "status write was not attempted");
}

#[test]
fn refused_lane_never_reverts_local_status() {
    let dir = beads_dir();
    let beads = beads_path(&dir);
    let mut store = test_db();
    let id = seed_issue(&mut store, "Waiting on vendor");
    store
        .update_issue(
            &id,
            &IssueUpdate {
                status: Some(Status::Blocked),
                external_ref: Some("clickup-9".into()),
                ..IssueUpdate::default()
            },
        )
        .expect("update");

    let mut remote = FakeRemote::with_tasks([task("9", "Waiting on vendor")]);
    remote.restrict_lanes(&["to do", "in progress", "closed"]);

    for run in 0..2 {
        let result = run_sync(&mut store, &mut remote, &beads, false).expect("run");
        assert!(result.errors.is_empty(), "run {run}: {:?}", result.errors);
        assert_eq!(result.pulled_updated, 0, "run {run}");
        assert_eq!(result.pushed_updated, 1, "run {run}");
        assert_eq!(store.get_issue(&id).expect("issue").status, Status::Blocked);
    }

    // The missing lane is retried each run.
    let attempts = remote
        .calls()
        .into_iter()
        .filter(|call| {
            matches!(call, Call::UpdateTask { update, .. } if update.status.as_deref() == Some("on hold"))
        })
        .count();
    assert_eq!(attempts, 2);
    assert_eq!(remote.task("9").status, "to do");
}

#[test]
fn configured_lane_round_trips_without_rewrites() {
    let dir = beads_dir();
    let beads = beads_path(&dir);
    let mut store = test_db();
    let id = seed_issue(&mut store, "Waiting on vendor");
    store
        .update_issue(
            &id,
            &IssueUpdate {
                status: Some(Status::Blocked),
                external_ref: Some("clickup-9".into()),
                ..IssueUpdate::default()
            },
        )
        .expect("update");

    let mut remote = FakeRemote::with_tasks([task("9", "Waiting on vendor")]);
    remote.restrict_lanes(&["to do", "waiting", "closed"]);
    let mapper = FieldMapper::new(&HashMap::from([(Status::Blocked, "waiting".to_string())]), None);

    for _ in 0..2 {
        let options = SyncOptions::new(LIST_ID);
        SyncEngine::new(&mut store, &mut remote, mapper.clone(), options, &beads)
            .run()
            .expect("run");
    }

    assert_eq!(remote.task("9").status, "waiting");
    let status_writes = remote
        .calls()
        .into_iter()
        .filter(|call| matches!(call, Call::UpdateTask { update, .. } if update.status.is_some()))
        .count();
    assert_eq!(status_writes, 1);
}

#[test]
fn foreign_external_ref_is_left_alone() {
    let dir = beads_dir();
    let beads = beads_path(&dir);
    let mut store = test_db();
    let id = seed_issue(&mut store, "Tracked elsewhere");
    store
        .update_issue(&id, &IssueUpdate::link("jira-12"))
        .expect("link");
    let mut remote = FakeRemote::new();

    let result = run_sync(&mut store, &mut remote, &beads, false).expect("run");
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.pushed_skipped, 1);
    assert_eq!(remote.create_count(), 0);
}

#[test]
fn duplicate_local_titles_are_not_errors() {
    let dir = beads_dir();
    let beads = beads_path(&dir);
    let mut store = test_db();
    seed_issue(&mut store, "Same");
    seed_issue(&mut store, "same ");
    let mut remote = FakeRemote::new();

    let result = run_sync(&mut store, &mut remote, &beads, false).expect("run");
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.pushed_created, 2);
}

// ============================================================================
// FAILURES
// ============================================================================

#[test]
fn failed_link_reports_remote_id_and_never_recreates() {
    let dir = beads_dir();
    let beads = beads_path(&dir);
    let mut store = FlakyStore::new(test_db());
    store.fail_link = true;
    let id = seed_issue(&mut store, "Ship it");
    let mut remote = FakeRemote::new();

    let result = run_sync(&mut store, &mut remote, &beads, false).expect("run");
    assert_eq!(remote.create_count(), 1);
    assert_eq!(result.pushed_created, 0);
    assert_eq!(result.errors.len(), 1);
    let error = &result.errors[0];
    assert!(error.contains(&id), "{error}");
    assert!(error.contains("new1"), "{error}");
    assert!(
        error.contains(&format!("bd update {id} --external-ref clickup-new1")),
        "{error}"
    );
    assert!(!SyncLedger::path(&beads).exists());

    // Next run: the orphan is adopted by title, not created again.
    store.fail_link = false;
    let result = run_sync(&mut store, &mut remote, &beads, false).expect("retry");
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.pulled_linked, 1);
    assert_eq!(remote.create_count(), 1);
    assert_eq!(remote.tasks.len(), 1);
    assert_eq!(
        store.get_issue(&id).expect("issue").external_ref.as_deref(),
        Some("clickup-new1")
    );
}

#[test]
fn failed_create_is_a_plain_error() {
    let dir = beads_dir();
    let beads = beads_path(&dir);
    let mut store = test_db();
    let id = seed_issue(&mut store, "Cannot create");
    let mut remote = FakeRemote::new();
    remote.fail_create = true;

    let result = run_sync(&mut store, &mut remote, &beads, false).expect("run");
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("failed to create remote task"));
    assert!(result.errors[0].contains(&id));
    assert!(store.get_issue(&id).expect("issue").external_ref.is_none());
}

#[test]
fn vanished_remote_task_is_reported() {
    let dir = beads_dir();
    let beads = beads_path(&dir);
    let mut store = test_db();
    let id = seed_issue(&mut store, "Orphaned link");
    store
        .update_issue(&id, &IssueUpdate::link("clickup-gone"))
        .expect("link");
    let mut remote = FakeRemote::new();

    let result = run_sync(&mut store, &mut remote, &beads, false).expect("run");
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("no longer exists"), "{}", result.errors[0]);
    assert_eq!(remote.create_count(), 0);
}

#[test]
fn errors_leave_the_ledger_untouched() {
    let dir = beads_dir();
    let beads = beads_path(&dir);
    let mut store = test_db();
    seed_issue(&mut store, "Fix login");
    let mut remote = FakeRemote::with_tasks([task("9", "Fix login")]);

    run_sync(&mut store, &mut remote, &beads, false).expect("first run");
    let saved = fs::read_to_string(SyncLedger::path(&beads)).expect("ledger saved");

    remote.fail_list = true;
    let result = run_sync(&mut store, &mut remote, &beads, false).expect("run");
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("Failed to list remote tasks in list L1"));
    assert_eq!(result.pulled_skipped + result.pushed_skipped, 0);
    assert_eq!(
        fs::read_to_string(SyncLedger::path(&beads)).expect("ledger"),
        saved
    );
}

#[test]
fn local_listing_failure_skips_both_stages() {
    let dir = beads_dir();
    let beads = beads_path(&dir);
    let mut store = FlakyStore::new(test_db());
    store.fail_list = true;
    let mut remote = FakeRemote::with_tasks([task("9", "Fix login")]);

    let result = run_sync(&mut store, &mut remote, &beads, false).expect("run");
    assert_eq!(result.errors.len(), 2);
    assert!(result.errors[0].contains("for pull"));
    assert!(result.errors[1].contains("for push"));
    assert!(!SyncLedger::path(&beads).exists());
}

#[test]
fn held_lock_aborts_before_any_io() {
    let dir = beads_dir();
    let beads = beads_path(&dir);
    let mut store = test_db();
    seed_issue(&mut store, "Fix login");
    let mut remote = FakeRemote::with_tasks([task("9", "Other")]);

    let _held = RunLock::acquire(&beads).expect("first lock");
    let err = run_sync(&mut store, &mut remote, &beads, false).unwrap_err();

    assert!(matches!(err, SyncError::SyncInProgress { .. }), "{err}");
    assert!(remote.calls().is_empty());
    assert_eq!(all_issues(&store).len(), 1);
}

// ============================================================================
// DRY RUN AND CONFLICTS
// ============================================================================

#[test]
fn dry_run_counts_but_writes_nothing() {
    let dir = beads_dir();
    let beads = beads_path(&dir);
    let mut store = test_db();
    seed_issue(&mut store, "Local only");
    let mut remote = FakeRemote::with_tasks([task("5", "Remote only")]);

    let result = run_sync(&mut store, &mut remote, &beads, true).expect("run");

    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.pulled_created, 1);
    assert_eq!(result.pushed_created, 1);
    assert!(remote.writes().is_empty());
    assert_eq!(all_issues(&store).len(), 1);
    assert!(!SyncLedger::path(&beads).exists());
}

#[test]
fn dry_run_title_link_is_seen_by_push() {
    let dir = beads_dir();
    let beads = beads_path(&dir);
    let mut store = test_db();
    let id = seed_issue(&mut store, "Fix login");
    let mut remote = FakeRemote::with_tasks([task("9", "Fix login")]);

    let result = run_sync(&mut store, &mut remote, &beads, true).expect("run");

    assert_eq!(result.pulled_linked, 1);
    assert_eq!(result.pushed_created, 0);
    assert_eq!(result.pushed_skipped, 1);
    assert!(remote.writes().is_empty());
    assert!(store.get_issue(&id).expect("issue").external_ref.is_none());
}

#[test]
fn both_sides_changed_is_reported_as_conflict() {
    let dir = beads_dir();
    let beads = beads_path(&dir);
    let mut store = test_db();
    let id = seed_issue(&mut store, "Local wording");
    store
        .update_issue(&id, &IssueUpdate::link("clickup-9"))
        .expect("link");
    let mut ledger = SyncLedger::default();
    ledger.record(&id, "aaaaaaaaaaaa", "bbbbbbbbbbbb");
    ledger.save(&beads).expect("save ledger");

    let mut remote = FakeRemote::with_tasks([task("9", "Remote wording")]);
    let result = run_sync(&mut store, &mut remote, &beads, false).expect("run");

    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.conflicts, [id.clone()]);
    assert_eq!(result.pushed_updated, 1);
    assert_eq!(remote.task("9").name, "Local wording");

    let saved = SyncLedger::load(&beads);
    let entry = saved.get(&id).expect("entry");
    assert_eq!(
        entry.local_hash,
        issue_fingerprint(&store.get_issue(&id).expect("issue"))
    );
    assert_eq!(entry.local_hash, entry.remote_hash);
}
