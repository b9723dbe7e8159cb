//! `SQLite` storage implementation.
//!
//! Talks to a beads database directly, bypassing the `bd` executable. Every
//! mutation runs inside one immediate transaction that also appends audit
//! events and marks the touched issue dirty, so a later `bd sync` exports it.

use crate::error::{Result, SyncError};
use crate::model::{Comment, IssueUpdate, LocalIssue, NewIssue, Priority, Status};
use crate::storage::IssueStore;
use crate::storage::schema::{apply_schema, missing_issue_columns, table_exists};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::debug;

/// Actor recorded on audit events.
pub const DEFAULT_ACTOR: &str = "clickup-sync";

/// Prefix used when the database has no `issue_prefix` config row.
pub const DEFAULT_ISSUE_PREFIX: &str = "bd";

const ISSUE_COLUMNS: &str = "id, title, description, status, priority, issue_type, \
     created_at, updated_at, external_ref, close_reason";

/// SQLite-based issue store.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
    actor: String,
}

struct EventRow {
    issue_id: String,
    event_type: &'static str,
    old_value: Option<String>,
    new_value: Option<String>,
    comment: Option<String>,
}

/// Side effects collected while a mutation runs.
struct MutationContext {
    actor: String,
    events: Vec<EventRow>,
    dirty_ids: HashSet<String>,
}

impl MutationContext {
    fn new(actor: &str) -> Self {
        Self {
            actor: actor.to_string(),
            events: Vec::new(),
            dirty_ids: HashSet::new(),
        }
    }

    fn record_event(&mut self, event_type: &'static str, issue_id: &str, comment: Option<String>) {
        self.record_field_change(event_type, issue_id, None, None, comment);
    }

    fn record_field_change(
        &mut self,
        event_type: &'static str,
        issue_id: &str,
        old_value: Option<String>,
        new_value: Option<String>,
        comment: Option<String>,
    ) {
        self.events.push(EventRow {
            issue_id: issue_id.to_string(),
            event_type,
            old_value,
            new_value,
            comment,
        });
    }

    fn mark_dirty(&mut self, issue_id: &str) {
        self.dirty_ids.insert(issue_id.to_string());
    }
}

impl SqliteStorage {
    /// Open the beads database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established, the existing
    /// `issues` table lacks columns the backend needs, or schema application
    /// fails.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        if table_exists(&conn, "issues") {
            let missing = missing_issue_columns(&conn);
            if !missing.is_empty() {
                return Err(SyncError::validation(
                    "database",
                    format!(
                        "{} is missing issue columns: {}; run 'bd migrate' first",
                        path.display(),
                        missing.join(", ")
                    ),
                ));
            }
        }
        apply_schema(&conn)?;
        debug!(path = %path.display(), "opened beads database");
        Ok(Self {
            conn,
            actor: DEFAULT_ACTOR.to_string(),
        })
    }

    /// Open an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            conn,
            actor: DEFAULT_ACTOR.to_string(),
        })
    }

    /// Use `actor` on audit events and authored comments.
    #[must_use]
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    /// Run `f` in an immediate transaction, then write its events and dirty
    /// marks in the same transaction. Rolled back on error.
    fn mutate<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let mut ctx = MutationContext::new(&self.actor);

        let result = f(&tx, &mut ctx)?;

        let now = Utc::now().to_rfc3339();
        for event in ctx.events {
            tx.execute(
                "INSERT INTO events (issue_id, event_type, actor, old_value, new_value, comment, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                rusqlite::params![
                    event.issue_id,
                    event.event_type,
                    ctx.actor,
                    event.old_value,
                    event.new_value,
                    event.comment,
                    now
                ],
            )?;
        }

        for id in ctx.dirty_ids {
            tx.execute(
                "INSERT OR REPLACE INTO dirty_issues (issue_id, marked_at) VALUES (?, ?)",
                rusqlite::params![id, now],
            )?;
        }

        tx.commit()?;
        Ok(result)
    }

    fn find_issue(&self, id: &str) -> Result<Option<LocalIssue>> {
        let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ? AND status != 'tombstone'");
        let issue = self
            .conn
            .query_row(&sql, [id], issue_from_row)
            .optional()?;

        match issue {
            Some(mut issue) => {
                issue.labels = self.get_labels(id)?;
                Ok(Some(issue))
            }
            None => Ok(None),
        }
    }

    /// Labels for one issue, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_labels(&self, issue_id: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT label FROM labels WHERE issue_id = ? ORDER BY label")?;
        let labels = stmt
            .query_map([issue_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(labels)
    }

    fn all_labels(&self) -> Result<HashMap<String, Vec<String>>> {
        let mut stmt = self
            .conn
            .prepare("SELECT issue_id, label FROM labels ORDER BY issue_id, label")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get(1)?)))?;
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            let (issue_id, label) = row?;
            map.entry(issue_id).or_default().push(label);
        }
        Ok(map)
    }

    /// Read a row of the `config` table.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM config WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a row of the `config` table.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub fn set_config(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO config (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    /// Ids currently waiting for JSONL export.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn dirty_issue_ids(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT issue_id FROM dirty_issues ORDER BY issue_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Event types recorded for an issue, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn event_types(&self, issue_id: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT event_type FROM events WHERE issue_id = ? ORDER BY id")?;
        let types = stmt
            .query_map([issue_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(types)
    }

    fn issue_prefix(&self) -> Result<String> {
        Ok(self
            .get_config("issue_prefix")?
            .map(|p| p.trim().trim_end_matches('-').to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_ISSUE_PREFIX.to_string()))
    }
}

impl IssueStore for SqliteStorage {
    fn list_issues(&self, include_closed: bool) -> Result<Vec<LocalIssue>> {
        let mut sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE status != 'tombstone'");
        if !include_closed {
            sql.push_str(" AND status != 'closed'");
        }
        sql.push_str(" ORDER BY created_at ASC, id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut issues = stmt
            .query_map([], issue_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut labels = self.all_labels()?;
        for issue in &mut issues {
            issue.labels = labels.remove(&issue.id).unwrap_or_default();
        }
        Ok(issues)
    }

    fn get_issue(&self, id: &str) -> Result<LocalIssue> {
        self.find_issue(id)?
            .ok_or_else(|| SyncError::IssueNotFound { id: id.to_string() })
    }

    fn create_issue(&mut self, issue: &NewIssue) -> Result<String> {
        if issue.title.trim().is_empty() {
            return Err(SyncError::validation("title", "cannot be empty"));
        }
        if !(0..=4).contains(&issue.priority.0) {
            return Err(SyncError::validation(
                "priority",
                format!("{} is outside 0-4", issue.priority.0),
            ));
        }

        let prefix = self.issue_prefix()?;
        self.mutate(|tx, ctx| {
            let id = generate_id(tx, &prefix, &issue.title)?;
            let now = Utc::now().to_rfc3339();
            tx.execute(
                "INSERT INTO issues (
                    id, title, description, status, priority, issue_type,
                    created_at, created_by, updated_at, external_ref
                ) VALUES (?, ?, ?, 'open', ?, ?, ?, ?, ?, ?)",
                rusqlite::params![
                    id,
                    issue.title,
                    issue.description.as_deref().unwrap_or_default(),
                    issue.priority.0,
                    issue.issue_type,
                    now,
                    ctx.actor,
                    now,
                    issue.external_ref,
                ],
            )?;

            for label in &issue.labels {
                tx.execute(
                    "INSERT OR IGNORE INTO labels (issue_id, label) VALUES (?, ?)",
                    rusqlite::params![id, label],
                )?;
            }

            ctx.record_event("created", &id, Some(format!("Created issue: {}", issue.title)));
            ctx.mark_dirty(&id);
            Ok(id)
        })
    }

    fn update_issue(&mut self, id: &str, update: &IssueUpdate) -> Result<()> {
        let existing = self.get_issue(id)?;
        if update.is_empty() {
            return Ok(());
        }

        self.mutate(|tx, ctx| {
            let mut set_clauses: Vec<&str> = vec![];
            let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![];

            if let Some(ref title) = update.title {
                set_clauses.push("title = ?");
                params.push(Box::new(title.clone()));
                ctx.record_field_change(
                    "updated",
                    id,
                    Some(existing.title.clone()),
                    Some(title.clone()),
                    Some("Title changed".to_string()),
                );
            }

            if let Some(ref description) = update.description {
                set_clauses.push("description = ?");
                params.push(Box::new(description.clone()));
            }

            if let Some(status) = update.status {
                set_clauses.push("status = ?");
                params.push(Box::new(status.as_str().to_string()));
                if status.is_closed() && !existing.status.is_closed() {
                    set_clauses.push("closed_at = ?");
                    params.push(Box::new(Utc::now().to_rfc3339()));
                } else if !status.is_closed() && existing.status.is_closed() {
                    set_clauses.push("closed_at = NULL");
                    set_clauses.push("close_reason = ''");
                }
                if status != existing.status {
                    ctx.record_field_change(
                        if existing.status.is_closed() {
                            "reopened"
                        } else {
                            "status_changed"
                        },
                        id,
                        Some(existing.status.as_str().to_string()),
                        Some(status.as_str().to_string()),
                        None,
                    );
                }
            }

            if let Some(priority) = update.priority {
                set_clauses.push("priority = ?");
                params.push(Box::new(priority.0));
                if priority != existing.priority {
                    ctx.record_field_change(
                        "priority_changed",
                        id,
                        Some(existing.priority.0.to_string()),
                        Some(priority.0.to_string()),
                        None,
                    );
                }
            }

            if let Some(ref external_ref) = update.external_ref {
                set_clauses.push("external_ref = ?");
                params.push(Box::new(external_ref.clone()));
                ctx.record_field_change(
                    "updated",
                    id,
                    existing.external_ref.clone(),
                    Some(external_ref.clone()),
                    Some("External ref changed".to_string()),
                );
            }

            set_clauses.push("updated_at = ?");
            params.push(Box::new(Utc::now().to_rfc3339()));

            let sql = format!("UPDATE issues SET {} WHERE id = ?", set_clauses.join(", "));
            params.push(Box::new(id.to_string()));

            let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(AsRef::as_ref).collect();
            tx.execute(&sql, params_refs.as_slice())?;

            ctx.mark_dirty(id);
            Ok(())
        })
    }

    fn close_issue(&mut self, id: &str, reason: Option<&str>) -> Result<()> {
        let existing = self.get_issue(id)?;
        self.mutate(|tx, ctx| {
            let now = Utc::now().to_rfc3339();
            tx.execute(
                "UPDATE issues
                 SET status = 'closed', closed_at = COALESCE(closed_at, ?),
                     close_reason = ?, updated_at = ?
                 WHERE id = ?",
                rusqlite::params![now, reason.unwrap_or_default(), now, id],
            )?;
            ctx.record_field_change(
                "closed",
                id,
                Some(existing.status.as_str().to_string()),
                Some(Status::Closed.as_str().to_string()),
                reason.map(str::to_string),
            );
            ctx.mark_dirty(id);
            Ok(())
        })
    }

    fn list_comments(&self, id: &str) -> Result<Vec<Comment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, author, text, created_at
             FROM comments
             WHERE issue_id = ?
             ORDER BY created_at ASC, id ASC",
        )?;

        let comments = stmt
            .query_map([id], |row| {
                Ok(Comment {
                    id: row.get::<_, i64>(0)?.to_string(),
                    author: row.get(1)?,
                    text: row.get(2)?,
                    created_at: Some(parse_datetime(&row.get::<_, String>(3)?)),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(comments)
    }

    fn add_comment(&mut self, id: &str, text: &str) -> Result<()> {
        self.get_issue(id)?;
        self.mutate(|tx, ctx| {
            let now = Utc::now().to_rfc3339();
            tx.execute(
                "INSERT INTO comments (issue_id, author, text, created_at) VALUES (?, ?, ?, ?)",
                rusqlite::params![id, ctx.actor, text, now],
            )?;
            tx.execute(
                "UPDATE issues SET updated_at = ? WHERE id = ?",
                rusqlite::params![now, id],
            )?;
            ctx.record_event("commented", id, Some(text.to_string()));
            ctx.mark_dirty(id);
            Ok(())
        })
    }
}

fn issue_from_row(row: &rusqlite::Row) -> rusqlite::Result<LocalIssue> {
    Ok(LocalIssue {
        id: row.get(0)?,
        title: row.get(1)?,
        description: non_empty(row.get(2)?),
        status: parse_status(row.get::<_, Option<String>>(3)?.as_deref()),
        priority: Priority(row.get::<_, Option<i32>>(4)?.unwrap_or(2)),
        issue_type: non_empty(row.get(5)?).unwrap_or_else(crate::model::default_issue_type),
        created_at: parse_datetime(&row.get::<_, String>(6)?),
        updated_at: parse_datetime(&row.get::<_, String>(7)?),
        external_ref: non_empty(row.get(8)?),
        labels: vec![],
        close_reason: non_empty(row.get(9)?),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_status(s: Option<&str>) -> Status {
    s.and_then(|s| s.parse().ok()).unwrap_or_default()
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Utc.from_utc_datetime(&naive);
    }

    Utc::now()
}

/// `<prefix>-<hash>`, lengthening the hash until it is unused.
fn generate_id(tx: &Transaction<'_>, prefix: &str, title: &str) -> Result<String> {
    let seed = format!(
        "{title}|{}|{}",
        Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        std::process::id()
    );
    let digest = format!("{:x}", Sha256::digest(seed.as_bytes()));

    for len in 4..=digest.len() {
        let id = format!("{prefix}-{}", &digest[..len]);
        let taken: bool = tx
            .prepare("SELECT 1 FROM issues WHERE id = ?")?
            .exists([&id])?;
        if !taken {
            return Ok(id);
        }
    }

    Err(SyncError::validation("id", "could not allocate a unique issue id"))
}
