//! Output formatting for `clickup_sync`.
//!
//! Human-readable text goes to stdout; `--json` output uses the serde
//! representations of the same values.

use crate::model::{RemoteTask, SyncResult};
use chrono::{DateTime, Local, Utc};
use std::fmt::Write;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Width of the status column in task listings.
const STATUS_WIDTH: usize = 12;

/// Truncate `text` to at most `max_width` terminal columns, ending in `…`
/// when cut.
#[must_use]
pub fn truncate_title(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    if max_width == 0 {
        return String::new();
    }

    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > max_width - 1 {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

/// Left-align `text` in a column of `width` terminal cells.
#[must_use]
pub fn pad_to_width(text: &str, width: usize) -> String {
    let text = truncate_title(text, width);
    let padding = width.saturating_sub(text.width());
    format!("{text}{}", " ".repeat(padding))
}

/// One line of `list` output: `  <id>  [P<n>] [<status>] <name>`.
#[must_use]
pub fn format_task_line(task: &RemoteTask, name_width: Option<usize>) -> String {
    let priority = task
        .priority
        .map_or_else(|| "P-".to_string(), |p| format!("P{p}"));
    let status = if task.status.is_empty() {
        "unknown"
    } else {
        task.status.as_str()
    };
    let name = name_width.map_or_else(|| task.name.clone(), |w| truncate_title(&task.name, w));
    format!(
        "  {}  [{priority}] [{}] {name}",
        task.id,
        pad_to_width(status, STATUS_WIDTH)
    )
}

/// Run summary followed by conflicts and errors, if any.
#[must_use]
pub fn format_sync_report(result: &SyncResult, dry_run: bool) -> String {
    let mut out = String::new();
    let heading = if dry_run {
        "Dry run complete (nothing written):"
    } else {
        "Sync complete:"
    };
    let _ = writeln!(out, "{heading}");
    for line in result.to_string().lines() {
        let _ = writeln!(out, "  {line}");
    }

    if !result.conflicts.is_empty() {
        let _ = writeln!(
            out,
            "\nConflicts resolved by timestamp ({}): {}",
            result.conflicts.len(),
            result.conflicts.join(", ")
        );
    }
    if result.has_errors() {
        let _ = writeln!(out, "\nErrors ({}):", result.errors.len());
        for error in &result.errors {
            let _ = writeln!(out, "  - {error}");
        }
    }
    out
}

/// Local-time rendering of an optional instant, `Never` when absent.
#[must_use]
pub fn format_timestamp(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(
        || "Never".to_string(),
        |at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S %Z").to_string(),
    )
}

/// Terminal width from `COLUMNS`, if set.
#[must_use]
pub fn terminal_width() -> Option<usize> {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|w| *w > 0)
}
