//! List command implementation.

use super::Workspace;
use crate::cli::ListArgs;
use crate::error::Result;
use crate::format::{format_task_line, terminal_width};
use crate::model::RemoteTask;
use crate::remote::RemoteService;

/// Columns used by the id, priority and status prefix of a task line.
const PREFIX_WIDTH: usize = 40;

/// Print tasks in the linked list, sorted by name.
///
/// # Errors
///
/// Returns an error if the token is missing or the listing fails.
pub fn execute(args: &ListArgs, workspace: &Workspace, json: bool) -> Result<i32> {
    let remote = workspace.open_remote()?;
    let tasks = remote.list_all_tasks(&workspace.config.list.list_id)?;
    let tasks = filter_and_sort(tasks, args.filter.as_deref());

    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        return Ok(0);
    }

    if tasks.is_empty() {
        println!("No tasks found.");
        return Ok(0);
    }

    println!("Tasks in {} ({}):\n", workspace.list_label(), tasks.len());
    let name_width = terminal_width().map(|w| w.saturating_sub(PREFIX_WIDTH).max(20));
    for task in &tasks {
        println!("{}", format_task_line(task, name_width));
    }
    Ok(0)
}

fn filter_and_sort(tasks: Vec<RemoteTask>, filter: Option<&str>) -> Vec<RemoteTask> {
    let needle = filter.map(str::to_lowercase);
    let mut tasks: Vec<RemoteTask> = tasks
        .into_iter()
        .filter(|task| {
            needle
                .as_deref()
                .is_none_or(|needle| task.name.to_lowercase().contains(needle))
        })
        .collect();
    tasks.sort_by_key(|task| task.name.to_lowercase());
    tasks
}
