//! Archive command implementation.
//!
//! Tasks are never deleted; they are moved to the lane the closed status maps to.

use super::Workspace;
use crate::cli::ArchiveArgs;
use crate::error::Result;
use crate::model::{RemoteTask, Status, TaskUpdate};
use crate::remote::RemoteService;
use std::io::{self, BufRead, Write};
use tracing::info;

/// Close the given remote tasks after showing them and asking for
/// confirmation (unless `--force`).
///
/// Exit code is 1 when nothing could be archived or any update failed.
///
/// # Errors
///
/// Returns an error if the token is missing or the prompt cannot be read.
pub fn execute(args: &ArchiveArgs, workspace: &Workspace) -> Result<i32> {
    let mut remote = workspace.open_remote()?;
    let lane = workspace.config.mapper().status_to_remote(Status::Closed).to_string();

    println!("Tasks to archive:");
    let tasks = fetch_tasks(&remote, &args.task_ids);
    if tasks.is_empty() {
        println!("\nNo valid tasks to archive.");
        return Ok(1);
    }

    if !args.force {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        if !confirm(&mut stdin.lock(), &mut stdout, tasks.len())? {
            println!("Aborted.");
            return Ok(0);
        }
    }

    let archived = archive_tasks(&mut remote, &tasks, &lane);
    println!("\nArchived {archived}/{} task(s).", tasks.len());
    Ok(i32::from(archived != tasks.len()))
}

fn fetch_tasks<R: RemoteService + ?Sized>(remote: &R, ids: &[String]) -> Vec<RemoteTask> {
    let mut tasks = Vec::new();
    for id in ids {
        match remote.get_task(id) {
            Ok(task) => {
                println!("  {}: {}", task.id, task.name);
                tasks.push(task);
            }
            Err(err) => eprintln!("  {id}: ERROR - {err}"),
        }
    }
    tasks
}

fn archive_tasks<R: RemoteService + ?Sized>(
    remote: &mut R,
    tasks: &[RemoteTask],
    lane: &str,
) -> usize {
    let mut archived = 0;
    for task in tasks {
        match remote.update_task(&task.id, &TaskUpdate::status(lane)) {
            Ok(()) => {
                info!(task_id = %task.id, lane, "archived task");
                println!("  Archived: {} - {}", task.id, task.name);
                archived += 1;
            }
            Err(err) => eprintln!("  FAILED: {} - {err}", task.id),
        }
    }
    archived
}

fn confirm(input: &mut impl BufRead, output: &mut impl Write, count: usize) -> Result<bool> {
    write!(output, "\nThis will archive {count} task(s). Continue? [y/N] ")?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
