//! Sync command implementation.

use super::Workspace;
use crate::cli::{Cli, SyncArgs};
use crate::config;
use crate::error::Result;
use crate::format::format_sync_report;
use crate::sync::{RunLock, SyncEngine};
use chrono::Utc;
use tracing::{info, warn};

/// Execute one sync run. Exit code 1 when the run reported errors.
///
/// # Errors
///
/// Returns an error if the client cannot be set up, another run holds the
/// lock, or the store cannot be opened.
pub fn execute(args: &SyncArgs, workspace: &Workspace, cli: &Cli) -> Result<i32> {
    let mut remote = workspace.open_remote()?;
    // Opening the sqlite backend applies pragmas and schema, so lock first.
    let lock = RunLock::acquire(&workspace.beads_dir)?;
    let mut store = workspace.open_store(cli.db.as_ref())?;

    if !cli.json {
        println!("Syncing with ClickUp list: {}...", workspace.list_label());
    }

    let mut engine = SyncEngine::new(
        &mut *store,
        &mut remote,
        workspace.config.mapper(),
        workspace.config.sync_options(args.dry_run),
        &workspace.beads_dir,
    );
    let result = engine.run_locked(lock);

    if !args.dry_run {
        if let Err(err) = config::save_last_sync(&workspace.beads_dir, Utc::now()) {
            warn!(error = %err, "could not record last sync time");
        }
    }
    info!(
        errors = result.errors.len(),
        conflicts = result.conflicts.len(),
        dry_run = args.dry_run,
        "sync finished"
    );

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!();
        print!("{}", format_sync_report(&result, args.dry_run));
    }

    Ok(i32::from(result.has_errors()))
}
