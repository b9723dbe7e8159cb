//! Status command implementation.

use super::Workspace;
use crate::error::{Result, SyncError};
use crate::format::format_timestamp;
use crate::sync::{RunLock, SyncLedger};
use serde_json::json;

/// Print the linked list, account, backend and sync bookkeeping.
///
/// # Errors
///
/// Returns an error only if JSON output cannot be rendered.
pub fn execute(workspace: &Workspace, json: bool) -> Result<i32> {
    let config = &workspace.config;
    let ledger = SyncLedger::load(&workspace.beads_dir);
    let locked = matches!(
        RunLock::acquire(&workspace.beads_dir),
        Err(SyncError::SyncInProgress { .. })
    );

    if json {
        let output = json!({
            "list_id": config.list.list_id,
            "list_name": config.list.list_name,
            "space_id": config.list.space_id,
            "space_name": config.list.space_name,
            "account": config.account,
            "backend": config.backend.to_string(),
            "remote_tag": config.remote_tag,
            "last_sync": config.last_sync,
            "ledger_entries": ledger.len(),
            "ledger_last_synced": ledger.last_synced_at(),
            "sync_in_progress": locked,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(0);
    }

    println!("ClickUp List: {}", workspace.list_label());
    let space = config
        .list
        .space_name
        .as_deref()
        .or(config.list.space_id.as_deref())
        .unwrap_or("-");
    println!("Space: {space}");
    println!("Account: {}", config.account);
    println!("Backend: {}", config.backend);
    println!("Last sync: {}", format_timestamp(config.last_sync));
    println!("Tracked pairs: {}", ledger.len());
    if locked {
        println!("A sync run is in progress.");
    }
    Ok(0)
}
