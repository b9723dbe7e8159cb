//! Command-line interface for `clickup-sync`.

pub mod commands;

use crate::config::{Backend, CliOverrides};
use clap::{ArgAction, Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "clickup-sync",
    version,
    about = "Sync beads issues with a ClickUp list in both directions",
    after_help = "Examples:\n  clickup-sync                 run a full sync\n  clickup-sync sync --dry-run  show what a sync would do\n  clickup-sync status          show the linked list and last sync\n  clickup-sync list -f bug     list remote tasks matching 'bug'"
)]
pub struct Cli {
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Also write JSON logs to this file
    #[arg(long, value_name = "PATH", env = "CLICKUP_SYNC_LOG_FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Workspace `.beads` directory (default: discovered from CWD)
    #[arg(long, value_name = "DIR", global = true)]
    pub beads_dir: Option<PathBuf>,

    /// Beads database path (sqlite backend)
    #[arg(long, value_name = "PATH", global = true)]
    pub db: Option<PathBuf>,

    /// Local store backend
    #[arg(long, value_name = "bd|sqlite", global = true)]
    pub backend: Option<Backend>,

    /// Remote list to sync, overriding the project config
    #[arg(long, value_name = "ID", global = true)]
    pub list_id: Option<String>,

    /// Account whose token is used, overriding the project config
    #[arg(long, global = true)]
    pub account: Option<String>,

    /// Machine-readable output
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    #[must_use]
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            list_id: self.list_id.clone(),
            account: self.account.clone(),
            backend: self.backend,
            remote_tag: None,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconcile local issues with the linked list (default)
    Sync(SyncArgs),
    /// Show the linked list, account and last sync
    Status,
    /// List tasks in the linked list
    List(ListArgs),
    /// Move remote tasks to the closed lane
    #[command(alias = "delete")]
    Archive(ArchiveArgs),
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug, Default, Clone)]
pub struct SyncArgs {
    /// Decide and report without writing to either side
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Default, Clone)]
pub struct ListArgs {
    /// Only tasks whose name contains this text (case-insensitive)
    #[arg(short, long)]
    pub filter: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ArchiveArgs {
    /// Remote task ids
    #[arg(required = true, value_name = "ID")]
    pub task_ids: Vec<String>,

    /// Skip the confirmation prompt
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    #[arg(value_enum)]
    pub shell: Shell,
}
