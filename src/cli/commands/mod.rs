//! Subcommand implementations and the workspace context they share.

pub mod archive;
pub mod completions;
pub mod list;
pub mod status;
pub mod sync;

use crate::cli::{Cli, Commands, SyncArgs};
use crate::config::{self, Backend, SyncConfig};
use crate::error::{Result, SyncError};
use crate::remote::ClickUpClient;
use crate::remote::clickup::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use crate::storage::{BdCli, IssueStore};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Dispatch the parsed command line. Returns the process exit code.
///
/// # Errors
///
/// Returns an error for setup failures (no workspace, bad config, missing
/// token) and for lock contention. Per-item sync failures are reported in
/// the output and the exit code instead.
pub fn execute(cli: &Cli) -> Result<i32> {
    match &cli.command {
        Some(Commands::Completions(args)) => {
            completions::execute(args);
            Ok(0)
        }
        Some(Commands::Status) => status::execute(&Workspace::open(cli)?, cli.json),
        Some(Commands::List(args)) => list::execute(args, &Workspace::open(cli)?, cli.json),
        Some(Commands::Archive(args)) => archive::execute(args, &Workspace::open(cli)?),
        Some(Commands::Sync(args)) => sync::execute(args, &Workspace::open(cli)?, cli),
        None => sync::execute(&SyncArgs::default(), &Workspace::open(cli)?, cli),
    }
}

/// A discovered `.beads` directory with its loaded sync config.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub beads_dir: PathBuf,
    pub config: SyncConfig,
}

impl Workspace {
    /// Locate the workspace and load `clickup.yaml`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotInitialized`] when no `.beads` directory is
    /// found, or a config error.
    pub fn open(cli: &Cli) -> Result<Self> {
        let beads_dir = match &cli.beads_dir {
            Some(dir) if dir.is_dir() => dir.clone(),
            Some(_) => return Err(SyncError::NotInitialized),
            None => config::discover_beads_dir(None)?,
        };
        let config = SyncConfig::load(&beads_dir, &cli.overrides())?;
        debug!(beads_dir = %beads_dir.display(), account = %config.account, "opened workspace");
        Ok(Self { beads_dir, config })
    }

    /// Directory containing `.beads`, where `bd` must run.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.beads_dir.parent().unwrap_or(&self.beads_dir)
    }

    /// Open the configured local issue store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened (sqlite backend).
    pub fn open_store(&self, db_override: Option<&PathBuf>) -> Result<Box<dyn IssueStore>> {
        match self.config.backend {
            Backend::Bd => Ok(Box::new(BdCli::new(self.root()))),
            Backend::Sqlite => {
                let (storage, paths) = config::open_storage(&self.beads_dir, db_override)?;
                debug!(db = %paths.db_path.display(), "opened beads database");
                Ok(Box::new(storage))
            }
        }
    }

    /// Build the ClickUp client with this workspace's account token.
    ///
    /// # Errors
    ///
    /// Returns a config error if no token can be found.
    pub fn open_remote(&self) -> Result<ClickUpClient> {
        let token = config::load_token(&self.config.account)?;
        let base_url = self.config.api_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        ClickUpClient::with_options(&token, base_url, DEFAULT_TIMEOUT)
    }

    /// Display name of the linked list.
    #[must_use]
    pub fn list_label(&self) -> String {
        let list = &self.config.list;
        list.list_name.as_ref().map_or_else(
            || list.list_id.clone(),
            |name| format!("{name} ({})", list.list_id),
        )
    }
}
