//! Configuration management for `clickup_sync`.
//!
//! Configuration sources and precedence (highest wins):
//! 1. CLI overrides
//! 2. Environment variables (`CLICKUP_SYNC_*`, `CLICKUP_LIST_ID`, `CLICKUP_ACCOUNT`)
//! 3. Project config (.beads/clickup.yaml)
//! 4. Defaults
//!
//! The API token never lives in the project file; see [`load_token`].

use crate::error::{Result, SyncError};
use crate::model::Status;
use crate::storage::SqliteStorage;
use crate::sync::{DEFAULT_REMOTE_TAG, FieldMapper, SyncOptions};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Project config file inside `.beads`.
pub const CONFIG_FILE: &str = "clickup.yaml";
/// Default database filename used when metadata is missing.
const DEFAULT_DB_FILENAME: &str = "beads.db";
const ENV_PREFIX: &str = "CLICKUP_SYNC_";
const TOKEN_ENV: &str = "CLICKUP_TOKEN";

/// Beads startup metadata; only the database location matters here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Metadata {
    pub database: String,
    pub backend: Option<String>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            database: DEFAULT_DB_FILENAME.to_string(),
            backend: None,
        }
    }
}

impl Metadata {
    /// Load metadata.json from the beads directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(beads_dir: &Path) -> Result<Self> {
        let path = beads_dir.join("metadata.json");
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path)?;
        let mut metadata: Self = serde_json::from_str(&contents)?;
        if metadata.database.trim().is_empty() {
            metadata.database = DEFAULT_DB_FILENAME.to_string();
        }
        Ok(metadata)
    }
}

/// Resolved paths for this workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub beads_dir: PathBuf,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    pub metadata: Metadata,
}

impl ConfigPaths {
    /// Resolve the database and config file paths.
    ///
    /// # Errors
    ///
    /// Returns an error if metadata cannot be read.
    pub fn resolve(beads_dir: &Path, db_override: Option<&PathBuf>) -> Result<Self> {
        let metadata = Metadata::load(beads_dir)?;
        let db_path = db_override.cloned().unwrap_or_else(|| {
            let candidate = PathBuf::from(&metadata.database);
            if candidate.is_absolute() {
                candidate
            } else {
                beads_dir.join(candidate)
            }
        });

        Ok(Self {
            beads_dir: beads_dir.to_path_buf(),
            db_path,
            config_path: beads_dir.join(CONFIG_FILE),
            metadata,
        })
    }
}

/// Discover the active `.beads` directory.
///
/// Honors `BEADS_DIR` when set, otherwise walks up from `start` (or CWD).
///
/// # Errors
///
/// Returns an error if no beads directory is found or the CWD cannot be read.
pub fn discover_beads_dir(start: Option<&Path>) -> Result<PathBuf> {
    let from_env = env::var_os("BEADS_DIR")
        .filter(|value| !value.is_empty())
        .map(PathBuf::from);
    discover_beads_dir_with_env(start, from_env.as_deref())
}

fn discover_beads_dir_with_env(
    start: Option<&Path>,
    env_override: Option<&Path>,
) -> Result<PathBuf> {
    if let Some(path) = env_override {
        if path.is_dir() {
            return Ok(path.to_path_buf());
        }
    }

    let mut current = match start {
        Some(path) => path.to_path_buf(),
        None => env::current_dir()?,
    };

    loop {
        let candidate = current.join(".beads");
        if candidate.is_dir() {
            return Ok(candidate);
        }
        if !current.pop() {
            break;
        }
    }

    Err(SyncError::NotInitialized)
}

/// Open the beads database using resolved paths.
///
/// # Errors
///
/// Returns an error if metadata cannot be read or the database cannot be opened.
pub fn open_storage(
    beads_dir: &Path,
    db_override: Option<&PathBuf>,
) -> Result<(SqliteStorage, ConfigPaths)> {
    let paths = ConfigPaths::resolve(beads_dir, db_override)?;
    let storage = SqliteStorage::open(&paths.db_path)?;
    Ok((storage, paths))
}

/// A flat set of dotted config keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    pub values: HashMap<String, String>,
}

impl ConfigLayer {
    /// Merge another layer on top of this one (higher precedence wins).
    pub fn merge_from(&mut self, other: &Self) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Merge multiple layers in precedence order (lowest to highest).
    #[must_use]
    pub fn merge_layers(layers: &[Self]) -> Self {
        let mut merged = Self::default();
        for layer in layers {
            merged.merge_from(layer);
        }
        merged
    }

    /// Build a layer from a YAML file path. Missing files return empty config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn from_yaml(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_yaml_str(&fs::read_to_string(path)?)
    }

    /// # Errors
    ///
    /// Returns an error if `contents` is not valid YAML.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(contents)?;
        let mut flat = HashMap::new();
        flatten_yaml(&value, "", &mut flat);

        let mut layer = Self::default();
        for (key, value) in flat {
            layer.insert(&key, value);
        }
        Ok(layer)
    }

    /// Build a layer from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(env::vars())
    }

    /// Build a layer from `(name, value)` pairs shaped like environment variables.
    #[must_use]
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut layer = Self::default();
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                for variant in env_key_variants(stripped) {
                    layer.insert(&variant, value.clone());
                }
            } else if key == "CLICKUP_LIST_ID" {
                layer.insert("list_id", value);
            } else if key == "CLICKUP_ACCOUNT" {
                layer.insert("account", value);
            }
        }
        layer
    }

    fn insert(&mut self, key: &str, value: String) {
        self.values.insert(canonical_key(key), value);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(&canonical_key(key))
            .map(String::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// CLI overrides for config loading (optional).
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub list_id: Option<String>,
    pub account: Option<String>,
    pub backend: Option<Backend>,
    pub remote_tag: Option<String>,
}

impl CliOverrides {
    #[must_use]
    pub fn as_layer(&self) -> ConfigLayer {
        let mut layer = ConfigLayer::default();
        if let Some(list_id) = &self.list_id {
            layer.insert("list_id", list_id.clone());
        }
        if let Some(account) = &self.account {
            layer.insert("account", account.clone());
        }
        if let Some(backend) = self.backend {
            layer.insert("backend", backend.to_string());
        }
        if let Some(tag) = &self.remote_tag {
            layer.insert("remote_tag", tag.clone());
        }
        layer
    }
}

/// Which local issue store implementation to drive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backend {
    /// Shell out to the `bd` executable.
    #[default]
    Bd,
    /// Open the beads database directly.
    Sqlite,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bd => "bd",
            Self::Sqlite => "sqlite",
        })
    }
}

impl FromStr for Backend {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "bd" | "cli" => Ok(Self::Bd),
            "sqlite" | "db" => Ok(Self::Sqlite),
            other => Err(SyncError::Config(format!(
                "unknown backend '{other}' (expected 'bd' or 'sqlite')"
            ))),
        }
    }
}

/// The remote list a workspace is linked to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkedList {
    pub list_id: String,
    pub list_name: Option<String>,
    pub space_id: Option<String>,
    pub space_name: Option<String>,
}

/// Fully resolved configuration for one workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub account: String,
    pub list: LinkedList,
    pub backend: Backend,
    pub remote_tag: String,
    /// Local status -> remote lane overrides.
    pub status_map: HashMap<Status, String>,
    pub default_remote_priority: Option<u8>,
    pub last_sync: Option<DateTime<Utc>>,
    /// ClickUp API root; the public endpoint when unset.
    pub api_url: Option<String>,
}

impl SyncConfig {
    /// Load `.beads/clickup.yaml` and apply env and CLI layers on top.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if the project file is missing or a
    /// required key is absent, or a parse error if the file is malformed.
    pub fn load(beads_dir: &Path, cli: &CliOverrides) -> Result<Self> {
        let path = beads_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Err(SyncError::Config(format!(
                "{} not found; link a ClickUp list to this workspace first",
                path.display()
            )));
        }

        let layer = ConfigLayer::merge_layers(&[
            default_config_layer(),
            ConfigLayer::from_yaml(&path)?,
            ConfigLayer::from_env(),
            cli.as_layer(),
        ]);
        let config = Self::from_layer(&layer)?;
        tracing::debug!(
            path = %path.display(),
            list_id = %config.list.list_id,
            backend = %config.backend,
            "loaded sync config"
        );
        Ok(config)
    }

    /// Interpret a merged layer.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] for missing required keys or invalid values.
    pub fn from_layer(layer: &ConfigLayer) -> Result<Self> {
        let list_id = layer
            .get("linked_list.list_id")
            .ok_or_else(|| SyncError::Config("no linked list: 'linked_list.list_id' is not set".into()))?;
        let account = layer
            .get("account")
            .ok_or_else(|| SyncError::Config("'account' is not set".into()))?;

        let backend = layer
            .get("backend")
            .map(Backend::from_str)
            .transpose()?
            .unwrap_or_default();

        let default_remote_priority = layer
            .get("priority.default_remote")
            .map(|raw| match raw.parse::<u8>() {
                Ok(value) if (1..=4).contains(&value) => Ok(value),
                _ => Err(SyncError::Config(format!(
                    "priority.default_remote must be 1-4, got '{raw}'"
                ))),
            })
            .transpose()?;

        let last_sync = layer.get("last_sync").and_then(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|at| at.with_timezone(&Utc))
                .map_err(|err| tracing::warn!(value = raw, error = %err, "ignoring unparseable last_sync"))
                .ok()
        });

        let mut status_map = HashMap::new();
        for (key, lane) in &layer.values {
            let Some(name) = key.strip_prefix("status_map.") else {
                continue;
            };
            let lane = lane.trim();
            if lane.is_empty() {
                continue;
            }
            match Status::from_str(name) {
                Ok(status) => {
                    status_map.insert(status, lane.to_string());
                }
                Err(_) => tracing::warn!(status = name, "ignoring status_map entry for unknown status"),
            }
        }

        Ok(Self {
            account: account.to_string(),
            list: LinkedList {
                list_id: list_id.to_string(),
                list_name: layer.get("linked_list.list_name").map(str::to_string),
                space_id: layer.get("linked_list.space_id").map(str::to_string),
                space_name: layer.get("linked_list.space_name").map(str::to_string),
            },
            backend,
            remote_tag: layer
                .get("remote_tag")
                .unwrap_or(DEFAULT_REMOTE_TAG)
                .to_string(),
            status_map,
            default_remote_priority,
            last_sync,
            api_url: layer.get("api_url").map(str::to_string),
        })
    }

    /// Field mapper with this workspace's overrides.
    #[must_use]
    pub fn mapper(&self) -> FieldMapper {
        FieldMapper::new(&self.status_map, self.default_remote_priority)
    }

    #[must_use]
    pub fn sync_options(&self, dry_run: bool) -> SyncOptions {
        SyncOptions::new(self.list.list_id.clone())
            .with_remote_tag(self.remote_tag.clone())
            .dry_run(dry_run)
    }
}

/// Default config layer (lowest precedence).
#[must_use]
pub fn default_config_layer() -> ConfigLayer {
    let mut layer = ConfigLayer::default();
    layer.insert("backend", Backend::default().to_string());
    layer.insert("remote_tag", DEFAULT_REMOTE_TAG.to_string());
    layer
}

/// Read the API token for `account`.
///
/// `CLICKUP_TOKEN` wins; otherwise `~/.claude/secrets/<account>-clickup-token`.
///
/// # Errors
///
/// Returns [`SyncError::Config`] if no non-empty token is found.
pub fn load_token(account: &str) -> Result<String> {
    let home = env::var_os("HOME").map(PathBuf::from);
    load_token_from(env::var(TOKEN_ENV).ok(), home.as_deref(), account)
}

fn load_token_from(env_token: Option<String>, home: Option<&Path>, account: &str) -> Result<String> {
    if let Some(token) = env_token.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) {
        return Ok(token);
    }

    let home = home.ok_or_else(|| SyncError::Config(format!("{TOKEN_ENV} not set and HOME not set")))?;
    let path = token_path(home, account);
    let token = fs::read_to_string(&path).map_err(|err| {
        SyncError::Config(format!(
            "{TOKEN_ENV} not set and cannot read {}: {err}",
            path.display()
        ))
    })?;
    let token = token.trim();
    if token.is_empty() {
        return Err(SyncError::Config(format!("token file {} is empty", path.display())));
    }
    Ok(token.to_string())
}

#[must_use]
pub fn token_path(home: &Path, account: &str) -> PathBuf {
    home.join(".claude")
        .join("secrets")
        .join(format!("{account}-clickup-token"))
}

/// Record `at` as `last_sync` in the project config, keeping every other key.
///
/// # Errors
///
/// Returns an error if the config file is missing, not a YAML mapping, or
/// cannot be rewritten.
pub fn save_last_sync(beads_dir: &Path, at: DateTime<Utc>) -> Result<()> {
    let path = beads_dir.join(CONFIG_FILE);
    let contents = fs::read_to_string(&path)?;
    let mut document: serde_yaml::Value = serde_yaml::from_str(&contents)?;
    let serde_yaml::Value::Mapping(map) = &mut document else {
        return Err(SyncError::Config(format!(
            "{} is not a YAML mapping",
            path.display()
        )));
    };
    map.insert(
        serde_yaml::Value::String("last_sync".to_string()),
        serde_yaml::Value::String(at.to_rfc3339_opts(SecondsFormat::Secs, true)),
    );

    let rendered = serde_yaml::to_string(&document)?;
    let temp_path = path.with_extension("yaml.tmp");
    {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(rendered.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&temp_path, &path)?;
    tracing::debug!(path = %path.display(), "recorded last sync time");
    Ok(())
}

/// Map aliases and env-style spellings onto the YAML key names.
fn canonical_key(key: &str) -> String {
    let normalized = key.trim().to_lowercase().replace('-', "_");
    for prefix in ["status_map.", "status_map_", "status.map."] {
        if let Some(status) = normalized.strip_prefix(prefix) {
            return format!("status_map.{}", status.replace('.', "_"));
        }
    }
    match normalized.as_str() {
        "list_id" | "list.id" | "linked.list.list.id" | "linked_list_list_id" => {
            "linked_list.list_id".to_string()
        }
        "list_name" | "list.name" => "linked_list.list_name".to_string(),
        "space_id" | "space.id" => "linked_list.space_id".to_string(),
        "space_name" | "space.name" => "linked_list.space_name".to_string(),
        "remote.tag" => "remote_tag".to_string(),
        "last.sync" => "last_sync".to_string(),
        "default_remote_priority" | "priority_default_remote" | "priority.default.remote" => {
            "priority.default_remote".to_string()
        }
        _ => normalized,
    }
}

fn env_key_variants(raw: &str) -> Vec<String> {
    let raw_lower = raw.to_lowercase();
    vec![
        raw_lower.clone(),
        raw_lower.replace('_', "."),
        raw_lower.replace('_', "-"),
    ]
}

fn flatten_yaml(value: &serde_yaml::Value, prefix: &str, out: &mut HashMap<String, String>) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (key, value) in map {
                let Some(key_str) = yaml_scalar_to_string(key) else {
                    continue;
                };
                let next_prefix = if prefix.is_empty() {
                    key_str
                } else {
                    format!("{prefix}.{key_str}")
                };
                flatten_yaml(value, &next_prefix, out);
            }
        }
        serde_yaml::Value::Sequence(values) => {
            let joined = values
                .iter()
                .filter_map(yaml_scalar_to_string)
                .collect::<Vec<_>>()
                .join(",");
            out.insert(prefix.to_string(), joined);
        }
        _ => {
            if let Some(value) = yaml_scalar_to_string(value) {
                out.insert(prefix.to_string(), value);
            }
        }
    }
}

fn yaml_scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Bool(v) => Some(v.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Null
        | serde_yaml::Value::Sequence(_)
        | serde_yaml::Value::Mapping(_) => None,
        serde_yaml::Value::Tagged(tagged) => yaml_scalar_to_string(&tagged.value),
    }
}
