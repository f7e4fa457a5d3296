//! Application configuration for sheetsync.
//!
//! User config lives at `~/.sheetsync/sheetsync.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SheetSyncError};
use crate::types::{PostStatus, SheetConfig};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "sheetsync.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".sheetsync";

/// Scheduled records must be at least this far in the future.
pub const SCHEDULE_BUFFER_SECS: u64 = 60;

// ---------------------------------------------------------------------------
// Config structs (matching sheetsync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Configured sheets, processed in order.
    #[serde(default)]
    pub sheets: Vec<SheetConfig>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Status for newly created records when the row specifies none.
    #[serde(default)]
    pub default_status: PostStatus,

    /// Let the sheet's status column override existing records' status.
    #[serde(default)]
    pub force_status_from_sheet: bool,

    /// Per-request timeout for sheet and image downloads.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Seconds after which an abandoned sync lock is considered stale.
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_secs: u64,

    /// Content database path.
    #[serde(default = "default_database")]
    pub database: String,

    /// Directory for downloaded featured images.
    #[serde(default = "default_media_dir")]
    pub media_dir: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            default_status: PostStatus::Draft,
            force_status_from_sheet: false,
            fetch_timeout_secs: default_fetch_timeout(),
            lock_ttl_secs: default_lock_ttl(),
            database: default_database(),
            media_dir: default_media_dir(),
        }
    }
}

fn default_fetch_timeout() -> u64 {
    25
}
fn default_lock_ttl() -> u64 {
    600
}
fn default_database() -> String {
    "~/.sheetsync/content.db".into()
}
fn default_media_dir() -> String {
    "~/.sheetsync/media".into()
}

impl AppConfig {
    /// Normalize every sheet in place. Returns `true` if anything changed
    /// (e.g. a sheet id was generated and should be persisted).
    pub fn normalize(&mut self) -> bool {
        let mut changed = false;
        for (i, sheet) in self.sheets.iter_mut().enumerate() {
            changed |= sheet.normalize(i + 1);
        }
        changed
    }

    /// Find a sheet by id or case-insensitive name.
    pub fn find_sheet(&self, key: &str) -> Option<&SheetConfig> {
        self.sheets.iter().find(|s| s.matches(key))
    }
}

// ---------------------------------------------------------------------------
// Sync settings (runtime, passed into the engine)
// ---------------------------------------------------------------------------

/// Runtime settings for a sync run, derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Status for new records whose row has no valid status. Never `Future`.
    pub default_status: PostStatus,
    /// Whether a row's status overrides an existing record's status.
    pub force_status_from_sheet: bool,
    /// Minimum lead time for scheduled records.
    pub schedule_buffer: Duration,
    /// Per-request network timeout.
    pub fetch_timeout: Duration,
    /// Lifetime of the batch sync lock.
    pub lock_ttl: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for SyncSettings {
    fn from(config: &AppConfig) -> Self {
        let default_status = match config.defaults.default_status {
            PostStatus::Future => {
                tracing::warn!("default_status cannot be `future`, using `draft`");
                PostStatus::Draft
            }
            other => other,
        };

        Self {
            default_status,
            force_status_from_sheet: config.defaults.force_status_from_sheet,
            schedule_buffer: Duration::from_secs(SCHEDULE_BUFFER_SECS),
            fetch_timeout: Duration::from_secs(config.defaults.fetch_timeout_secs.max(1)),
            lock_ttl: Duration::from_secs(config.defaults.lock_ttl_secs.max(1)),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.sheetsync/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SheetSyncError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.sheetsync/sheetsync.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
///
/// Sheets are normalized; if that generated new sheet ids the file is
/// rewritten so the ids stay stable across runs.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SheetSyncError::io(path, e))?;

    let mut config: AppConfig = toml::from_str(&content).map_err(|e| {
        SheetSyncError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    if config.normalize() {
        tracing::info!(?path, "normalized sheet settings, saving");
        save_config_to(&config, path)?;
    }

    Ok(config)
}

/// Write the config to a specific file path, creating parent directories.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| SheetSyncError::io(parent, e))?;
    }
    let content =
        toml::to_string_pretty(config).map_err(|e| SheetSyncError::config(e.to_string()))?;
    std::fs::write(path, content).map_err(|e| SheetSyncError::io(path, e))
}

/// Write the config to the default location.
pub fn save_config(config: &AppConfig) -> Result<PathBuf> {
    let path = config_file_path()?;
    save_config_to(config, &path)?;
    Ok(path)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = save_config(&AppConfig::default())?;
    tracing::info!(?path, "created default config file");
    Ok(path)
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| SheetSyncError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}
