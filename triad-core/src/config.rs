//! Per-subscriber YAML configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.triad/
//!   subscribers/
//!     <name>.yaml     (one file per subscriber, mode 0600)
//!   tokens/
//!     <name>.json     (token store, owned by triad-sync)
//! ```
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings for one subscriber: which trees it watches and how it compares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberConfig {
    pub name: String,
    /// Workspace directory whose subdirectories are the supervised projects.
    pub local_root: PathBuf,
    /// Directory mirroring the upstream state.
    pub remote_root: PathBuf,
    /// Optional tag or branch the remote is read at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default)]
    pub ignore_whitespace: bool,
    /// Exact names or `*.ext` suffix patterns excluded from sync.
    #[serde(default)]
    pub ignore: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriberConfig {
    pub fn new(name: impl Into<String>, local_root: PathBuf, remote_root: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            local_root,
            remote_root,
            selector: None,
            ignore_whitespace: false,
            ignore: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// `<home>/.triad`
pub fn triad_root(home: &Path) -> PathBuf {
    home.join(".triad")
}

/// `<home>/.triad/subscribers/<name>.yaml`; pure, no I/O.
pub fn config_path_at(home: &Path, name: &str) -> PathBuf {
    triad_root(home)
        .join("subscribers")
        .join(format!("{name}.yaml"))
}

// ---------------------------------------------------------------------------
// Load / list
// ---------------------------------------------------------------------------

/// Load the configuration for subscriber `name`.
///
/// Returns `ConfigError::ConfigNotFound` if absent,
/// `ConfigError::Parse` (with path) if malformed YAML.
pub fn load_at(home: &Path, name: &str) -> Result<SubscriberConfig, ConfigError> {
    validate_name(name)?;
    let path = config_path_at(home, name);
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound { path });
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load(name: &str) -> Result<SubscriberConfig, ConfigError> {
    load_at(&home()?, name)
}

/// All configured subscribers, sorted by name.
pub fn list_at(home: &Path) -> Result<Vec<SubscriberConfig>, ConfigError> {
    let dir = triad_root(home).join("subscribers");
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut entries: Vec<_> = std::fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".yaml"))
        .collect();
    entries.sort_by_key(|e| e.file_name());

    let mut configs = Vec::with_capacity(entries.len());
    for entry in entries {
        let path = entry.path();
        let contents = std::fs::read_to_string(&path)?;
        let config = serde_yaml::from_str(&contents)
            .map_err(|e| ConfigError::Parse { path, source: e })?;
        configs.push(config);
    }
    Ok(configs)
}

/// `list_at` convenience wrapper.
pub fn list() -> Result<Vec<SubscriberConfig>, ConfigError> {
    list_at(&home()?)
}

// ---------------------------------------------------------------------------
// Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save a subscriber config.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &SubscriberConfig) -> Result<(), ConfigError> {
    validate_name(&config.name)?;
    let path = config_path_at(home, &config.name);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let tmp_path = path.with_file_name(format!("{}.yaml.tmp", config.name));

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(config: &SubscriberConfig) -> Result<(), ConfigError> {
    save_at(&home()?, config)
}

/// Resolve the home directory the convenience wrappers use.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn validate_name(name: &str) -> Result<(), ConfigError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidName(name.to_string()))
    }
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
