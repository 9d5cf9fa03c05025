//! Configuration file discovery and loading
//!
//! Config file resolution follows this priority order:
//! 1. Explicit path (command-line argument)
//! 2. Environment variable
//! 3. Platform config directory (`<config_dir>/chatcast/chatcast.toml`)
//!
//! A missing file is not an error for callers that want defaults: use
//! [`load_toml_or_default`].

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Application directory name under the platform config directory
pub const APP_DIR_NAME: &str = "chatcast";

/// Default config file name
pub const CONFIG_FILE_NAME: &str = "chatcast.toml";

/// Resolve the configuration file path.
///
/// The returned path may not exist; [`load_toml_or_default`] handles that case.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    default_config_path()
}

/// Platform default config file location
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
}

/// Load and deserialize a TOML file.
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    let value = toml::from_str::<T>(&content)?;
    debug!(path = %path.display(), "Loaded TOML config");
    Ok(value)
}

/// Load a TOML file, falling back to `T::default()` when the file does not exist.
///
/// Parse errors are still reported: a present but broken file is a configuration
/// mistake the operator should see.
pub fn load_toml_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        warn!(path = %path.display(), "Config file not found, using defaults");
        return Ok(T::default());
    }
    load_toml(path)
}
