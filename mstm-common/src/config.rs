//! Configuration file discovery and loading
//!
//! Every MSTM service reads a small TOML bootstrap file. The file is located
//! using the following priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Per-user config directory (`~/.config/mstm/<file_name>` on Linux)
//! 4. System-wide directory (`/etc/mstm/<file_name>`, Unix only)
//!
//! A missing file is not an error: services fall back to compiled defaults.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directory name used under the platform config directories
pub const CONFIG_DIR_NAME: &str = "mstm";

/// Locate a service configuration file
///
/// Returns `None` when neither an explicit path was given nor any of the
/// standard locations contains `file_name`.
///
/// An explicit path (CLI or environment) is returned even if it does not
/// exist, so that the caller reports the error instead of silently using
/// defaults.
pub fn resolve_config_file(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    file_name: &str,
) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3/4: Standard locations
    standard_locations(file_name)
        .into_iter()
        .find(|candidate| candidate.exists())
}

/// Standard configuration locations for the current platform, in search order
pub fn standard_locations(file_name: &str) -> Vec<PathBuf> {
    let mut locations = Vec::new();

    if let Some(dir) = dirs::config_dir() {
        locations.push(dir.join(CONFIG_DIR_NAME).join(file_name));
    }

    if cfg!(unix) {
        locations.push(PathBuf::from("/etc").join(CONFIG_DIR_NAME).join(file_name));
    }

    locations
}

/// Parse a TOML file into `T`
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(Error::NotFound(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let parsed = toml::from_str::<T>(&content)?;
    debug!("Loaded configuration from {}", path.display());
    Ok(parsed)
}

/// Load a TOML file if one was located, otherwise return `T::default()`
///
/// Graceful degradation: a located file that fails to parse is still an
/// error, but the absence of any file only produces a warning.
pub fn load_toml_or_default<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    match path {
        Some(path) => load_toml(path),
        None => {
            warn!("No configuration file found, using built-in defaults");
            Ok(T::default())
        }
    }
}
