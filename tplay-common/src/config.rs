//! Configuration file discovery and loading
//!
//! Config file resolution priority:
//! 1. Explicit path (command-line argument)
//! 2. Environment variable
//! 3. `<user config dir>/tplay/config.toml`, then `/etc/tplay/config.toml` on Linux
//!
//! A missing file at priority 3 is not an error: callers fall back to
//! built-in defaults. A missing file that was named explicitly is.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Application directory name under the OS config dir
pub const APP_DIR: &str = "tplay";

/// Config file name inside [`APP_DIR`]
pub const CONFIG_FILE: &str = "config.toml";

/// Where a config file path came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Named on the command line or via environment; must exist
    Explicit(PathBuf),
    /// Found in a default location
    Discovered(PathBuf),
}

impl ConfigSource {
    pub fn path(&self) -> &Path {
        match self {
            ConfigSource::Explicit(p) | ConfigSource::Discovered(p) => p,
        }
    }
}

/// Resolve which config file to read, if any.
pub fn resolve_config_file(cli_arg: Option<&Path>, env_var_name: &str) -> Option<ConfigSource> {
    if let Some(path) = cli_arg {
        return Some(ConfigSource::Explicit(path.to_path_buf()));
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(ConfigSource::Explicit(PathBuf::from(path)));
        }
    }

    default_config_locations()
        .into_iter()
        .find(|p| p.exists())
        .map(ConfigSource::Discovered)
}

/// Candidate default config locations for this platform, in search order
fn default_config_locations() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join(APP_DIR).join(CONFIG_FILE));
    }
    if cfg!(target_os = "linux") {
        candidates.push(PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILE));
    }
    candidates
}

/// Parse a TOML config file into `T`.
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    debug!("Loaded config file {}", path.display());
    Ok(toml::from_str(&content)?)
}

/// Load `T` from the resolved config file, or `T::default()` when none exists.
pub fn load_or_default<T>(source: Option<&ConfigSource>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match source {
        Some(source) => load_toml(source.path()),
        None => Ok(T::default()),
    }
}
