//! Configuration loading and management

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Overrides the data directory
const DATA_DIR_ENV: &str = "KEYLAUNCH_DATA_DIR";
/// Overrides the bindings file location
const BINDINGS_ENV: &str = "KEYLAUNCH_BINDINGS";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// File holding the key bindings
    pub bindings_path: PathBuf,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let data_dir = match std::env::var_os(DATA_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir()?,
        };

        let mut config = Self::in_dir(&data_dir);
        if let Some(path) = std::env::var_os(BINDINGS_ENV) {
            config.bindings_path = PathBuf::from(path);
        }
        Ok(config)
    }

    /// Configuration with every path under `data_dir`
    pub fn in_dir(data_dir: &Path) -> Self {
        Self {
            socket_path: data_dir.join("daemon.sock"),
            bindings_path: data_dir.join("keybindings.json"),
            data_dir: data_dir.to_owned(),
        }
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}

fn default_data_dir() -> Result<PathBuf> {
    if let Some(dir) = dirs::data_dir() {
        return Ok(dir.join("keylaunch"));
    }
    let home = std::env::var("HOME").context("no data directory and HOME is not set")?;
    Ok(PathBuf::from(home).join(".local").join("share").join("keylaunch"))
}
