//! Default locations for configuration and state.

use std::path::PathBuf;

pub const CONFIG_FILE_NAME: &str = "relocate.toml";

pub fn default_config_dir() -> anyhow::Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join("relocate"))
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(default_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Directory for migration journals when `migration.state_dir` is unset.
pub fn default_state_dir() -> anyhow::Result<PathBuf> {
    Ok(dirs::data_local_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine local data directory"))?
        .join("relocate"))
}
