//! Environment variable overrides.

use std::path::PathBuf;

use anyhow::Context;

use super::schema::RelocateConfig;

pub const API_URL: &str = "RELOCATE_API_URL";
pub const API_TOKEN: &str = "RELOCATE_API_TOKEN";
pub const DB_HOST: &str = "RELOCATE_DB_HOST";
pub const DB_PORT: &str = "RELOCATE_DB_PORT";
pub const DB_NAME: &str = "RELOCATE_DB_NAME";
pub const DB_USER: &str = "RELOCATE_DB_USER";
pub const DB_PASSWORD: &str = "RELOCATE_DB_PASSWORD";
pub const SSH_KEYS_DIR: &str = "RELOCATE_SSH_KEYS_DIR";
pub const STAGING_DIR: &str = "RELOCATE_STAGING_DIR";

/// Overlay set, non-empty variables onto `config`.
///
/// `lookup` abstracts the process environment so overrides can be applied
/// from any source.
pub fn apply_env_overrides(
    config: &mut RelocateConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(url) = get(API_URL) {
        config.api.url = Some(url);
    }
    if let Some(token) = get(API_TOKEN) {
        config.api.token = Some(token);
    }
    if let Some(host) = get(DB_HOST) {
        config.database.host = Some(host);
    }
    if let Some(port) = get(DB_PORT) {
        config.database.port = port
            .trim()
            .parse()
            .with_context(|| format!("{DB_PORT} is not a valid port: {port}"))?;
    }
    if let Some(name) = get(DB_NAME) {
        config.database.name = name;
    }
    if let Some(user) = get(DB_USER) {
        config.database.user = user;
    }
    if let Some(password) = get(DB_PASSWORD) {
        config.database.password = Some(password);
    }
    if let Some(dir) = get(SSH_KEYS_DIR) {
        config.ssh.keys_dir = PathBuf::from(dir);
    }
    if let Some(dir) = get(STAGING_DIR) {
        config.transfer.staging_dir = PathBuf::from(dir);
    }
    Ok(())
}
