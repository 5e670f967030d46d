//! Configuration schema for relocate.toml

use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::identifier::IdentifierSpec;
use crate::transfer::{TransferMode, TransferSettings};

/// Root configuration structure for relocate.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelocateConfig {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub ssh: SshConfig,

    #[serde(default)]
    pub transfer: TransferConfig,

    #[serde(default)]
    pub identifiers: IdentifierSpec,

    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Platform control API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL including the version prefix, e.g. `http://localhost:8000/api/v1`
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub token: Option<String>,
}

impl ApiConfig {
    /// Both URL and token are set.
    pub fn is_configured(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.is_empty())
            && self.token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Direct connection to the platform's configuration database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Unset means discover from the database container, else localhost.
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default = "default_db_port")]
    pub port: u16,

    #[serde(default = "default_db_name")]
    pub name: String,

    #[serde(default = "default_db_user")]
    pub user: String,

    #[serde(default)]
    pub password: Option<String>,

    /// Container queried when host or password is unset.
    #[serde(default = "default_db_container")]
    pub container: String,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "coolify".to_string()
}

fn default_db_user() -> String {
    "coolify".to_string()
}

fn default_db_container() -> String {
    "coolify-db".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_db_port(),
            name: default_db_name(),
            user: default_db_user(),
            password: None,
            container: default_db_container(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl DatabaseConfig {
    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or("localhost")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshConfig {
    /// Directory holding `ssh_key@<uuid>` management keys
    #[serde(default = "default_keys_dir")]
    pub keys_dir: PathBuf,

    #[serde(default = "default_ssh_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_keys_dir() -> PathBuf {
    PathBuf::from("/data/coolify/ssh/keys")
}

fn default_ssh_timeout() -> u64 {
    30
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            keys_dir: default_keys_dir(),
            connect_timeout_secs: default_ssh_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    #[serde(default)]
    pub mode: TransferMode,

    #[serde(default = "default_tool")]
    pub tool: String,

    #[serde(default = "default_volume_root")]
    pub volume_root: String,
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("/tmp/relocate")
}

fn default_tool() -> String {
    "rsync".to_string()
}

fn default_volume_root() -> String {
    "/var/lib/docker/volumes".to_string()
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            mode: TransferMode::default(),
            tool: default_tool(),
            volume_root: default_volume_root(),
        }
    }
}

impl TransferConfig {
    pub fn settings(&self) -> TransferSettings {
        TransferSettings {
            mode: self.mode,
            tool: self.tool.clone(),
            staging_dir: self.staging_dir.clone(),
            volume_root: self.volume_root.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Appended to the original resource's name on retirement
    #[serde(default = "default_retire_suffix")]
    pub retire_suffix: String,

    /// Copy volume names lacking their owner's identifier unchanged
    #[serde(default)]
    pub allow_unmapped_volume_names: bool,

    /// Where resumable migration journals are kept
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

fn default_retire_suffix() -> String {
    "-old".to_string()
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            retire_suffix: default_retire_suffix(),
            allow_unmapped_volume_names: false,
            state_dir: None,
        }
    }
}

impl MigrationConfig {
    pub fn state_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => super::paths::default_state_dir(),
        }
    }
}

impl RelocateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.identifiers
            .validate()
            .context("Invalid [identifiers] configuration")?;

        if self.migration.retire_suffix.trim().is_empty() {
            anyhow::bail!("migration.retire_suffix must not be empty");
        }
        if self.ssh.connect_timeout_secs == 0 {
            anyhow::bail!("ssh.connect_timeout_secs must be greater than zero");
        }
        if self.database.connect_timeout_secs == 0 {
            anyhow::bail!("database.connect_timeout_secs must be greater than zero");
        }
        if !self.transfer.staging_dir.is_absolute() {
            anyhow::bail!(
                "transfer.staging_dir must be an absolute path: {}",
                self.transfer.staging_dir.display()
            );
        }
        if self.transfer.tool.trim().is_empty() {
            anyhow::bail!("transfer.tool must not be empty");
        }
        if !self.transfer.volume_root.starts_with('/') {
            anyhow::bail!(
                "transfer.volume_root must be an absolute path: {}",
                self.transfer.volume_root
            );
        }
        if let Some(url) = &self.api.url {
            url::Url::parse(url).with_context(|| format!("Invalid api.url: {url}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        RelocateConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_empty_suffix() {
        let mut config = RelocateConfig::default();
        config.migration.retire_suffix = " ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_relative_staging_dir() {
        let mut config = RelocateConfig::default();
        config.transfer.staging_dir = PathBuf::from("staging");
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_timeout() {
        let mut config = RelocateConfig::default();
        config.ssh.connect_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_identifier_alphabet() {
        let mut config = RelocateConfig::default();
        config.identifiers.alphabet = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_malformed_api_url() {
        let mut config = RelocateConfig::default();
        config.api.url = Some("not a url".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn database_host_defaults_to_localhost() {
        assert_eq!(DatabaseConfig::default().host(), "localhost");
    }
}
