//! Configuration loading
//!
//! Settings come from `relocate.toml` (by default under the user config
//! directory), overlaid with `RELOCATE_*` environment variables, then
//! validated. Database credential discovery is a separate, optional step the
//! caller runs before building the engine.

pub mod discovery;
pub mod env;
pub mod parser;
pub mod paths;
pub mod schema;

use std::path::{Path, PathBuf};

use anyhow::Context;

pub use discovery::{ContainerProbe, DockerCli, discover_database};
pub use env::apply_env_overrides;
pub use parser::{parse_config, parse_config_str, to_toml};
pub use paths::{default_config_path, default_state_dir};
pub use schema::{
    ApiConfig, DatabaseConfig, MigrationConfig, RelocateConfig, SshConfig, TransferConfig,
};

/// Commented template written by `init`.
pub const DEFAULT_CONFIG: &str = r#"# relocate configuration

[api]
# Platform API base URL and token (Settings -> API Tokens)
url = "http://localhost:8000/api/v1"
token = "your_token_here"

[database]
# Leave host and password unset to discover them from the database container
# host = "10.0.1.5"
port = 5432
name = "coolify"
user = "coolify"
# password = ""
container = "coolify-db"

[ssh]
keys_dir = "/data/coolify/ssh/keys"
connect_timeout_secs = 30

[transfer]
# "relay" copies through staging_dir on this machine, "direct" copies host to host
mode = "relay"
staging_dir = "/tmp/relocate"
tool = "rsync"
volume_root = "/var/lib/docker/volumes"

[migration]
retire_suffix = "-old"
allow_unmapped_volume_names = false
"#;

/// Result of [`ConfigFile::init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOutcome {
    pub path: PathBuf,
    pub created: bool,
}

/// A configuration file location.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `path` if given, else the default location.
    pub fn resolve(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Ok(Self::at(path)),
            None => Ok(Self::at(default_config_path()?)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load from the file (defaults if absent) and the process environment.
    pub fn load(&self) -> anyhow::Result<RelocateConfig> {
        self.load_with(|name| std::env::var(name).ok())
    }

    pub fn load_with(&self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<RelocateConfig> {
        let mut config = if self.path.exists() {
            tracing::debug!("Loading configuration from {}", self.path.display());
            parse_config(&self.path)?
        } else {
            tracing::debug!(
                "No configuration file at {}, using defaults",
                self.path.display()
            );
            RelocateConfig::default()
        };
        apply_env_overrides(&mut config, lookup)?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration: {}", self.path.display()))?;
        Ok(config)
    }

    /// Write [`DEFAULT_CONFIG`] unless a file already exists.
    pub fn init(&self) -> anyhow::Result<InitOutcome> {
        if self.path.exists() {
            return Ok(InitOutcome {
                path: self.path.clone(),
                created: false,
            });
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        std::fs::write(&self.path, DEFAULT_CONFIG)
            .with_context(|| format!("Failed to write config file: {}", self.path.display()))?;
        tracing::info!("Wrote default configuration to {}", self.path.display());
        Ok(InitOutcome {
            path: self.path.clone(),
            created: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_template_parses_and_validates() {
        let config = parse_config_str(DEFAULT_CONFIG).unwrap();
        config.validate().unwrap();
        assert_eq!(config.migration.retire_suffix, "-old");
    }

    #[test]
    fn init_writes_once() {
        let temp = TempDir::new().unwrap();
        let file = ConfigFile::at(temp.path().join("nested/relocate.toml"));

        let first = file.init().unwrap();
        assert!(first.created);
        std::fs::write(file.path(), "[migration]\nretire_suffix = \"-keep\"\n").unwrap();

        let second = file.init().unwrap();
        assert!(!second.created);
        let content = std::fs::read_to_string(file.path()).unwrap();
        assert!(content.contains("-keep"));
    }

    #[test]
    fn missing_file_loads_defaults_with_env() {
        let temp = TempDir::new().unwrap();
        let file = ConfigFile::at(temp.path().join("absent.toml"));
        let config = file
            .load_with(|name| (name == env::DB_NAME).then(|| "platform".to_string()))
            .unwrap();
        assert_eq!(config.database.name, "platform");
    }

    #[test]
    fn env_override_is_validated() {
        let temp = TempDir::new().unwrap();
        let file = ConfigFile::at(temp.path().join("absent.toml"));
        let result = file.load_with(|name| (name == env::STAGING_DIR).then(|| "relative".to_string()));
        assert!(result.is_err());
    }
}
