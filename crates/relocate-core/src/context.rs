//! Application context for dependency injection.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use crate::config::{ConfigFile, ContainerProbe, RelocateConfig, discover_database};
use crate::identifier::RandomIdentifiers;
use crate::migrate::{JournalStore, Migrator};
use crate::platform::{HttpPlatform, PlatformApi};
use crate::remote::{KeyRing, SshShell};
use crate::store::PgConnector;
use crate::transfer::{ProcessRunner, TransferSettings};

/// Owns the real collaborators built from a validated configuration.
///
/// Frontends create this once and borrow a [`Migrator`] from it per command.
pub struct AppContext {
    config: RelocateConfig,
    connector: PgConnector,
    shell: SshShell,
    runner: ProcessRunner,
    platform: Option<HttpPlatform>,
    ids: RandomIdentifiers,
    transfer: TransferSettings,
    state_dir: PathBuf,
}

impl AppContext {
    /// Load configuration from `config_path` (or the default location), fill
    /// unset database credentials through `probe`, and build the context.
    pub fn load(config_path: Option<&Path>, probe: &dyn ContainerProbe) -> anyhow::Result<Self> {
        let file = ConfigFile::resolve(config_path)?;
        let mut config = file.load()?;
        discover_database(&mut config.database, probe);
        Self::new(config)
    }

    pub fn new(config: RelocateConfig) -> anyhow::Result<Self> {
        let keys = KeyRing::new(&config.ssh.keys_dir);
        let shell = SshShell::new(keys, Duration::from_secs(config.ssh.connect_timeout_secs))
            .context("Failed to prepare ssh control directory")?;

        let platform = match (&config.api.url, &config.api.token) {
            (Some(url), Some(token)) if config.api.is_configured() => {
                Some(HttpPlatform::new(url, token)?)
            }
            _ => {
                tracing::debug!("Platform API not configured");
                None
            }
        };

        let ids = RandomIdentifiers::new(&config.identifiers)
            .context("Invalid identifier settings")?;
        let state_dir = config.migration.state_dir()?;
        Ok(Self {
            connector: PgConnector::new(config.database.clone()),
            shell,
            runner: ProcessRunner,
            platform,
            ids,
            transfer: config.transfer.settings(),
            state_dir,
            config,
        })
    }

    pub fn config(&self) -> &RelocateConfig {
        &self.config
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn platform(&self) -> Option<&dyn PlatformApi> {
        self.platform.as_ref().map(|p| p as &dyn PlatformApi)
    }

    /// The platform API, or an error naming the settings to fill in.
    pub fn require_platform(&self) -> anyhow::Result<&dyn PlatformApi> {
        self.platform().ok_or_else(|| {
            anyhow::anyhow!("Platform API is not configured: set [api] url and token")
        })
    }

    pub fn migrator(&self) -> Migrator<'_> {
        Migrator {
            store: &self.connector,
            shell: &self.shell,
            runner: &self.runner,
            platform: self.platform(),
            ids: &self.ids,
            keys: self.shell.keys(),
            transfer: &self.transfer,
            retire_suffix: self.config.migration.retire_suffix.clone(),
            allow_unmapped_volume_names: self.config.migration.allow_unmapped_volume_names,
            journal: Some(JournalStore::new(&self.state_dir)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn builds_without_platform_api() {
        let temp = TempDir::new().unwrap();
        let mut config = RelocateConfig::default();
        config.migration.state_dir = Some(temp.path().to_path_buf());

        let context = AppContext::new(config).unwrap();
        assert!(context.platform().is_none());
        assert!(context.require_platform().is_err());

        let migrator = context.migrator();
        assert_eq!(migrator.retire_suffix, "-old");
        assert!(migrator.platform.is_none());
        let journal = migrator.journal.as_ref().unwrap();
        assert_eq!(journal.dir(), temp.path().join("journal"));
    }

    #[test]
    fn configured_api_builds_a_client() {
        let temp = TempDir::new().unwrap();
        let mut config = RelocateConfig::default();
        config.migration.state_dir = Some(temp.path().to_path_buf());
        config.api.url = Some("http://localhost:8000/api/v1".into());
        config.api.token = Some("token".into());

        let context = AppContext::new(config).unwrap();
        assert!(context.platform().is_some());
    }
}
