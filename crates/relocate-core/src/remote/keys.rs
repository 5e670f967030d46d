use std::path::{Path, PathBuf};

use crate::error::{MigrationError, Result};
use crate::types::HostDescriptor;

/// Directory of management keys named `ssh_key@<key-uuid>`.
#[derive(Debug, Clone)]
pub struct KeyRing {
    dir: PathBuf,
}

impl KeyRing {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key_uuid: &str) -> PathBuf {
        self.dir.join(format!("ssh_key@{key_uuid}"))
    }

    /// Key file for `host`, which must exist.
    pub fn key_for(&self, host: &HostDescriptor) -> Result<PathBuf> {
        let key_uuid = host.private_key_uuid.as_deref().ok_or_else(|| {
            MigrationError::Connectivity(format!("host '{}' has no management key", host.name))
        })?;
        let path = self.path_for(key_uuid);
        if !path.is_file() {
            return Err(MigrationError::Connectivity(format!(
                "ssh key for host '{}' not found at {}",
                host.name,
                path.display()
            )));
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn host(key: Option<&str>) -> HostDescriptor {
        HostDescriptor {
            id: 1,
            uuid: "h1".into(),
            name: "alpha".into(),
            ip: "10.0.0.1".into(),
            port: 22,
            user: "root".into(),
            private_key_uuid: key.map(str::to_string),
        }
    }

    #[test]
    fn finds_existing_key() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("ssh_key@k1"), "key").unwrap();
        let ring = KeyRing::new(temp.path());
        assert_eq!(
            ring.key_for(&host(Some("k1"))).unwrap(),
            temp.path().join("ssh_key@k1")
        );
    }

    #[test]
    fn missing_key_is_connectivity_error() {
        let temp = TempDir::new().unwrap();
        let ring = KeyRing::new(temp.path());
        assert!(matches!(
            ring.key_for(&host(Some("k2"))),
            Err(MigrationError::Connectivity(_))
        ));
        assert!(matches!(
            ring.key_for(&host(None)),
            Err(MigrationError::Connectivity(_))
        ));
    }
}
