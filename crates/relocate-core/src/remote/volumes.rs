//! Volume queries run on a remote host.

use super::{ExecOutput, RemoteSession};
use crate::error::{MigrationError, Result};

/// Single-quote `s` for a POSIX shell.
pub fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Volume and tool names are interpolated into remote commands, so only a
/// conservative character set is accepted.
pub fn validate_volume_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with(['.', '-'])
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(MigrationError::InvalidVolumeName(name.to_string()))
    }
}

/// Directory holding a volume's bytes under `root`.
pub fn volume_data_path(root: &str, name: &str) -> String {
    format!("{}/{}/_data", root.trim_end_matches('/'), name)
}

pub struct VolumeProbe<'a> {
    session: &'a dyn RemoteSession,
    root: &'a str,
}

impl<'a> VolumeProbe<'a> {
    pub fn new(session: &'a dyn RemoteSession, root: &'a str) -> Self {
        Self { session, root }
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        validate_volume_name(name)?;
        let path = volume_data_path(self.root, name);
        let output = self.session.exec(&format!("test -d {}", sh_quote(&path)))?;
        Ok(output.success())
    }

    /// `du -sh` style size, e.g. `1.5G`.
    pub fn size_human(&self, name: &str) -> Result<String> {
        validate_volume_name(name)?;
        let path = volume_data_path(self.root, name);
        let output = self.checked(&format!("du -sh {} | cut -f1", sh_quote(&path)))?;
        Ok(output.stdout.trim().to_string())
    }

    pub fn size_bytes(&self, name: &str) -> Result<u64> {
        validate_volume_name(name)?;
        let path = volume_data_path(self.root, name);
        let output = self.checked(&format!("du -sb {} | cut -f1", sh_quote(&path)))?;
        parse_bytes(&output.stdout, self.host_name())
    }

    /// Free bytes on the filesystem holding the volume root.
    pub fn available_bytes(&self) -> Result<u64> {
        let output = self.checked(&format!(
            "df -B1 --output=avail {} | tail -n 1",
            sh_quote(self.root)
        ))?;
        parse_bytes(&output.stdout, self.host_name())
    }

    pub fn create(&self, name: &str) -> Result<()> {
        validate_volume_name(name)?;
        self.checked(&format!("docker volume create {}", sh_quote(name)))?;
        tracing::info!(host = %self.host_name(), volume = %name, "Created volume");
        Ok(())
    }

    pub fn has_tool(&self, tool: &str) -> Result<bool> {
        validate_volume_name(tool)?;
        let output = self.session.exec(&format!("command -v {tool}"))?;
        Ok(output.success() && !output.stdout.trim().is_empty())
    }

    fn host_name(&self) -> &str {
        &self.session.host().name
    }

    fn checked(&self, command: &str) -> Result<ExecOutput> {
        let output = self.session.exec(command)?;
        if !output.success() {
            return Err(MigrationError::Connectivity(format!(
                "'{}' failed on {} (exit {}): {}",
                command,
                self.host_name(),
                output.exit_code,
                output.stderr.trim()
            )));
        }
        Ok(output)
    }
}

fn parse_bytes(stdout: &str, host: &str) -> Result<u64> {
    let value = stdout.trim();
    value.parse::<u64>().map_err(|_| {
        MigrationError::Connectivity(format!("unexpected size output from {host}: '{value}'"))
    })
}
