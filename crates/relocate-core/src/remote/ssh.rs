//! Sessions over the system `ssh` client.
//!
//! Connecting starts a backgrounded master connection on a private control
//! socket; commands are then multiplexed over that socket, and disconnecting
//! asks the master to exit.

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use tempfile::TempDir;

use super::keys::KeyRing;
use super::{ExecOutput, RemoteSession, RemoteShell};
use crate::error::{MigrationError, Result};
use crate::types::HostDescriptor;

pub struct SshShell {
    keys: KeyRing,
    connect_timeout: Duration,
    control_dir: TempDir,
}

impl SshShell {
    pub fn new(keys: KeyRing, connect_timeout: Duration) -> Result<Self> {
        let control_dir = tempfile::Builder::new()
            .prefix("relocate-ssh-")
            .tempdir()?;
        Ok(Self {
            keys,
            connect_timeout,
            control_dir,
        })
    }

    pub fn keys(&self) -> &KeyRing {
        &self.keys
    }
}

impl RemoteShell for SshShell {
    fn connect(&self, host: &HostDescriptor) -> Result<Box<dyn RemoteSession>> {
        let key = self.keys.key_for(host)?;
        let socket = self.control_dir.path().join(format!("{}.sock", host.id));

        let status = Command::new("ssh")
            .arg("-M")
            .arg("-S")
            .arg(&socket)
            .args(["-f", "-N"])
            .args(["-o", "ControlPersist=yes"])
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)))
            .args(["-o", "BatchMode=yes"])
            .args(["-o", "StrictHostKeyChecking=no"])
            .arg("-i")
            .arg(&key)
            .arg("-p")
            .arg(host.port.to_string())
            .arg(host.ssh_target())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| MigrationError::Connectivity(format!("failed to run ssh: {e}")))?;

        if !status.success() {
            return Err(MigrationError::Connectivity(format!(
                "ssh to {} ({}:{}) failed with {}",
                host.name, host.ip, host.port, status
            )));
        }

        tracing::debug!(host = %host.name, "SSH master connection established");
        Ok(Box::new(SshSession {
            host: host.clone(),
            socket,
            closed: Cell::new(false),
        }))
    }
}

struct SshSession {
    host: HostDescriptor,
    socket: PathBuf,
    closed: Cell<bool>,
}

impl SshSession {
    fn command(&self, socket: &Path) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-S")
            .arg(socket)
            .args(["-o", "BatchMode=yes"])
            .arg("-p")
            .arg(self.host.port.to_string());
        cmd
    }
}

impl RemoteSession for SshSession {
    fn host(&self) -> &HostDescriptor {
        &self.host
    }

    fn exec(&self, command: &str) -> Result<ExecOutput> {
        if self.closed.get() {
            return Err(MigrationError::Connectivity(format!(
                "session to {} is closed",
                self.host.name
            )));
        }
        tracing::trace!(host = %self.host.name, "exec: {}", command);
        let output = self
            .command(&self.socket)
            .arg(self.host.ssh_target())
            .arg("--")
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| MigrationError::Connectivity(format!("failed to run ssh: {e}")))?;

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    fn disconnect(&self) {
        if self.closed.replace(true) {
            return;
        }
        let result = self
            .command(&self.socket)
            .args(["-O", "exit"])
            .arg(self.host.ssh_target())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(e) = result {
            tracing::debug!(host = %self.host.name, "Failed to stop ssh master: {}", e);
        }
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}
