//! Moving volume bytes between hosts.
//!
//! The default relay pulls the source volume into a local staging directory
//! and pushes it from there, so only the operator's machine needs credentials
//! for both hosts. Direct mode runs the copy on the source host and pushes
//! straight to the target, which requires the source to trust the target.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, Result};
use crate::remote::{KeyRing, Sessions, sh_quote, validate_volume_name, volume_data_path};
use crate::types::HostDescriptor;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    #[default]
    Relay,
    Direct,
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferMode::Relay => f.write_str("relay"),
            TransferMode::Direct => f.write_str("direct"),
        }
    }
}

/// A local process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

pub trait CommandRunner {
    fn run(&self, command: &CommandSpec) -> anyhow::Result<()>;
}

/// Spawns the program with inherited output so transfer progress is visible.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, command: &CommandSpec) -> anyhow::Result<()> {
        tracing::debug!("Running: {}", command);
        let status = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .status()
            .with_context(|| format!("Failed to start {}", command.program))?;
        if !status.success() {
            anyhow::bail!("{} exited with {}", command.program, status);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct TransferSettings {
    pub mode: TransferMode,
    /// Copy program, `rsync` unless configured otherwise.
    pub tool: String,
    pub staging_dir: PathBuf,
    /// Root under which volume directories live on every host.
    pub volume_root: String,
}

#[derive(Debug, Clone, Copy)]
pub struct TransferRequest<'a> {
    pub source: &'a HostDescriptor,
    pub target: &'a HostDescriptor,
    pub source_volume: &'a str,
    pub target_volume: &'a str,
    pub dry_run: bool,
}

pub struct VolumeTransfer<'a> {
    runner: &'a dyn CommandRunner,
    keys: &'a KeyRing,
    settings: &'a TransferSettings,
}

impl<'a> VolumeTransfer<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        keys: &'a KeyRing,
        settings: &'a TransferSettings,
    ) -> Self {
        Self {
            runner,
            keys,
            settings,
        }
    }

    pub fn settings(&self) -> &TransferSettings {
        self.settings
    }

    pub fn transfer(&self, request: &TransferRequest<'_>, sessions: &mut Sessions<'_>) -> Result<()> {
        validate_volume_name(request.source_volume)?;
        validate_volume_name(request.target_volume)?;
        tracing::info!(
            volume = %request.source_volume,
            target_volume = %request.target_volume,
            mode = %self.settings.mode,
            dry_run = request.dry_run,
            "Transferring {} -> {}",
            request.source.name,
            request.target.name
        );
        match self.settings.mode {
            TransferMode::Relay => self.relay(request),
            TransferMode::Direct => self.direct(request, sessions),
        }
    }

    fn relay(&self, request: &TransferRequest<'_>) -> Result<()> {
        let volume = request.source_volume;
        let fail = |reason: String| MigrationError::transfer(volume, reason);
        let source_key = self.keys.key_for(request.source)?;
        let target_key = self.keys.key_for(request.target)?;
        let staging = self.settings.staging_dir.join(volume);

        if !request.dry_run {
            // Staging directories are never reused across attempts.
            if staging.exists() {
                std::fs::remove_dir_all(&staging)
                    .map_err(|e| fail(format!("cannot clear {}: {e}", staging.display())))?;
            }
            std::fs::create_dir_all(&staging)
                .map_err(|e| fail(format!("cannot create {}: {e}", staging.display())))?;
        }

        let pull = self.copy_command(
            &source_key,
            request.source,
            format!(
                "{}:{}/",
                request.source.ssh_target(),
                volume_data_path(&self.settings.volume_root, volume)
            ),
            format!("{}/", staging.display()),
            request.dry_run,
        );
        self.runner
            .run(&pull)
            .map_err(|e| fail(format!("pull from {} failed: {e:#}", request.source.name)))?;

        // A simulated pull leaves nothing staged; push from an empty stand-in.
        let placeholder = if request.dry_run {
            Some(tempfile::tempdir().map_err(|e| fail(format!("cannot create temp dir: {e}")))?)
        } else {
            None
        };
        let push_source = placeholder
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
            .unwrap_or_else(|| staging.clone());

        let push = self.copy_command(
            &target_key,
            request.target,
            format!("{}/", push_source.display()),
            format!(
                "{}:{}/",
                request.target.ssh_target(),
                volume_data_path(&self.settings.volume_root, request.target_volume)
            ),
            request.dry_run,
        );
        self.runner
            .run(&push)
            .map_err(|e| fail(format!("push to {} failed: {e:#}", request.target.name)))?;

        if !request.dry_run {
            if let Err(e) = std::fs::remove_dir_all(&staging) {
                tracing::warn!("Failed to remove staging directory {}: {}", staging.display(), e);
            }
        }
        Ok(())
    }

    fn direct(&self, request: &TransferRequest<'_>, sessions: &mut Sessions<'_>) -> Result<()> {
        let session = sessions.get(request.source)?;
        let ssh = format!(
            "ssh -p {} -o StrictHostKeyChecking=no -o BatchMode=yes",
            request.target.port
        );
        let mut command = format!("{} -az", self.settings.tool);
        if request.dry_run {
            command.push_str(" --dry-run");
        }
        command.push_str(&format!(
            " -e {} {} {}:{}",
            sh_quote(&ssh),
            sh_quote(&format!(
                "{}/",
                volume_data_path(&self.settings.volume_root, request.source_volume)
            )),
            request.target.ssh_target(),
            sh_quote(&format!(
                "{}/",
                volume_data_path(&self.settings.volume_root, request.target_volume)
            )),
        ));

        let output = session.exec(&command)?;
        if !output.success() {
            return Err(MigrationError::transfer(
                request.source_volume,
                format!(
                    "direct copy from {} to {} failed (exit {}): {}",
                    request.source.name,
                    request.target.name,
                    output.exit_code,
                    output.stderr.trim()
                ),
            ));
        }
        Ok(())
    }

    fn copy_command(
        &self,
        key: &Path,
        host: &HostDescriptor,
        from: String,
        to: String,
        dry_run: bool,
    ) -> CommandSpec {
        let mut command = CommandSpec::new(&self.settings.tool)
            .arg("-avz")
            .arg("--progress");
        if dry_run {
            command = command.arg("--dry-run");
        }
        command
            .arg("-e")
            .arg(format!(
                "ssh -i {} -p {} -o StrictHostKeyChecking=no -o BatchMode=yes",
                sh_quote(&key.display().to_string()),
                host.port
            ))
            .arg(from)
            .arg(to)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::remote::{RemoteSession, RemoteShell};
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<CommandSpec>>,
        fail_on: Option<usize>,
    }

    impl CommandRunner for Recorder {
        fn run(&self, command: &CommandSpec) -> anyhow::Result<()> {
            let mut calls = self.calls.borrow_mut();
            calls.push(command.clone());
            if self.fail_on == Some(calls.len()) {
                anyhow::bail!("rsync exited with 23");
            }
            Ok(())
        }
    }

    struct NoShell;

    impl RemoteShell for NoShell {
        fn connect(&self, host: &HostDescriptor) -> Result<Box<dyn RemoteSession>> {
            Err(MigrationError::Connectivity(host.name.clone()))
        }
    }

    fn host(id: i64, name: &str) -> HostDescriptor {
        HostDescriptor {
            id,
            uuid: format!("{name}-uuid"),
            name: name.into(),
            ip: format!("10.0.0.{id}"),
            port: 22,
            user: "root".into(),
            private_key_uuid: Some(format!("{name}-key")),
        }
    }

    fn setup() -> (TempDir, KeyRing, TransferSettings) {
        let temp = TempDir::new().unwrap();
        let keys_dir = temp.path().join("keys");
        std::fs::create_dir_all(&keys_dir).unwrap();
        std::fs::write(keys_dir.join("ssh_key@alpha-key"), "k").unwrap();
        std::fs::write(keys_dir.join("ssh_key@beta-key"), "k").unwrap();
        let settings = TransferSettings {
            mode: TransferMode::Relay,
            tool: "rsync".into(),
            staging_dir: temp.path().join("staging"),
            volume_root: "/var/lib/docker/volumes".into(),
        };
        (temp, KeyRing::new(keys_dir), settings)
    }

    #[test]
    fn relay_pulls_then_pushes_and_cleans_staging() {
        let (_temp, keys, settings) = setup();
        let runner = Recorder::default();
        let (a, b) = (host(1, "alpha"), host(2, "beta"));
        let mut sessions = Sessions::new(&NoShell);

        VolumeTransfer::new(&runner, &keys, &settings)
            .transfer(
                &TransferRequest {
                    source: &a,
                    target: &b,
                    source_volume: "old_data",
                    target_volume: "new_data",
                    dry_run: false,
                },
                &mut sessions,
            )
            .unwrap();

        let calls = runner.calls.borrow();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].args.contains(&"root@10.0.0.1:/var/lib/docker/volumes/old_data/_data/".to_string()));
        assert!(calls[1].args.contains(&"root@10.0.0.2:/var/lib/docker/volumes/new_data/_data/".to_string()));
        assert!(!calls[0].has_arg("--dry-run"));
        assert!(!settings.staging_dir.join("old_data").exists());
    }

    #[test]
    fn dry_run_simulates_both_hops_without_staging() {
        let (_temp, keys, settings) = setup();
        let runner = Recorder::default();
        let (a, b) = (host(1, "alpha"), host(2, "beta"));
        let mut sessions = Sessions::new(&NoShell);

        VolumeTransfer::new(&runner, &keys, &settings)
            .transfer(
                &TransferRequest {
                    source: &a,
                    target: &b,
                    source_volume: "old_data",
                    target_volume: "new_data",
                    dry_run: true,
                },
                &mut sessions,
            )
            .unwrap();

        let calls = runner.calls.borrow();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c.has_arg("--dry-run")));
        assert!(!settings.staging_dir.join("old_data").exists());
    }

    #[test]
    fn failed_pull_aborts_before_push() {
        let (_temp, keys, settings) = setup();
        let runner = Recorder {
            fail_on: Some(1),
            ..Recorder::default()
        };
        let (a, b) = (host(1, "alpha"), host(2, "beta"));
        let mut sessions = Sessions::new(&NoShell);

        let err = VolumeTransfer::new(&runner, &keys, &settings)
            .transfer(
                &TransferRequest {
                    source: &a,
                    target: &b,
                    source_volume: "old_data",
                    target_volume: "new_data",
                    dry_run: false,
                },
                &mut sessions,
            )
            .unwrap_err();

        assert!(matches!(err, MigrationError::TransferFailure { .. }));
        assert_eq!(runner.calls.borrow().len(), 1);
    }
}
