//! Store credential discovery from the local container runtime.
//!
//! Runs before the engine is built and only fills fields left unset.

use std::process::{Command, Stdio};

use super::schema::DatabaseConfig;

const PASSWORD_VAR: &str = "POSTGRES_PASSWORD";

/// Read-only view of a local container.
pub trait ContainerProbe {
    /// First network address of `container`.
    fn address(&self, container: &str) -> Option<String>;

    /// Value of an environment variable inside `container`.
    fn env_var(&self, container: &str, key: &str) -> Option<String>;
}

/// Probe backed by the `docker` command line.
#[derive(Debug, Default, Clone, Copy)]
pub struct DockerCli;

impl DockerCli {
    fn output(args: &[&str]) -> Option<String> {
        let output = Command::new("docker")
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl ContainerProbe for DockerCli {
    fn address(&self, container: &str) -> Option<String> {
        let out = Self::output(&[
            "inspect",
            container,
            "--format",
            "{{range .NetworkSettings.Networks}}{{.IPAddress}} {{end}}",
        ])?;
        out.split_whitespace().next().map(str::to_string)
    }

    fn env_var(&self, container: &str, key: &str) -> Option<String> {
        let out = Self::output(&["exec", container, "env"])?;
        let prefix = format!("{key}=");
        out.lines()
            .find_map(|line| line.strip_prefix(&prefix))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// Fill an unset host or password from the store container.
///
/// Returns true if anything was filled in.
pub fn discover_database(config: &mut DatabaseConfig, probe: &dyn ContainerProbe) -> bool {
    let mut changed = false;
    if config.host.is_none() {
        match probe.address(&config.container) {
            Some(address) => {
                tracing::debug!(container = %config.container, "Discovered database address {}", address);
                config.host = Some(address);
                changed = true;
            }
            None => tracing::debug!(
                container = %config.container,
                "Could not discover database address, using localhost"
            ),
        }
    }
    if config.password.is_none() {
        match probe.env_var(&config.container, PASSWORD_VAR) {
            Some(password) => {
                tracing::debug!(container = %config.container, "Discovered database password");
                config.password = Some(password);
                changed = true;
            }
            None => tracing::warn!(
                container = %config.container,
                "No database password configured and none could be discovered"
            ),
        }
    }
    changed
}
