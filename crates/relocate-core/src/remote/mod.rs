//! Remote command execution on managed hosts.
//!
//! Sessions are opened through a [`RemoteShell`] and kept per host name in a
//! [`Sessions`] map for the duration of one migration. Dropping the map closes
//! every session it opened.

mod keys;
mod ssh;
mod volumes;

pub use keys::KeyRing;
pub use ssh::SshShell;
pub use volumes::{VolumeProbe, sh_quote, validate_volume_name, volume_data_path};

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::error::Result;
use crate::types::HostDescriptor;

/// Captured result of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// An open connection to one host.
pub trait RemoteSession {
    fn host(&self) -> &HostDescriptor;

    fn exec(&self, command: &str) -> Result<ExecOutput>;

    /// Release the connection. Must be safe to call more than once.
    fn disconnect(&self);
}

pub trait RemoteShell {
    fn connect(&self, host: &HostDescriptor) -> Result<Box<dyn RemoteSession>>;
}

/// Caller-scoped map of open sessions keyed by host name.
pub struct Sessions<'a> {
    shell: &'a dyn RemoteShell,
    open: BTreeMap<String, Rc<dyn RemoteSession>>,
}

impl<'a> Sessions<'a> {
    pub fn new(shell: &'a dyn RemoteShell) -> Self {
        Self {
            shell,
            open: BTreeMap::new(),
        }
    }

    /// The session for `host`, connecting on first use.
    pub fn get(&mut self, host: &HostDescriptor) -> Result<Rc<dyn RemoteSession>> {
        if let Some(session) = self.open.get(&host.name) {
            return Ok(Rc::clone(session));
        }
        tracing::debug!(host = %host.name, "Opening remote session to {}", host.ssh_target());
        let session: Rc<dyn RemoteSession> = Rc::from(self.shell.connect(host)?);
        self.open.insert(host.name.clone(), Rc::clone(&session));
        Ok(session)
    }

    pub fn is_open(&self, host_name: &str) -> bool {
        self.open.contains_key(host_name)
    }

    pub fn disconnect_all(&mut self) {
        for (name, session) in std::mem::take(&mut self.open) {
            tracing::debug!(host = %name, "Closing remote session");
            session.disconnect();
        }
    }
}

impl Drop for Sessions<'_> {
    fn drop(&mut self) {
        self.disconnect_all();
    }
}
