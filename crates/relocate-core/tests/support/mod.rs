//! Fake collaborators shared by the integration tests.
//!
//! `FakeShell` simulates hosts that answer the volume probe commands from an
//! in-memory table of volume sizes, `RecordingRunner` records every local
//! copy command, and `Fixture` seeds a `MemoryStore` with two hosts and
//! wires everything into a `Migrator`.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use tempfile::TempDir;

use relocate_core::error::{MigrationError, Result};
use relocate_core::identifier::IdentifierSource;
use relocate_core::migrate::{JournalStore, Migrator};
use relocate_core::platform::{PlatformApi, PlatformHost, PlatformResource};
use relocate_core::remote::{ExecOutput, KeyRing, RemoteSession, RemoteShell};
use relocate_core::store::MemoryStore;
use relocate_core::transfer::{CommandRunner, CommandSpec, TransferMode, TransferSettings};
use relocate_core::types::{HostDescriptor, OwnerRef, ResourceKind};

pub const VOLUME_ROOT: &str = "/var/lib/docker/volumes";
pub const GIB: u64 = 1024 * 1024 * 1024;

// =============================================================================
// Remote hosts
// =============================================================================

#[derive(Debug, Clone)]
pub struct FakeHost {
    /// Volume name to size in bytes.
    pub volumes: BTreeMap<String, u64>,
    pub available: u64,
    pub tools: Vec<String>,
    pub reachable: bool,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self {
            volumes: BTreeMap::new(),
            available: 100 * GIB,
            tools: vec!["rsync".to_string()],
            reachable: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct ShellState {
    pub hosts: BTreeMap<String, FakeHost>,
    /// `(host, command)` for every command executed.
    pub log: Vec<(String, String)>,
    pub connects: usize,
    pub disconnects: usize,
}

#[derive(Clone, Default)]
pub struct FakeShell {
    pub state: Rc<RefCell<ShellState>>,
}

impl FakeShell {
    pub fn host(&self, name: &str, host: FakeHost) {
        self.state.borrow_mut().hosts.insert(name.to_string(), host);
    }

    pub fn with_host<R>(&self, name: &str, f: impl FnOnce(&mut FakeHost) -> R) -> R {
        let mut state = self.state.borrow_mut();
        let host = state.hosts.entry(name.to_string()).or_default();
        f(host)
    }

    pub fn has_volume(&self, host: &str, volume: &str) -> bool {
        self.state
            .borrow()
            .hosts
            .get(host)
            .is_some_and(|h| h.volumes.contains_key(volume))
    }

    pub fn commands(&self) -> Vec<(String, String)> {
        self.state.borrow().log.clone()
    }

    pub fn commands_containing(&self, needle: &str) -> Vec<(String, String)> {
        self.commands()
            .into_iter()
            .filter(|(_, command)| command.contains(needle))
            .collect()
    }

    pub fn open_sessions(&self) -> usize {
        let state = self.state.borrow();
        state.connects - state.disconnects
    }
}

impl RemoteShell for FakeShell {
    fn connect(&self, host: &HostDescriptor) -> Result<Box<dyn RemoteSession>> {
        let reachable = self
            .state
            .borrow()
            .hosts
            .get(&host.name)
            .is_some_and(|h| h.reachable);
        if !reachable {
            return Err(MigrationError::Connectivity(format!(
                "ssh to {} timed out",
                host.name
            )));
        }
        self.state.borrow_mut().connects += 1;
        Ok(Box::new(FakeSession {
            host: host.clone(),
            state: Rc::clone(&self.state),
        }))
    }
}

pub struct FakeSession {
    host: HostDescriptor,
    state: Rc<RefCell<ShellState>>,
}

fn ok(stdout: impl Into<String>) -> ExecOutput {
    ExecOutput {
        stdout: stdout.into(),
        stderr: String::new(),
        exit_code: 0,
    }
}

fn failed(stderr: &str) -> ExecOutput {
    ExecOutput {
        stdout: String::new(),
        stderr: stderr.to_string(),
        exit_code: 1,
    }
}

/// Volume name inside a quoted `<root>/<name>/_data` path.
fn volume_in(command: &str) -> Option<String> {
    let start = command.find(VOLUME_ROOT)? + VOLUME_ROOT.len() + 1;
    let rest = &command[start..];
    let end = rest.find("/_data")?;
    Some(rest[..end].to_string())
}

/// Text between the first pair of single quotes.
fn quoted(command: &str) -> Option<String> {
    let start = command.find('\'')? + 1;
    let end = command[start..].find('\'')? + start;
    Some(command[start..end].to_string())
}

impl RemoteSession for FakeSession {
    fn host(&self) -> &HostDescriptor {
        &self.host
    }

    fn exec(&self, command: &str) -> Result<ExecOutput> {
        let mut state = self.state.borrow_mut();
        state.log.push((self.host.name.clone(), command.to_string()));
        let host = state.hosts.entry(self.host.name.clone()).or_default();

        let output = if command.starts_with("test -d ") {
            match volume_in(command) {
                Some(volume) if host.volumes.contains_key(&volume) => ok(""),
                _ => failed(""),
            }
        } else if command.starts_with("du -sh ") {
            match volume_in(command).and_then(|v| host.volumes.get(&v).copied()) {
                Some(bytes) => ok(format!("{:.1}G\n", bytes as f64 / GIB as f64)),
                None => failed("du: cannot access: No such file or directory"),
            }
        } else if command.starts_with("du -sb ") {
            match volume_in(command).and_then(|v| host.volumes.get(&v).copied()) {
                Some(bytes) => ok(format!("{bytes}\n")),
                None => failed("du: cannot access: No such file or directory"),
            }
        } else if command.starts_with("df -B1") {
            ok(format!("{}\n", host.available))
        } else if command.starts_with("docker volume create ") {
            match quoted(command) {
                Some(volume) => {
                    host.volumes.entry(volume.clone()).or_insert(0);
                    ok(format!("{volume}\n"))
                }
                None => failed("invalid volume name"),
            }
        } else if let Some(tool) = command.strip_prefix("command -v ") {
            if host.tools.iter().any(|t| t == tool) {
                ok(format!("/usr/bin/{tool}\n"))
            } else {
                failed("")
            }
        } else {
            ok("")
        };
        Ok(output)
    }

    fn disconnect(&self) {
        self.state.borrow_mut().disconnects += 1;
    }
}

// =============================================================================
// Local commands
// =============================================================================

#[derive(Default)]
pub struct RecordingRunner {
    pub calls: RefCell<Vec<CommandSpec>>,
    /// Fail any command whose rendering contains this text.
    pub fail_on: RefCell<Option<String>>,
}

impl RecordingRunner {
    pub fn fail_on(&self, needle: &str) {
        *self.fail_on.borrow_mut() = Some(needle.to_string());
    }

    pub fn succeed(&self) {
        *self.fail_on.borrow_mut() = None;
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.borrow().clone()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, command: &CommandSpec) -> anyhow::Result<()> {
        self.calls.borrow_mut().push(command.clone());
        let rendered = command.to_string();
        if let Some(needle) = self.fail_on.borrow().as_deref() {
            if rendered.contains(needle) {
                anyhow::bail!("rsync error: connection unexpectedly closed (code 12)");
            }
        }
        Ok(())
    }
}

// =============================================================================
// Identifiers and platform API
// =============================================================================

/// Hands out queued identifiers first, then `new001`, `new002`, ...
#[derive(Default)]
pub struct SequenceIds {
    queued: RefCell<VecDeque<String>>,
    counter: Cell<u32>,
}

impl SequenceIds {
    pub fn queue(&self, ids: &[&str]) {
        self.queued
            .borrow_mut()
            .extend(ids.iter().map(|s| s.to_string()));
    }

    pub fn issued(&self) -> u32 {
        self.counter.get()
    }
}

impl IdentifierSource for SequenceIds {
    fn next_identifier(&self) -> String {
        if let Some(id) = self.queued.borrow_mut().pop_front() {
            return id;
        }
        let n = self.counter.get() + 1;
        self.counter.set(n);
        format!("new{n:03}")
    }
}

#[derive(Default)]
pub struct FakePlatform {
    pub stopped: RefCell<Vec<(ResourceKind, String)>>,
    pub fail_stop: Cell<bool>,
}

impl PlatformApi for FakePlatform {
    fn list_hosts(&self) -> Result<Vec<PlatformHost>> {
        Ok(Vec::new())
    }

    fn list_services(&self) -> Result<Vec<PlatformResource>> {
        Ok(Vec::new())
    }

    fn list_applications(&self) -> Result<Vec<PlatformResource>> {
        Ok(Vec::new())
    }

    fn list_databases(&self) -> Result<Vec<PlatformResource>> {
        Ok(Vec::new())
    }

    fn get_resource(&self, _uuid: &str) -> Result<Option<PlatformResource>> {
        Ok(None)
    }

    fn stop(&self, kind: ResourceKind, uuid: &str) -> Result<()> {
        if self.fail_stop.get() {
            return Err(MigrationError::Connectivity("api returned 500".into()));
        }
        self.stopped.borrow_mut().push((kind, uuid.to_string()));
        Ok(())
    }

    fn start(&self, _kind: ResourceKind, _uuid: &str) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Fixture
// =============================================================================

/// Two hosts, `alpha` (source) and `beta` (target), each with a destination
/// and an ssh key on disk.
pub struct Fixture {
    pub store: MemoryStore,
    pub shell: FakeShell,
    pub runner: RecordingRunner,
    pub ids: SequenceIds,
    pub platform: FakePlatform,
    pub keys: KeyRing,
    pub transfer: TransferSettings,
    pub alpha: i64,
    pub beta: i64,
    pub use_journal: bool,
    pub allow_unmapped: bool,
    _keys_dir: TempDir,
    _staging: TempDir,
    state_dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let keys_dir = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        let state_dir = TempDir::new().unwrap();

        let store = MemoryStore::new();
        let alpha = store.add_host("host-alpha", "alpha", "10.0.0.1");
        store.add_destination(alpha);
        let beta = store.add_host("host-beta", "beta", "10.0.0.2");
        store.add_destination(beta);

        let keys = KeyRing::new(keys_dir.path());
        for uuid in ["host-alpha", "host-beta"] {
            std::fs::write(keys.path_for(&format!("{uuid}-key")), "PRIVATE KEY").unwrap();
        }

        let shell = FakeShell::default();
        shell.host("alpha", FakeHost::default());
        shell.host("beta", FakeHost::default());

        let transfer = TransferSettings {
            mode: TransferMode::Relay,
            tool: "rsync".to_string(),
            staging_dir: staging.path().to_path_buf(),
            volume_root: VOLUME_ROOT.to_string(),
        };

        Self {
            store,
            shell,
            runner: RecordingRunner::default(),
            ids: SequenceIds::default(),
            platform: FakePlatform::default(),
            keys,
            transfer,
            alpha,
            beta,
            use_journal: true,
            allow_unmapped: false,
            _keys_dir: keys_dir,
            _staging: staging,
            state_dir,
        }
    }

    pub fn journal(&self) -> JournalStore {
        JournalStore::new(self.state_dir.path())
    }

    pub fn migrator(&self) -> Migrator<'_> {
        Migrator {
            store: &self.store,
            shell: &self.shell,
            runner: &self.runner,
            platform: Some(&self.platform),
            ids: &self.ids,
            keys: &self.keys,
            transfer: &self.transfer,
            retire_suffix: "-old".to_string(),
            allow_unmapped_volume_names: self.allow_unmapped,
            journal: self.use_journal.then(|| self.journal()),
        }
    }

    /// A standalone PostgreSQL `pg1` named `main-db` on alpha with one
    /// variable and one volume of `bytes` bytes. Returns its row id.
    pub fn seed_postgres(&self, bytes: u64) -> i64 {
        let id = self
            .store
            .add_resource(ResourceKind::Postgresql, "pg1", "main-db", self.alpha);
        let owner = OwnerRef::resource(ResourceKind::Postgresql, id);
        self.store.add_env_var(owner, "POSTGRES_USER", "app");
        self.store.add_volume(owner, "postgres-data-pg1", "/var/lib/postgresql/data");
        self.shell.with_host("alpha", |h| {
            h.volumes.insert("postgres-data-pg1".to_string(), bytes);
        });
        id
    }

    pub fn set_available(&self, host: &str, bytes: u64) {
        self.shell.with_host(host, |h| h.available = bytes);
    }
}
