//! Shared domain types for hosts, resources and volumes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Resource categories the locator can resolve.
///
/// Composite services come first; the standalone database engines follow in
/// the fixed priority order used when probing for a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A named group of applications and databases sharing one compose manifest.
    Service,
    Postgresql,
    Redis,
    Mysql,
    Mariadb,
    Mongodb,
    Keydb,
    Dragonfly,
    Clickhouse,
}

impl ResourceKind {
    /// Default probe order: composite services, then database engines.
    pub const PROBE_ORDER: [ResourceKind; 9] = [
        ResourceKind::Service,
        ResourceKind::Postgresql,
        ResourceKind::Redis,
        ResourceKind::Mysql,
        ResourceKind::Mariadb,
        ResourceKind::Mongodb,
        ResourceKind::Keydb,
        ResourceKind::Dragonfly,
        ResourceKind::Clickhouse,
    ];

    /// Probe order with `expected` moved to the front, if given.
    pub fn probe_order(expected: Option<ResourceKind>) -> Vec<ResourceKind> {
        let mut order = Vec::with_capacity(Self::PROBE_ORDER.len());
        if let Some(kind) = expected {
            order.push(kind);
        }
        order.extend(
            Self::PROBE_ORDER
                .iter()
                .copied()
                .filter(|k| Some(*k) != expected),
        );
        order
    }

    pub fn is_database(self) -> bool {
        !matches!(self, ResourceKind::Service)
    }

    /// Short lowercase label used on the command line and in batch files.
    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::Service => "service",
            ResourceKind::Postgresql => "postgresql",
            ResourceKind::Redis => "redis",
            ResourceKind::Mysql => "mysql",
            ResourceKind::Mariadb => "mariadb",
            ResourceKind::Mongodb => "mongodb",
            ResourceKind::Keydb => "keydb",
            ResourceKind::Dragonfly => "dragonfly",
            ResourceKind::Clickhouse => "clickhouse",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ResourceKind::Service => "Service",
            ResourceKind::Postgresql => "PostgreSQL",
            ResourceKind::Redis => "Redis",
            ResourceKind::Mysql => "MySQL",
            ResourceKind::Mariadb => "MariaDB",
            ResourceKind::Mongodb => "MongoDB",
            ResourceKind::Keydb => "KeyDB",
            ResourceKind::Dragonfly => "Dragonfly",
            ResourceKind::Clickhouse => "ClickHouse",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        let kind = match normalized.as_str() {
            "service" | "services" => ResourceKind::Service,
            "postgresql" | "postgres" | "pg" => ResourceKind::Postgresql,
            "redis" => ResourceKind::Redis,
            "mysql" => ResourceKind::Mysql,
            "mariadb" => ResourceKind::Mariadb,
            "mongodb" | "mongo" => ResourceKind::Mongodb,
            "keydb" => ResourceKind::Keydb,
            "dragonfly" => ResourceKind::Dragonfly,
            "clickhouse" => ResourceKind::Clickhouse,
            _ => return Err(s.to_string()),
        };
        Ok(kind)
    }
}

/// Members nested inside a composite service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubResourceKind {
    Application,
    Database,
}

/// The kind of row that owns environment variables and volumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OwnerKind {
    Resource(ResourceKind),
    Sub(SubResourceKind),
}

/// Polymorphic reference to an owning row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: OwnerKind,
    pub id: i64,
}

impl OwnerRef {
    pub fn resource(kind: ResourceKind, id: i64) -> Self {
        Self {
            kind: OwnerKind::Resource(kind),
            id,
        }
    }

    pub fn sub(kind: SubResourceKind, id: i64) -> Self {
        Self {
            kind: OwnerKind::Sub(kind),
            id,
        }
    }
}

/// A host as recorded in the configuration store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDescriptor {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub ip: String,
    pub port: u16,
    pub user: String,
    /// Identifier of the management key, used to locate the key file.
    pub private_key_uuid: Option<String>,
}

impl HostDescriptor {
    /// `user@address` form used by ssh and the copy program.
    pub fn ssh_target(&self) -> String {
        format!("{}@{}", self.user, self.ip)
    }
}

/// A host's registered execution target for new resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub server_id: i64,
}

/// Root row of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub kind: ResourceKind,
    /// Host the resource is bound to, resolved through its destination for databases.
    pub server_id: Option<i64>,
    pub destination_id: Option<i64>,
    pub status: Option<String>,
}

/// An application or database member of a composite service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubResourceRecord {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub kind: SubResourceKind,
    pub service_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVarRecord {
    pub id: i64,
    pub uuid: String,
    pub key: String,
    pub owner: OwnerRef,
}

/// A persisted volume row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRecord {
    pub id: i64,
    pub name: String,
    pub mount_path: String,
    pub host_path: Option<String>,
    pub owner: OwnerRef,
}

/// Values for a volume row about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVolume {
    pub name: String,
    pub mount_path: String,
    pub host_path: Option<String>,
}

/// Who a volume belongs to, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeOwner {
    Root,
    Application(String),
    Database(String),
}

impl fmt::Display for VolumeOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolumeOwner::Root => f.write_str("resource"),
            VolumeOwner::Application(name) => write!(f, "application {name}"),
            VolumeOwner::Database(name) => write!(f, "database {name}"),
        }
    }
}

/// A volume paired with the identifier of the row that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedVolume {
    pub volume: VolumeRecord,
    pub owner_uuid: String,
    pub owner: VolumeOwner,
}

/// Everything the locator knows about a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub record: ResourceRecord,
    pub sub_resources: Vec<SubResourceRecord>,
    pub volumes: Vec<OwnedVolume>,
}

impl ResourceDescriptor {
    pub fn kind(&self) -> ResourceKind {
        self.record.kind
    }

    pub fn uuid(&self) -> &str {
        &self.record.uuid
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn volume_names(&self) -> Vec<String> {
        self.volumes.iter().map(|v| v.volume.name.clone()).collect()
    }
}
