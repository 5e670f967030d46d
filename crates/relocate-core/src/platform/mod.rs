//! Platform control API.

mod http;

pub use http::HttpPlatform;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::ResourceKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformHost {
    #[serde(default)]
    pub id: Option<i64>,
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub ip: String,
}

impl PlatformHost {
    pub fn matches(&self, identifier: &str) -> bool {
        self.name == identifier || self.uuid == identifier
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformVolume {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub volume_name: Option<String>,
    #[serde(default)]
    pub mount_path: Option<String>,
}

impl PlatformVolume {
    pub fn display_name(&self) -> &str {
        self.volume_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("(unnamed)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformResource {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub server_id: Option<i64>,
    /// Resource type as reported by the API, e.g. `service` or `standalone-postgresql`.
    #[serde(default, rename = "type")]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub persistent_storages: Vec<PlatformVolume>,
}

/// Capability over the platform's HTTP API.
pub trait PlatformApi {
    fn list_hosts(&self) -> Result<Vec<PlatformHost>>;

    fn list_services(&self) -> Result<Vec<PlatformResource>>;

    fn list_applications(&self) -> Result<Vec<PlatformResource>>;

    fn list_databases(&self) -> Result<Vec<PlatformResource>>;

    fn get_resource(&self, uuid: &str) -> Result<Option<PlatformResource>>;

    fn stop(&self, kind: ResourceKind, uuid: &str) -> Result<()>;

    fn start(&self, kind: ResourceKind, uuid: &str) -> Result<()>;
}

/// API path segment for lifecycle actions on `kind`.
pub fn action_collection(kind: ResourceKind) -> &'static str {
    if kind.is_database() {
        "databases"
    } else {
        "services"
    }
}
