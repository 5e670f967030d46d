//! Configuration store access.
//!
//! The engine only talks to the platform's relational store through
//! [`ConfigStore`]. The Postgres implementation issues the SQL; the in-memory
//! implementation mirrors the same table semantics for tests and rehearsals.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::{PgConfigStore, PgConnector};

use crate::types::{
    Destination, EnvVarRecord, HostDescriptor, NewVolume, OwnerRef, ResourceKind, ResourceRecord,
    SubResourceKind, SubResourceRecord, VolumeRecord,
};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("configuration store unreachable: {0}")]
    Connection(String),

    #[error("configuration store query failed: {0}")]
    Query(String),

    #[error("identifier {identifier} already exists in {table}")]
    UniqueViolation {
        table: &'static str,
        identifier: String,
    },

    #[error("{table} row {id} does not exist")]
    MissingRow { table: &'static str, id: i64 },
}

/// Binding for the root row of a clone.
#[derive(Debug, Clone, Copy)]
pub struct RootCopy<'a> {
    pub uuid: &'a str,
    pub name: &'a str,
    pub server_id: i64,
    pub destination_id: i64,
}

/// Read and write capability over the platform's configuration tables.
///
/// Name-or-identifier lookups ignore soft-deleted rows and return the oldest
/// match. Every `copy_*` method copies only the allow-listed columns of the
/// source row and applies the resets from [`crate::schema`].
pub trait ConfigStore {
    fn ping(&self) -> StoreResult<()>;

    fn find_host(&self, identifier: &str) -> StoreResult<Option<HostDescriptor>>;

    fn find_destination(&self, server_id: i64) -> StoreResult<Option<Destination>>;

    fn find_resource(
        &self,
        kind: ResourceKind,
        identifier: &str,
    ) -> StoreResult<Option<ResourceRecord>>;

    fn sub_resources(&self, service_id: i64) -> StoreResult<Vec<SubResourceRecord>>;

    fn environment_variables(&self, owner: OwnerRef) -> StoreResult<Vec<EnvVarRecord>>;

    fn volumes(&self, owner: OwnerRef) -> StoreResult<Vec<VolumeRecord>>;

    /// Insert a copy of a root row. Returns the new row id.
    fn copy_resource(
        &self,
        kind: ResourceKind,
        source_id: i64,
        target: &RootCopy<'_>,
    ) -> StoreResult<i64>;

    fn copy_sub_resource(
        &self,
        kind: SubResourceKind,
        source_id: i64,
        service_id: i64,
        uuid: &str,
    ) -> StoreResult<i64>;

    fn copy_environment_variable(
        &self,
        source_id: i64,
        owner: OwnerRef,
        uuid: &str,
    ) -> StoreResult<i64>;

    fn insert_volume(&self, owner: OwnerRef, volume: &NewVolume) -> StoreResult<i64>;

    fn rename_resource(&self, kind: ResourceKind, id: i64, name: &str) -> StoreResult<()>;
}

impl<T: ConfigStore + ?Sized> ConfigStore for &T {
    fn ping(&self) -> StoreResult<()> {
        (**self).ping()
    }

    fn find_host(&self, identifier: &str) -> StoreResult<Option<HostDescriptor>> {
        (**self).find_host(identifier)
    }

    fn find_destination(&self, server_id: i64) -> StoreResult<Option<Destination>> {
        (**self).find_destination(server_id)
    }

    fn find_resource(
        &self,
        kind: ResourceKind,
        identifier: &str,
    ) -> StoreResult<Option<ResourceRecord>> {
        (**self).find_resource(kind, identifier)
    }

    fn sub_resources(&self, service_id: i64) -> StoreResult<Vec<SubResourceRecord>> {
        (**self).sub_resources(service_id)
    }

    fn environment_variables(&self, owner: OwnerRef) -> StoreResult<Vec<EnvVarRecord>> {
        (**self).environment_variables(owner)
    }

    fn volumes(&self, owner: OwnerRef) -> StoreResult<Vec<VolumeRecord>> {
        (**self).volumes(owner)
    }

    fn copy_resource(
        &self,
        kind: ResourceKind,
        source_id: i64,
        target: &RootCopy<'_>,
    ) -> StoreResult<i64> {
        (**self).copy_resource(kind, source_id, target)
    }

    fn copy_sub_resource(
        &self,
        kind: SubResourceKind,
        source_id: i64,
        service_id: i64,
        uuid: &str,
    ) -> StoreResult<i64> {
        (**self).copy_sub_resource(kind, source_id, service_id, uuid)
    }

    fn copy_environment_variable(
        &self,
        source_id: i64,
        owner: OwnerRef,
        uuid: &str,
    ) -> StoreResult<i64> {
        (**self).copy_environment_variable(source_id, owner, uuid)
    }

    fn insert_volume(&self, owner: OwnerRef, volume: &NewVolume) -> StoreResult<i64> {
        (**self).insert_volume(owner, volume)
    }

    fn rename_resource(&self, kind: ResourceKind, id: i64, name: &str) -> StoreResult<()> {
        (**self).rename_resource(kind, id, name)
    }
}

/// Opens a store connection scoped to one migration.
///
/// The returned handle is dropped when the migration ends, which releases the
/// underlying connection on every exit path.
pub trait StoreConnector {
    fn open(&self) -> StoreResult<Box<dyn ConfigStore + '_>>;
}
