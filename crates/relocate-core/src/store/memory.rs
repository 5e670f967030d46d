//! In-memory configuration store.
//!
//! Rows are loose column maps so the same allow-lists and resets that drive
//! the SQL implementation can be applied and inspected directly.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;

use super::{ConfigStore, RootCopy, StoreConnector, StoreError, StoreResult};
use crate::schema::{
    ColumnReset, DESTINATIONS_TABLE, ENV_VAR_COPY, ENV_VARS_TABLE, SERVERS_TABLE, TableSpec,
    VOLUMES_TABLE,
};
use crate::types::{
    Destination, EnvVarRecord, HostDescriptor, NewVolume, OwnerRef, ResourceKind,
    ResourceRecord, SubResourceKind, SubResourceRecord, VolumeRecord,
};

pub type Row = BTreeMap<String, Value>;

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    rows: HashMap<String, Vec<Row>>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn table(&self, name: &str) -> &[Row] {
        self.rows.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    fn table_mut(&mut self, name: &str) -> &mut Vec<Row> {
        self.rows.entry(name.to_string()).or_default()
    }

    fn find(&self, table: &str, id: i64) -> Option<&Row> {
        self.table(table).iter().find(|r| int(r, "id") == Some(id))
    }

    fn uuid_taken(&self, table: &str, uuid: &str) -> bool {
        self.table(table)
            .iter()
            .any(|r| text(r, "uuid").as_deref() == Some(uuid))
    }

    fn insert(&mut self, table: &str, mut row: Row) -> i64 {
        let id = self.allocate_id();
        row.insert("id".into(), Value::from(id));
        self.table_mut(table).push(row);
        id
    }

    /// Oldest live row whose uuid or name equals `identifier`.
    fn lookup(&self, table: &str, identifier: &str) -> Option<&Row> {
        self.table(table)
            .iter()
            .filter(|r| is_live(r))
            .filter(|r| {
                text(r, "uuid").as_deref() == Some(identifier)
                    || text(r, "name").as_deref() == Some(identifier)
            })
            .min_by_key(|r| int(r, "id"))
    }
}

/// Thread-safe in-memory store with seeding helpers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    unreachable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `ping` and `open` fail as if the store were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn with<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        let mut guard = match self.tables.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    // ------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------

    pub fn add_host(&self, uuid: &str, name: &str, ip: &str) -> i64 {
        let mut row = Row::new();
        row.insert("uuid".into(), uuid.into());
        row.insert("name".into(), name.into());
        row.insert("ip".into(), ip.into());
        row.insert("port".into(), Value::from(22));
        row.insert("user".into(), "root".into());
        row.insert("private_key_uuid".into(), format!("{uuid}-key").into());
        self.with(|t| t.insert(SERVERS_TABLE, row))
    }

    pub fn add_destination(&self, server_id: i64) -> i64 {
        self.with(|t| {
            let n = t.table(DESTINATIONS_TABLE).len() + 1;
            let mut row = Row::new();
            row.insert("uuid".into(), format!("destination-{server_id}-{n}").into());
            row.insert("name".into(), format!("docker-{n}").into());
            row.insert("server_id".into(), Value::from(server_id));
            t.insert(DESTINATIONS_TABLE, row)
        })
    }

    /// Seed a root resource bound to `server_id` through its first destination.
    pub fn add_resource(&self, kind: ResourceKind, uuid: &str, name: &str, server_id: i64) -> i64 {
        let spec = kind.table_spec();
        self.with(|t| {
            let destination_id = t
                .table(DESTINATIONS_TABLE)
                .iter()
                .filter(|r| int(r, "server_id") == Some(server_id))
                .filter_map(|r| int(r, "id"))
                .min();
            let mut row = Row::new();
            row.insert("uuid".into(), uuid.into());
            row.insert("name".into(), name.into());
            row.insert(
                "destination_id".into(),
                destination_id.map(Value::from).unwrap_or(Value::Null),
            );
            if spec.binds_server {
                row.insert("server_id".into(), Value::from(server_id));
            } else {
                row.insert("status".into(), "running:healthy".into());
                row.insert("is_public".into(), Value::Bool(true));
                row.insert("public_port".into(), Value::from(5432));
            }
            row.insert("description".into(), format!("{name} description").into());
            t.insert(spec.table, row)
        })
    }

    pub fn add_sub_resource(
        &self,
        kind: SubResourceKind,
        service_id: i64,
        uuid: &str,
        name: &str,
    ) -> i64 {
        let spec = kind.table_spec();
        let mut row = Row::new();
        row.insert("uuid".into(), uuid.into());
        row.insert("name".into(), name.into());
        row.insert("service_id".into(), Value::from(service_id));
        row.insert("status".into(), "running:healthy".into());
        row.insert("image".into(), format!("{name}:latest").into());
        if kind == SubResourceKind::Application {
            row.insert("fqdn".into(), format!("https://{name}.example.com").into());
        }
        self.with(|t| t.insert(spec.table, row))
    }

    pub fn add_env_var(&self, owner: OwnerRef, key: &str, value: &str) -> i64 {
        self.with(|t| {
            let n = t.table(ENV_VARS_TABLE).len() + 1;
            let mut row = Row::new();
            row.insert("uuid".into(), format!("env-seed-{n}").into());
            row.insert("key".into(), key.into());
            row.insert("value".into(), value.into());
            row.insert("is_runtime".into(), Value::Bool(true));
            row.insert("is_buildtime".into(), Value::Bool(false));
            row.insert("is_literal".into(), Value::Bool(false));
            row.insert("is_shared".into(), Value::Bool(false));
            row.insert("resourceable_type".into(), owner.kind.model().into());
            row.insert("resourceable_id".into(), Value::from(owner.id));
            t.insert(ENV_VARS_TABLE, row)
        })
    }

    pub fn add_volume(&self, owner: OwnerRef, name: &str, mount_path: &str) -> i64 {
        let mut row = Row::new();
        row.insert("name".into(), name.into());
        row.insert("mount_path".into(), mount_path.into());
        row.insert("host_path".into(), Value::Null);
        row.insert("resource_type".into(), owner.kind.model().into());
        row.insert("resource_id".into(), Value::from(owner.id));
        self.with(|t| t.insert(VOLUMES_TABLE, row))
    }

    pub fn set_column(&self, table: &str, id: i64, column: &str, value: Value) {
        self.with(|t| {
            if let Some(row) = t
                .table_mut(table)
                .iter_mut()
                .find(|r| int(r, "id") == Some(id))
            {
                row.insert(column.to_string(), value);
            }
        });
    }

    pub fn soft_delete(&self, table: &str, id: i64) {
        self.set_column(table, id, "deleted_at", "2024-01-01T00:00:00Z".into());
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.with(|t| t.table(table).to_vec())
    }

    pub fn row(&self, table: &str, id: i64) -> Option<Row> {
        self.with(|t| t.find(table, id).cloned())
    }

    fn copy_row(
        &self,
        spec: &TableSpec,
        source_id: i64,
        uuid: Option<&str>,
        fixed: Vec<(&str, Value)>,
    ) -> StoreResult<i64> {
        self.copy_row_in(spec.table, spec.copy, spec.resets, source_id, uuid, fixed)
    }

    fn copy_row_in(
        &self,
        table: &'static str,
        copy: &[&str],
        resets: &[(&str, ColumnReset)],
        source_id: i64,
        uuid: Option<&str>,
        fixed: Vec<(&str, Value)>,
    ) -> StoreResult<i64> {
        self.with(|t| {
            let source = t
                .find(table, source_id)
                .cloned()
                .ok_or(StoreError::MissingRow {
                    table,
                    id: source_id,
                })?;
            if let Some(uuid) = uuid {
                if t.uuid_taken(table, uuid) {
                    return Err(StoreError::UniqueViolation {
                        table,
                        identifier: uuid.to_string(),
                    });
                }
            }

            let mut row = Row::new();
            for column in copy {
                if let Some(value) = source.get(*column) {
                    row.insert((*column).to_string(), value.clone());
                }
            }
            for (column, reset) in resets {
                row.insert((*column).to_string(), reset_value(*reset));
            }
            if let Some(uuid) = uuid {
                row.insert("uuid".into(), uuid.into());
            }
            for (column, value) in fixed {
                row.insert(column.to_string(), value);
            }
            let now = Value::from(chrono::Utc::now().to_rfc3339());
            row.insert("created_at".into(), now.clone());
            row.insert("updated_at".into(), now);
            Ok(t.insert(table, row))
        })
    }
}

impl ConfigStore for MemoryStore {
    fn ping(&self) -> StoreResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("memory store marked unreachable".into()));
        }
        Ok(())
    }

    fn find_host(&self, identifier: &str) -> StoreResult<Option<HostDescriptor>> {
        Ok(self.with(|t| {
            t.lookup(SERVERS_TABLE, identifier).map(|r| HostDescriptor {
                id: int(r, "id").unwrap_or_default(),
                uuid: text(r, "uuid").unwrap_or_default(),
                name: text(r, "name").unwrap_or_default(),
                ip: text(r, "ip").unwrap_or_default(),
                port: int(r, "port")
                    .and_then(|p| u16::try_from(p).ok())
                    .unwrap_or(22),
                user: text(r, "user").unwrap_or_else(|| "root".to_string()),
                private_key_uuid: text(r, "private_key_uuid"),
            })
        }))
    }

    fn find_destination(&self, server_id: i64) -> StoreResult<Option<Destination>> {
        Ok(self.with(|t| {
            t.table(DESTINATIONS_TABLE)
                .iter()
                .filter(|r| int(r, "server_id") == Some(server_id))
                .min_by_key(|r| int(r, "id"))
                .map(|r| Destination {
                    id: int(r, "id").unwrap_or_default(),
                    uuid: text(r, "uuid").unwrap_or_default(),
                    name: text(r, "name").unwrap_or_default(),
                    server_id,
                })
        }))
    }

    fn find_resource(
        &self,
        kind: ResourceKind,
        identifier: &str,
    ) -> StoreResult<Option<ResourceRecord>> {
        let spec = kind.table_spec();
        Ok(self.with(|t| {
            let row = t.lookup(spec.table, identifier)?;
            let destination_id = int(row, "destination_id");
            let server_id = if spec.binds_server {
                int(row, "server_id")
            } else {
                destination_id
                    .and_then(|d| t.find(DESTINATIONS_TABLE, d))
                    .and_then(|d| int(d, "server_id"))
            };
            Some(ResourceRecord {
                id: int(row, "id").unwrap_or_default(),
                uuid: text(row, "uuid").unwrap_or_default(),
                name: text(row, "name").unwrap_or_default(),
                kind,
                server_id,
                destination_id,
                status: text(row, "status"),
            })
        }))
    }

    fn sub_resources(&self, service_id: i64) -> StoreResult<Vec<SubResourceRecord>> {
        Ok(self.with(|t| {
            let mut subs = Vec::new();
            for kind in [SubResourceKind::Application, SubResourceKind::Database] {
                let mut rows: Vec<&Row> = t
                    .table(kind.table_spec().table)
                    .iter()
                    .filter(|r| is_live(r) && int(r, "service_id") == Some(service_id))
                    .collect();
                rows.sort_by_key(|r| int(r, "id"));
                subs.extend(rows.into_iter().map(|r| SubResourceRecord {
                    id: int(r, "id").unwrap_or_default(),
                    uuid: text(r, "uuid").unwrap_or_default(),
                    name: text(r, "name").unwrap_or_default(),
                    kind,
                    service_id,
                }));
            }
            subs
        }))
    }

    fn environment_variables(&self, owner: OwnerRef) -> StoreResult<Vec<EnvVarRecord>> {
        Ok(self.with(|t| {
            t.table(ENV_VARS_TABLE)
                .iter()
                .filter(|r| owned_by(r, "resourceable_type", "resourceable_id", owner))
                .map(|r| EnvVarRecord {
                    id: int(r, "id").unwrap_or_default(),
                    uuid: text(r, "uuid").unwrap_or_default(),
                    key: text(r, "key").unwrap_or_default(),
                    owner,
                })
                .collect()
        }))
    }

    fn volumes(&self, owner: OwnerRef) -> StoreResult<Vec<VolumeRecord>> {
        Ok(self.with(|t| {
            t.table(VOLUMES_TABLE)
                .iter()
                .filter(|r| owned_by(r, "resource_type", "resource_id", owner))
                .map(|r| VolumeRecord {
                    id: int(r, "id").unwrap_or_default(),
                    name: text(r, "name").unwrap_or_default(),
                    mount_path: text(r, "mount_path").unwrap_or_default(),
                    host_path: text(r, "host_path"),
                    owner,
                })
                .collect()
        }))
    }

    fn copy_resource(
        &self,
        kind: ResourceKind,
        source_id: i64,
        target: &RootCopy<'_>,
    ) -> StoreResult<i64> {
        let spec = kind.table_spec();
        let mut fixed = vec![
            ("name", Value::from(target.name)),
            ("destination_id", Value::from(target.destination_id)),
        ];
        if spec.binds_server {
            fixed.push(("server_id", Value::from(target.server_id)));
        }
        self.copy_row(spec, source_id, Some(target.uuid), fixed)
    }

    fn copy_sub_resource(
        &self,
        kind: SubResourceKind,
        source_id: i64,
        service_id: i64,
        uuid: &str,
    ) -> StoreResult<i64> {
        self.copy_row(
            kind.table_spec(),
            source_id,
            Some(uuid),
            vec![("service_id", Value::from(service_id))],
        )
    }

    fn copy_environment_variable(
        &self,
        source_id: i64,
        owner: OwnerRef,
        uuid: &str,
    ) -> StoreResult<i64> {
        self.copy_row_in(
            ENV_VARS_TABLE,
            ENV_VAR_COPY,
            &[],
            source_id,
            Some(uuid),
            vec![
                ("resourceable_type", Value::from(owner.kind.model())),
                ("resourceable_id", Value::from(owner.id)),
            ],
        )
    }

    fn insert_volume(&self, owner: OwnerRef, volume: &NewVolume) -> StoreResult<i64> {
        let mut row = Row::new();
        row.insert("name".into(), volume.name.clone().into());
        row.insert("mount_path".into(), volume.mount_path.clone().into());
        row.insert(
            "host_path".into(),
            volume
                .host_path
                .clone()
                .map(Value::from)
                .unwrap_or(Value::Null),
        );
        row.insert("container_id".into(), Value::Null);
        row.insert("resource_type".into(), owner.kind.model().into());
        row.insert("resource_id".into(), Value::from(owner.id));
        Ok(self.with(|t| t.insert(VOLUMES_TABLE, row)))
    }

    fn rename_resource(&self, kind: ResourceKind, id: i64, name: &str) -> StoreResult<()> {
        let table = kind.table_spec().table;
        self.with(|t| {
            let row = t
                .table_mut(table)
                .iter_mut()
                .find(|r| int(r, "id") == Some(id))
                .ok_or(StoreError::MissingRow { table, id })?;
            row.insert("name".into(), name.into());
            row.insert(
                "updated_at".into(),
                Value::from(chrono::Utc::now().to_rfc3339()),
            );
            Ok(())
        })
    }
}

impl StoreConnector for MemoryStore {
    fn open(&self) -> StoreResult<Box<dyn ConfigStore + '_>> {
        self.ping()?;
        Ok(Box::new(self))
    }
}

fn reset_value(reset: ColumnReset) -> Value {
    match reset {
        ColumnReset::Null => Value::Null,
        ColumnReset::Text(value) => Value::from(value),
        ColumnReset::False => Value::Bool(false),
        ColumnReset::Now => Value::from(chrono::Utc::now().to_rfc3339()),
    }
}

fn int(row: &Row, column: &str) -> Option<i64> {
    row.get(column).and_then(Value::as_i64)
}

fn text(row: &Row, column: &str) -> Option<String> {
    row.get(column).and_then(Value::as_str).map(str::to_string)
}

fn is_live(row: &Row) -> bool {
    row.get("deleted_at").is_none_or(Value::is_null)
}

fn owned_by(row: &Row, type_column: &str, id_column: &str, owner: OwnerRef) -> bool {
    text(row, type_column).as_deref() == Some(owner.kind.model())
        && int(row, id_column) == Some(owner.id)
}
