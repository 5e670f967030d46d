//! Postgres-backed configuration store.
//!
//! The engine is synchronous, so each store owns a single-threaded tokio
//! runtime and drives sqlx through `block_on`. One pooled connection is enough
//! for the strictly sequential statement order of a migration.

use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tokio::runtime::Runtime;

use super::{ConfigStore, RootCopy, StoreConnector, StoreError, StoreResult};
use crate::config::DatabaseConfig;
use crate::schema::{
    DESTINATIONS_TABLE, ENV_VAR_COPY, ENV_VARS_TABLE, PRIVATE_KEYS_TABLE, SERVERS_TABLE,
    TableSpec, VOLUMES_TABLE, quoted_columns,
};
use crate::types::{
    Destination, EnvVarRecord, HostDescriptor, NewVolume, OwnerRef, ResourceKind,
    ResourceRecord, SubResourceKind, SubResourceRecord, VolumeRecord,
};

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

pub struct PgConfigStore {
    runtime: Runtime,
    pool: PgPool,
}

impl PgConfigStore {
    pub fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StoreError::Connection(format!("failed to start runtime: {e}")))?;

        let mut options = PgConnectOptions::new()
            .host(config.host())
            .port(config.port)
            .username(&config.user)
            .database(&config.name);
        if let Some(password) = &config.password {
            options = options.password(password);
        }

        tracing::debug!(
            "Connecting to configuration store at {}:{}/{}",
            config.host(),
            config.port,
            config.name
        );
        let pool = runtime
            .block_on(
                PgPoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
                    .connect_with(options),
            )
            .map_err(|e| {
                StoreError::Connection(format!(
                    "{}@{}:{}/{}: {e}",
                    config.user,
                    config.host(),
                    config.port,
                    config.name
                ))
            })?;

        Ok(Self { runtime, pool })
    }

    fn fetch_optional(&self, query: PgQuery<'_>) -> StoreResult<Option<PgRow>> {
        self.runtime
            .block_on(query.fetch_optional(&self.pool))
            .map_err(query_error)
    }

    fn fetch_all(&self, query: PgQuery<'_>) -> StoreResult<Vec<PgRow>> {
        self.runtime
            .block_on(query.fetch_all(&self.pool))
            .map_err(query_error)
    }

    /// Run an `INSERT ... RETURNING id` and map uniqueness violations.
    fn insert_returning(
        &self,
        table: &'static str,
        identifier: &str,
        query: PgQuery<'_>,
    ) -> StoreResult<i64> {
        let row = self
            .runtime
            .block_on(query.fetch_optional(&self.pool))
            .map_err(|e| insert_error(e, table, identifier))?;
        match row {
            Some(row) => get(&row, "id"),
            None => Err(StoreError::MissingRow { table, id: 0 }),
        }
    }
}

impl Drop for PgConfigStore {
    fn drop(&mut self) {
        self.runtime.block_on(self.pool.close());
    }
}

impl ConfigStore for PgConfigStore {
    fn ping(&self) -> StoreResult<()> {
        self.runtime
            .block_on(sqlx::query("SELECT 1").execute(&self.pool))
            .map(|_| ())
            .map_err(|e| StoreError::Connection(e.to_string()))
    }

    fn find_host(&self, identifier: &str) -> StoreResult<Option<HostDescriptor>> {
        let sql = format!(
            "SELECT s.id::bigint AS id, s.uuid, s.name, s.ip, s.port::int4 AS port, \
             s.\"user\" AS ssh_user, k.uuid AS private_key_uuid \
             FROM {SERVERS_TABLE} s LEFT JOIN {PRIVATE_KEYS_TABLE} k ON k.id = s.private_key_id \
             WHERE (s.uuid = $1 OR s.name = $1) AND s.deleted_at IS NULL \
             ORDER BY s.id LIMIT 1"
        );
        let row = self.fetch_optional(sqlx::query(&sql).bind(identifier))?;
        row.map(|row| {
            let port: i32 = get(&row, "port")?;
            Ok(HostDescriptor {
                id: get(&row, "id")?,
                uuid: get(&row, "uuid")?,
                name: get(&row, "name")?,
                ip: get(&row, "ip")?,
                port: u16::try_from(port)
                    .map_err(|_| StoreError::Query(format!("invalid ssh port {port}")))?,
                user: get(&row, "ssh_user")?,
                private_key_uuid: get(&row, "private_key_uuid")?,
            })
        })
        .transpose()
    }

    fn find_destination(&self, server_id: i64) -> StoreResult<Option<Destination>> {
        let sql = format!(
            "SELECT id::bigint AS id, uuid, name FROM {DESTINATIONS_TABLE} \
             WHERE server_id = $1 ORDER BY id LIMIT 1"
        );
        let row = self.fetch_optional(sqlx::query(&sql).bind(server_id))?;
        row.map(|row| {
            Ok(Destination {
                id: get(&row, "id")?,
                uuid: get(&row, "uuid")?,
                name: get(&row, "name")?,
                server_id,
            })
        })
        .transpose()
    }

    fn find_resource(
        &self,
        kind: ResourceKind,
        identifier: &str,
    ) -> StoreResult<Option<ResourceRecord>> {
        let spec = kind.table_spec();
        let sql = if spec.binds_server {
            format!(
                "SELECT r.id::bigint AS id, r.uuid, r.name, r.server_id::bigint AS server_id, \
                 r.destination_id::bigint AS destination_id, NULL::text AS status \
                 FROM {table} r \
                 WHERE (r.uuid = $1 OR r.name = $1) AND r.deleted_at IS NULL \
                 ORDER BY r.id LIMIT 1",
                table = spec.table
            )
        } else {
            format!(
                "SELECT r.id::bigint AS id, r.uuid, r.name, d.server_id::bigint AS server_id, \
                 r.destination_id::bigint AS destination_id, r.status::text AS status \
                 FROM {table} r LEFT JOIN {DESTINATIONS_TABLE} d ON d.id = r.destination_id \
                 WHERE (r.uuid = $1 OR r.name = $1) AND r.deleted_at IS NULL \
                 ORDER BY r.id LIMIT 1",
                table = spec.table
            )
        };
        let row = self.fetch_optional(sqlx::query(&sql).bind(identifier))?;
        row.map(|row| {
            Ok(ResourceRecord {
                id: get(&row, "id")?,
                uuid: get(&row, "uuid")?,
                name: get(&row, "name")?,
                kind,
                server_id: get(&row, "server_id")?,
                destination_id: get(&row, "destination_id")?,
                status: get(&row, "status")?,
            })
        })
        .transpose()
    }

    fn sub_resources(&self, service_id: i64) -> StoreResult<Vec<SubResourceRecord>> {
        let mut subs = Vec::new();
        for kind in [SubResourceKind::Application, SubResourceKind::Database] {
            let sql = format!(
                "SELECT id::bigint AS id, uuid, name FROM {} \
                 WHERE service_id = $1 AND deleted_at IS NULL ORDER BY id",
                kind.table_spec().table
            );
            for row in self.fetch_all(sqlx::query(&sql).bind(service_id))? {
                subs.push(SubResourceRecord {
                    id: get(&row, "id")?,
                    uuid: get(&row, "uuid")?,
                    name: get(&row, "name")?,
                    kind,
                    service_id,
                });
            }
        }
        Ok(subs)
    }

    fn environment_variables(&self, owner: OwnerRef) -> StoreResult<Vec<EnvVarRecord>> {
        let sql = format!(
            "SELECT id::bigint AS id, uuid, \"key\" FROM {ENV_VARS_TABLE} \
             WHERE resourceable_type = $1 AND resourceable_id = $2 ORDER BY id"
        );
        self.fetch_all(
            sqlx::query(&sql)
                .bind(owner.kind.model())
                .bind(owner.id),
        )?
        .iter()
        .map(|row| {
            Ok(EnvVarRecord {
                id: get(row, "id")?,
                uuid: get(row, "uuid")?,
                key: get(row, "key")?,
                owner,
            })
        })
        .collect()
    }

    fn volumes(&self, owner: OwnerRef) -> StoreResult<Vec<VolumeRecord>> {
        let sql = format!(
            "SELECT id::bigint AS id, name, mount_path, host_path FROM {VOLUMES_TABLE} \
             WHERE resource_type = $1 AND resource_id = $2 ORDER BY id"
        );
        self.fetch_all(
            sqlx::query(&sql)
                .bind(owner.kind.model())
                .bind(owner.id),
        )?
        .iter()
        .map(|row| {
            Ok(VolumeRecord {
                id: get(row, "id")?,
                name: get(row, "name")?,
                mount_path: get(row, "mount_path")?,
                host_path: get(row, "host_path")?,
                owner,
            })
        })
        .collect()
    }

    fn copy_resource(
        &self,
        kind: ResourceKind,
        source_id: i64,
        target: &RootCopy<'_>,
    ) -> StoreResult<i64> {
        let spec = kind.table_spec();
        let mut fixed = vec![("uuid", "$2"), ("name", "$3"), ("destination_id", "$4")];
        if spec.binds_server {
            fixed.push(("server_id", "$5"));
        }
        let sql = copy_statement(spec, &fixed);
        let mut query = sqlx::query(&sql)
            .bind(source_id)
            .bind(target.uuid)
            .bind(target.name)
            .bind(target.destination_id);
        if spec.binds_server {
            query = query.bind(target.server_id);
        }
        self.insert_returning(spec.table, target.uuid, query)
    }

    fn copy_sub_resource(
        &self,
        kind: SubResourceKind,
        source_id: i64,
        service_id: i64,
        uuid: &str,
    ) -> StoreResult<i64> {
        let spec = kind.table_spec();
        let sql = copy_statement(spec, &[("uuid", "$2"), ("service_id", "$3")]);
        let query = sqlx::query(&sql)
            .bind(source_id)
            .bind(uuid)
            .bind(service_id);
        self.insert_returning(spec.table, uuid, query)
    }

    fn copy_environment_variable(
        &self,
        source_id: i64,
        owner: OwnerRef,
        uuid: &str,
    ) -> StoreResult<i64> {
        let columns = quoted_columns(ENV_VAR_COPY);
        let sql = format!(
            "INSERT INTO {ENV_VARS_TABLE} ({columns}, uuid, resourceable_type, resourceable_id, created_at, updated_at) \
             SELECT {columns}, $2, $3, $4, NOW(), NOW() FROM {ENV_VARS_TABLE} WHERE id = $1 \
             RETURNING id::bigint AS id"
        );
        let query = sqlx::query(&sql)
            .bind(source_id)
            .bind(uuid)
            .bind(owner.kind.model())
            .bind(owner.id);
        self.insert_returning(ENV_VARS_TABLE, uuid, query)
    }

    fn insert_volume(&self, owner: OwnerRef, volume: &NewVolume) -> StoreResult<i64> {
        let sql = format!(
            "INSERT INTO {VOLUMES_TABLE} \
             (name, mount_path, host_path, container_id, resource_type, resource_id, created_at, updated_at) \
             VALUES ($1, $2, $3, NULL, $4, $5, NOW(), NOW()) RETURNING id::bigint AS id"
        );
        let query = sqlx::query(&sql)
            .bind(&volume.name)
            .bind(&volume.mount_path)
            .bind(volume.host_path.as_deref())
            .bind(owner.kind.model())
            .bind(owner.id);
        self.insert_returning(VOLUMES_TABLE, &volume.name, query)
    }

    fn rename_resource(&self, kind: ResourceKind, id: i64, name: &str) -> StoreResult<()> {
        let table = kind.table_spec().table;
        let sql = format!("UPDATE {table} SET name = $1, updated_at = NOW() WHERE id = $2");
        let result = self
            .runtime
            .block_on(sqlx::query(&sql).bind(name).bind(id).execute(&self.pool))
            .map_err(query_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingRow { table, id });
        }
        Ok(())
    }
}

/// Build `INSERT ... SELECT` copying the allow-list of `spec` from row `$1`.
///
/// `fixed` pairs a target column with the placeholder bound for it.
fn copy_statement(spec: &TableSpec, fixed: &[(&str, &str)]) -> String {
    let mut columns: Vec<String> = spec.copy.iter().map(|c| format!("\"{c}\"")).collect();
    let mut values = columns.clone();
    for (column, reset) in spec.resets {
        columns.push(format!("\"{column}\""));
        values.push(reset.sql());
    }
    for (column, placeholder) in fixed {
        // A fixed column wins over an allow-listed one of the same name.
        if let Some(pos) = columns.iter().position(|c| c == &format!("\"{column}\"")) {
            values[pos] = (*placeholder).to_string();
        } else {
            columns.push(format!("\"{column}\""));
            values.push((*placeholder).to_string());
        }
    }
    columns.push("created_at".into());
    values.push("NOW()".into());
    columns.push("updated_at".into());
    values.push("NOW()".into());

    format!(
        "INSERT INTO {table} ({columns}) SELECT {values} FROM {table} WHERE id = $1 \
         RETURNING id::bigint AS id",
        table = spec.table,
        columns = columns.join(", "),
        values = values.join(", "),
    )
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Query(format!("column {column}: {e}")))
}

fn query_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Connection(err.to_string())
        }
        other => StoreError::Query(other.to_string()),
    }
}

fn insert_error(err: sqlx::Error, table: &'static str, identifier: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::UniqueViolation {
                table,
                identifier: identifier.to_string(),
            };
        }
    }
    query_error(err)
}

/// Opens a [`PgConfigStore`] from database settings.
#[derive(Debug, Clone)]
pub struct PgConnector {
    config: DatabaseConfig,
}

impl PgConnector {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }
}

impl StoreConnector for PgConnector {
    fn open(&self) -> StoreResult<Box<dyn ConfigStore + '_>> {
        Ok(Box::new(PgConfigStore::connect(&self.config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_statement_lists_allow_list_resets_and_bindings() {
        let spec = ResourceKind::Redis.table_spec();
        let sql = copy_statement(spec, &[("uuid", "$2"), ("name", "$3"), ("destination_id", "$4")]);
        assert!(sql.starts_with("INSERT INTO standalone_redis ("));
        assert!(sql.contains("\"redis_conf\""));
        assert!(sql.contains("'exited'"));
        assert!(sql.contains("\"uuid\""));
        assert!(sql.contains("WHERE id = $1"));
        assert!(!sql.contains("\"server_id\""));
    }

    #[test]
    fn copy_statement_binds_fixed_column_over_allow_list() {
        let spec = SubResourceKind::Application.table_spec();
        let sql = copy_statement(spec, &[("uuid", "$2"), ("service_id", "$3")]);
        assert_eq!(sql.matches("\"name\"").count(), 2);
        assert!(sql.contains("\"service_id\""));
    }
}
