//! Table layout of the configuration store.
//!
//! Every cloned row is built from an explicit allow-list of copied columns
//! plus a list of columns that are reset on the copy. Anything not listed is
//! left at the store's default. Both store implementations read these tables,
//! so the allow-lists live in exactly one place.

use crate::types::{OwnerKind, ResourceKind, SubResourceKind};

/// Value written to a reset column on a cloned row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnReset {
    Null,
    Text(&'static str),
    False,
    Now,
}

impl ColumnReset {
    /// SQL expression for the reset value. Only static literals are produced.
    pub fn sql(self) -> String {
        match self {
            ColumnReset::Null => "NULL".to_string(),
            ColumnReset::Text(value) => format!("'{value}'"),
            ColumnReset::False => "false".to_string(),
            ColumnReset::Now => "NOW()".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct TableSpec {
    pub table: &'static str,
    /// Polymorphic type name used by `resourceable_type` / `resource_type`.
    pub model: &'static str,
    /// Whether the root row carries its own `server_id` column.
    pub binds_server: bool,
    pub copy: &'static [&'static str],
    pub resets: &'static [(&'static str, ColumnReset)],
}

pub const SERVERS_TABLE: &str = "servers";
pub const DESTINATIONS_TABLE: &str = "standalone_dockers";
pub const PRIVATE_KEYS_TABLE: &str = "private_keys";
pub const ENV_VARS_TABLE: &str = "environment_variables";
pub const VOLUMES_TABLE: &str = "local_persistent_volumes";

/// Environment variable columns copied verbatim. `uuid` and the owner columns
/// are always written fresh.
pub const ENV_VAR_COPY: &[&str] = &[
    "key",
    "value",
    "is_preview",
    "is_shown_once",
    "is_multiline",
    "version",
    "is_literal",
    "order",
    "is_required",
    "is_shared",
    "is_runtime",
    "is_buildtime",
];

const DATABASE_RESETS: &[(&str, ColumnReset)] = &[
    ("status", ColumnReset::Text("exited")),
    ("is_public", ColumnReset::False),
    ("public_port", ColumnReset::Null),
    ("last_online_at", ColumnReset::Now),
];

const SERVICE: TableSpec = TableSpec {
    table: "services",
    model: "App\\Models\\Service",
    binds_server: true,
    copy: &[
        "environment_id",
        "description",
        "docker_compose_raw",
        "docker_compose",
        "destination_type",
        "connect_to_docker_network",
        "service_type",
        "is_container_label_escape_enabled",
        "compose_parsing_version",
    ],
    resets: &[("config_hash", ColumnReset::Null)],
};

const POSTGRESQL: TableSpec = TableSpec {
    table: "standalone_postgresqls",
    model: "App\\Models\\StandalonePostgresql",
    binds_server: false,
    copy: &[
        "description",
        "postgres_user",
        "postgres_password",
        "postgres_db",
        "postgres_initdb_args",
        "postgres_host_auth_method",
        "init_scripts",
        "image",
        "ports_mappings",
        "limits_memory",
        "limits_memory_swap",
        "limits_memory_swappiness",
        "limits_memory_reservation",
        "limits_cpus",
        "limits_cpuset",
        "limits_cpu_shares",
        "destination_type",
        "environment_id",
        "postgres_conf",
        "is_log_drain_enabled",
        "is_include_timestamps",
        "custom_docker_run_options",
        "enable_ssl",
        "ssl_mode",
    ],
    resets: DATABASE_RESETS,
};

const REDIS: TableSpec = TableSpec {
    table: "standalone_redis",
    model: "App\\Models\\StandaloneRedis",
    binds_server: false,
    copy: &[
        "description",
        "redis_conf",
        "image",
        "ports_mappings",
        "limits_memory",
        "limits_memory_swap",
        "limits_memory_swappiness",
        "limits_memory_reservation",
        "limits_cpus",
        "limits_cpuset",
        "limits_cpu_shares",
        "destination_type",
        "environment_id",
        "is_log_drain_enabled",
        "is_include_timestamps",
        "custom_docker_run_options",
        "enable_ssl",
    ],
    resets: DATABASE_RESETS,
};

const MYSQL: TableSpec = TableSpec {
    table: "standalone_mysqls",
    model: "App\\Models\\StandaloneMysql",
    binds_server: false,
    copy: &[
        "description",
        "mysql_root_password",
        "mysql_user",
        "mysql_password",
        "mysql_database",
        "mysql_conf",
        "image",
        "ports_mappings",
        "limits_memory",
        "limits_memory_swap",
        "limits_memory_swappiness",
        "limits_memory_reservation",
        "limits_cpus",
        "limits_cpuset",
        "limits_cpu_shares",
        "destination_type",
        "environment_id",
        "is_log_drain_enabled",
        "is_include_timestamps",
        "custom_docker_run_options",
        "enable_ssl",
        "ssl_mode",
    ],
    resets: DATABASE_RESETS,
};

const MARIADB: TableSpec = TableSpec {
    table: "standalone_mariadbs",
    model: "App\\Models\\StandaloneMariadb",
    binds_server: false,
    copy: &[
        "description",
        "mariadb_root_password",
        "mariadb_user",
        "mariadb_password",
        "mariadb_database",
        "mariadb_conf",
        "image",
        "ports_mappings",
        "limits_memory",
        "limits_memory_swap",
        "limits_memory_swappiness",
        "limits_memory_reservation",
        "limits_cpus",
        "limits_cpuset",
        "limits_cpu_shares",
        "destination_type",
        "environment_id",
        "is_log_drain_enabled",
        "custom_docker_run_options",
        "enable_ssl",
    ],
    resets: DATABASE_RESETS,
};

const MONGODB: TableSpec = TableSpec {
    table: "standalone_mongodbs",
    model: "App\\Models\\StandaloneMongodb",
    binds_server: false,
    copy: &[
        "description",
        "mongo_conf",
        "mongo_initdb_root_username",
        "mongo_initdb_root_password",
        "mongo_initdb_database",
        "image",
        "ports_mappings",
        "limits_memory",
        "limits_memory_swap",
        "limits_memory_swappiness",
        "limits_memory_reservation",
        "limits_cpus",
        "limits_cpuset",
        "limits_cpu_shares",
        "destination_type",
        "environment_id",
        "is_log_drain_enabled",
        "is_include_timestamps",
        "custom_docker_run_options",
        "enable_ssl",
        "ssl_mode",
    ],
    resets: DATABASE_RESETS,
};

const KEYDB: TableSpec = TableSpec {
    table: "standalone_keydbs",
    model: "App\\Models\\StandaloneKeydb",
    binds_server: false,
    copy: &[
        "description",
        "keydb_password",
        "keydb_conf",
        "image",
        "ports_mappings",
        "limits_memory",
        "limits_memory_swap",
        "limits_memory_swappiness",
        "limits_memory_reservation",
        "limits_cpus",
        "limits_cpuset",
        "limits_cpu_shares",
        "destination_type",
        "environment_id",
        "is_log_drain_enabled",
        "is_include_timestamps",
        "custom_docker_run_options",
        "enable_ssl",
    ],
    resets: DATABASE_RESETS,
};

const DRAGONFLY: TableSpec = TableSpec {
    table: "standalone_dragonflies",
    model: "App\\Models\\StandaloneDragonfly",
    binds_server: false,
    copy: &[
        "description",
        "dragonfly_password",
        "image",
        "ports_mappings",
        "limits_memory",
        "limits_memory_swap",
        "limits_memory_swappiness",
        "limits_memory_reservation",
        "limits_cpus",
        "limits_cpuset",
        "limits_cpu_shares",
        "destination_type",
        "environment_id",
        "is_log_drain_enabled",
        "is_include_timestamps",
        "custom_docker_run_options",
        "enable_ssl",
    ],
    resets: DATABASE_RESETS,
};

const CLICKHOUSE: TableSpec = TableSpec {
    table: "standalone_clickhouses",
    model: "App\\Models\\StandaloneClickhouse",
    binds_server: false,
    copy: &[
        "description",
        "clickhouse_admin_user",
        "clickhouse_admin_password",
        "clickhouse_db",
        "image",
        "ports_mappings",
        "limits_memory",
        "limits_memory_swap",
        "limits_memory_swappiness",
        "limits_memory_reservation",
        "limits_cpus",
        "limits_cpuset",
        "limits_cpu_shares",
        "destination_type",
        "environment_id",
        "is_log_drain_enabled",
        "is_include_timestamps",
        "custom_docker_run_options",
    ],
    resets: DATABASE_RESETS,
};

const SERVICE_APPLICATION: TableSpec = TableSpec {
    table: "service_applications",
    model: "App\\Models\\ServiceApplication",
    binds_server: false,
    copy: &[
        "name",
        "human_name",
        "description",
        "ports",
        "exposes",
        "exclude_from_status",
        "required_fqdn",
        "image",
        "is_log_drain_enabled",
        "is_include_timestamps",
        "is_gzip_enabled",
        "is_stripprefix_enabled",
    ],
    resets: &[
        ("fqdn", ColumnReset::Null),
        ("status", ColumnReset::Text("exited")),
        ("last_online_at", ColumnReset::Now),
        ("is_migrated", ColumnReset::False),
    ],
};

const SERVICE_DATABASE: TableSpec = TableSpec {
    table: "service_databases",
    model: "App\\Models\\ServiceDatabase",
    binds_server: false,
    copy: &[
        "name",
        "human_name",
        "description",
        "ports",
        "exposes",
        "exclude_from_status",
        "image",
        "is_log_drain_enabled",
        "is_include_timestamps",
    ],
    resets: &[
        ("status", ColumnReset::Text("exited")),
        ("last_online_at", ColumnReset::Now),
        ("is_migrated", ColumnReset::False),
    ],
};

impl ResourceKind {
    pub fn table_spec(self) -> &'static TableSpec {
        match self {
            ResourceKind::Service => &SERVICE,
            ResourceKind::Postgresql => &POSTGRESQL,
            ResourceKind::Redis => &REDIS,
            ResourceKind::Mysql => &MYSQL,
            ResourceKind::Mariadb => &MARIADB,
            ResourceKind::Mongodb => &MONGODB,
            ResourceKind::Keydb => &KEYDB,
            ResourceKind::Dragonfly => &DRAGONFLY,
            ResourceKind::Clickhouse => &CLICKHOUSE,
        }
    }
}

impl SubResourceKind {
    pub fn table_spec(self) -> &'static TableSpec {
        match self {
            SubResourceKind::Application => &SERVICE_APPLICATION,
            SubResourceKind::Database => &SERVICE_DATABASE,
        }
    }
}

impl OwnerKind {
    pub fn table_spec(self) -> &'static TableSpec {
        match self {
            OwnerKind::Resource(kind) => kind.table_spec(),
            OwnerKind::Sub(kind) => kind.table_spec(),
        }
    }

    pub fn model(self) -> &'static str {
        self.table_spec().model
    }
}

/// Columns that describe live state and must never be copied.
pub const RUNTIME_STATE_COLUMNS: &[&str] = &[
    "status",
    "is_public",
    "public_port",
    "last_online_at",
    "fqdn",
    "config_hash",
];

/// Double-quote a list of column names for SQL.
pub fn quoted_columns(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ")
}
