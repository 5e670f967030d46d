//! Error taxonomy of the migration engine.

use crate::preflight::PreflightReport;
use crate::store::StoreError;

pub type Result<T, E = MigrationError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("{what} not found: {identifier}")]
    NotFound {
        what: &'static str,
        identifier: String,
    },

    #[error(
        "insufficient disk space on target: required {required} bytes ({}, including 10% margin), available {available} bytes ({})",
        human(.required),
        human(.available)
    )]
    InsufficientSpace { required: u64, available: u64 },

    #[error("connectivity failure: {0}")]
    Connectivity(String),

    #[error("'{tool}' is not installed on {host}")]
    ToolMissing { tool: String, host: String },

    #[error("clone failed: {0}")]
    CloneFailure(String),

    #[error("unsupported resource kind: {0}")]
    UnsupportedKind(String),

    #[error("transfer of volume {volume} failed: {reason}")]
    TransferFailure { volume: String, reason: String },

    #[error(
        "retiring original resource {name} failed after the clone was created: {reason}"
    )]
    RetireFailure { name: String, reason: String },

    #[error("preflight checks failed: {}", .0.failure_summary())]
    PreflightFailed(PreflightReport),

    #[error("invalid volume name '{0}'")]
    InvalidVolumeName(String),

    #[error("invalid batch task: {0}")]
    InvalidTask(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("migration journal error: {0}")]
    Journal(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn human(bytes: &u64) -> String {
    crate::preflight::format_bytes(*bytes)
}

impl MigrationError {
    pub fn not_found(what: &'static str, identifier: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            identifier: identifier.into(),
        }
    }

    pub fn transfer(volume: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransferFailure {
            volume: volume.into(),
            reason: reason.into(),
        }
    }
}
