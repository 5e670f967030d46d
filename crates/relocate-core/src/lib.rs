//! Relocate Core Library
//!
//! Moves deployed resources (composite services and standalone databases)
//! between hosts of a container platform: locate the resource, deep-clone its
//! configuration rows under fresh identifiers, copy its volume data, and retire
//! the original under a marked name.

pub mod batch;
pub mod clone;
pub mod config;
pub mod context;
pub mod error;
pub mod identifier;
pub mod inventory;
pub mod locate;
pub mod migrate;
pub mod platform;
pub mod preflight;
pub mod remote;
pub mod schema;
pub mod store;
pub mod transfer;
pub mod types;

/// Re-exports of commonly used types
pub mod prelude {
    // Errors
    pub use crate::error::{MigrationError, Result};

    // Domain
    pub use crate::types::{
        HostDescriptor, OwnedVolume, ResourceDescriptor, ResourceKind, SubResourceKind,
        VolumeOwner,
    };

    // Engine
    pub use crate::clone::{CloneEngine, CloneOptions, ClonedResource};
    pub use crate::locate::Locator;
    pub use crate::migrate::{
        MigrationOptions, MigrationReport, MigrationStage, Migrator, MoveRequest,
        VolumeMoveReport, VolumeMoveRequest,
    };
    pub use crate::preflight::{CheckOutcome, PreflightReport, SpaceCheck};

    // Batch
    pub use crate::batch::{BatchOptions, BatchSummary, BatchTask, run_batch};

    // Collaborators
    pub use crate::identifier::{IdentifierSource, RandomIdentifiers};
    pub use crate::platform::PlatformApi;
    pub use crate::remote::{RemoteSession, RemoteShell};
    pub use crate::store::{ConfigStore, MemoryStore, StoreConnector};
    pub use crate::transfer::{CommandRunner, TransferMode};

    // Configuration
    pub use crate::config::{ConfigFile, RelocateConfig};
    pub use crate::context::AppContext;
}
