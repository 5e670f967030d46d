//! Deep copy of a resource's configuration graph under fresh identifiers.
//!
//! A clone runs in two phases. The plan phase reads the whole subgraph and
//! validates volume names without writing anything. The apply phase inserts the
//! root row, then its environment variables and volumes, then each member of a
//! service with its own variables and volumes. Every child row points at the
//! newly inserted parent.

mod mapping;

pub use mapping::{IdentifierMapping, rewrite_volume_name};

use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, Result};
use crate::identifier::IdentifierSource;
use crate::store::{ConfigStore, RootCopy, StoreError, StoreResult};
use crate::types::{
    Destination, EnvVarRecord, HostDescriptor, NewVolume, OwnerRef, ResourceDescriptor,
    ResourceKind, ResourceRecord, SubResourceRecord, VolumeRecord,
};

/// Inserts attempted per fresh identifier before giving up.
pub const MAX_IDENTIFIER_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct CloneOptions {
    /// Name of the clone. Defaults to the source name.
    pub new_name: Option<String>,
    /// Copy volume names that do not embed their owner's identifier unchanged
    /// instead of failing.
    pub allow_unmapped_volume_names: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdPair {
    pub old: String,
    pub new: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumePair {
    pub source: String,
    pub target: String,
    pub mount_path: String,
}

/// Structural record of a finished (or previewed) clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClonedResource {
    /// Row id of the clone; `None` for a preview.
    pub id: Option<i64>,
    pub uuid: String,
    pub name: String,
    pub kind: ResourceKind,
    pub source_uuid: String,
    pub sub_resources: Vec<IdPair>,
    pub volumes: Vec<VolumePair>,
    pub environment_variables: usize,
}

struct SubPlan {
    record: SubResourceRecord,
    env: Vec<EnvVarRecord>,
    volumes: Vec<VolumeRecord>,
}

struct ClonePlan {
    root: ResourceRecord,
    env: Vec<EnvVarRecord>,
    volumes: Vec<VolumeRecord>,
    subs: Vec<SubPlan>,
}

impl ClonePlan {
    fn env_count(&self) -> usize {
        self.env.len() + self.subs.iter().map(|s| s.env.len()).sum::<usize>()
    }
}

pub struct CloneEngine<'a> {
    store: &'a dyn ConfigStore,
    ids: &'a dyn IdentifierSource,
}

impl<'a> CloneEngine<'a> {
    pub fn new(store: &'a dyn ConfigStore, ids: &'a dyn IdentifierSource) -> Self {
        Self { store, ids }
    }

    /// Clone `descriptor` onto `target` through `destination`.
    pub fn clone_resource(
        &self,
        descriptor: &ResourceDescriptor,
        target: &HostDescriptor,
        destination: &Destination,
        options: &CloneOptions,
    ) -> Result<ClonedResource> {
        let plan = self.plan(descriptor, options)?;
        let root = &plan.root;
        let kind = root.kind;
        let new_name = options.new_name.clone().unwrap_or_else(|| root.name.clone());

        let (root_id, root_uuid) = self.with_fresh_identifier(kind.table_spec().table, |uuid| {
            self.store.copy_resource(
                kind,
                root.id,
                &RootCopy {
                    uuid,
                    name: &new_name,
                    server_id: target.id,
                    destination_id: destination.id,
                },
            )
        })?;
        tracing::info!(
            resource = %root.uuid,
            clone = %root_uuid,
            host = %target.name,
            "Cloned {} '{}'",
            kind.display_name(),
            root.name
        );

        let mut mapping = IdentifierMapping::new();
        mapping.insert(&root.uuid, &root_uuid);

        let root_owner = OwnerRef::resource(kind, root_id);
        self.copy_env(&plan.env, root_owner)?;
        let mut volumes =
            self.copy_volumes(&plan.volumes, &[root.uuid.as_str()], &mapping, root_owner)?;

        let mut sub_resources = Vec::with_capacity(plan.subs.len());
        for sub in &plan.subs {
            let record = &sub.record;
            let (sub_id, sub_uuid) =
                self.with_fresh_identifier(record.kind.table_spec().table, |uuid| {
                    self.store
                        .copy_sub_resource(record.kind, record.id, root_id, uuid)
                })?;
            tracing::debug!(old = %record.uuid, new = %sub_uuid, "Cloned member '{}'", record.name);
            mapping.insert(&record.uuid, &sub_uuid);
            sub_resources.push(IdPair {
                old: record.uuid.clone(),
                new: sub_uuid,
            });

            let owner = OwnerRef::sub(record.kind, sub_id);
            self.copy_env(&sub.env, owner)?;
            let lineage = [record.uuid.as_str(), root.uuid.as_str()];
            volumes.extend(self.copy_volumes(&sub.volumes, &lineage, &mapping, owner)?);
        }

        Ok(ClonedResource {
            id: Some(root_id),
            uuid: root_uuid,
            name: new_name,
            kind,
            source_uuid: root.uuid.clone(),
            sub_resources,
            volumes,
            environment_variables: plan.env_count(),
        })
    }

    /// Compute the identifiers and volume names a clone would produce without
    /// writing anything.
    pub fn preview(
        &self,
        descriptor: &ResourceDescriptor,
        options: &CloneOptions,
    ) -> Result<ClonedResource> {
        let plan = self.plan(descriptor, options)?;
        let root = &plan.root;

        let mut mapping = IdentifierMapping::new();
        let root_uuid = self.ids.next_identifier();
        mapping.insert(&root.uuid, &root_uuid);

        let mut sub_resources = Vec::with_capacity(plan.subs.len());
        for sub in &plan.subs {
            let new = self.ids.next_identifier();
            mapping.insert(&sub.record.uuid, &new);
            sub_resources.push(IdPair {
                old: sub.record.uuid.clone(),
                new,
            });
        }

        let mut volumes: Vec<VolumePair> = plan
            .volumes
            .iter()
            .map(|v| volume_pair(v, &[root.uuid.as_str()], &mapping))
            .collect();
        for sub in &plan.subs {
            let lineage = [sub.record.uuid.as_str(), root.uuid.as_str()];
            volumes.extend(sub.volumes.iter().map(|v| volume_pair(v, &lineage, &mapping)));
        }

        Ok(ClonedResource {
            id: None,
            uuid: root_uuid,
            name: options.new_name.clone().unwrap_or_else(|| root.name.clone()),
            kind: root.kind,
            source_uuid: root.uuid.clone(),
            sub_resources,
            volumes,
            environment_variables: plan.env_count(),
        })
    }

    /// Read the source subgraph and validate volume names. No writes.
    fn plan(&self, descriptor: &ResourceDescriptor, options: &CloneOptions) -> Result<ClonePlan> {
        let root = self
            .store
            .find_resource(descriptor.kind(), descriptor.uuid())?
            .ok_or_else(|| MigrationError::not_found("resource", descriptor.uuid()))?;

        let root_owner = OwnerRef::resource(root.kind, root.id);
        let env = self.store.environment_variables(root_owner)?;
        let volumes = self.store.volumes(root_owner)?;
        check_volume_names(&volumes, &[root.uuid.as_str()], options)?;

        let mut subs = Vec::new();
        if root.kind == ResourceKind::Service {
            for record in self.store.sub_resources(root.id)? {
                let owner = OwnerRef::sub(record.kind, record.id);
                let env = self.store.environment_variables(owner)?;
                let volumes = self.store.volumes(owner)?;
                let lineage = [record.uuid.as_str(), root.uuid.as_str()];
                check_volume_names(&volumes, &lineage, options)?;
                subs.push(SubPlan {
                    record,
                    env,
                    volumes,
                });
            }
        }

        Ok(ClonePlan {
            root,
            env,
            volumes,
            subs,
        })
    }

    fn copy_env(&self, vars: &[EnvVarRecord], owner: OwnerRef) -> Result<()> {
        for var in vars {
            // Every variable row gets its own identifier.
            self.with_fresh_identifier(crate::schema::ENV_VARS_TABLE, |uuid| {
                self.store.copy_environment_variable(var.id, owner, uuid)
            })?;
        }
        Ok(())
    }

    fn copy_volumes(
        &self,
        volumes: &[VolumeRecord],
        lineage: &[&str],
        mapping: &IdentifierMapping,
        owner: OwnerRef,
    ) -> Result<Vec<VolumePair>> {
        let mut pairs = Vec::with_capacity(volumes.len());
        for volume in volumes {
            let pair = volume_pair(volume, lineage, mapping);
            self.store
                .insert_volume(
                    owner,
                    &NewVolume {
                        name: pair.target.clone(),
                        mount_path: volume.mount_path.clone(),
                        host_path: volume.host_path.clone(),
                    },
                )
                .map_err(|e| clone_failure("volume", e))?;
            tracing::debug!(source = %pair.source, target = %pair.target, "Cloned volume");
            pairs.push(pair);
        }
        Ok(pairs)
    }

    /// Run `insert` with a fresh identifier, drawing a new one on every
    /// uniqueness violation.
    fn with_fresh_identifier(
        &self,
        table: &'static str,
        mut insert: impl FnMut(&str) -> StoreResult<i64>,
    ) -> Result<(i64, String)> {
        for attempt in 1..=MAX_IDENTIFIER_ATTEMPTS {
            let uuid = self.ids.next_identifier();
            match insert(&uuid) {
                Ok(id) => return Ok((id, uuid)),
                Err(StoreError::UniqueViolation { .. }) => {
                    tracing::warn!(
                        "Identifier collision in {} (attempt {}/{}), retrying",
                        table,
                        attempt,
                        MAX_IDENTIFIER_ATTEMPTS
                    );
                }
                Err(e) => return Err(clone_failure(table, e)),
            }
        }
        Err(MigrationError::CloneFailure(format!(
            "no unique identifier for {table} after {MAX_IDENTIFIER_ATTEMPTS} attempts"
        )))
    }
}

/// `lineage` is the owner's identifier followed by its ancestors'.
fn volume_pair(volume: &VolumeRecord, lineage: &[&str], mapping: &IdentifierMapping) -> VolumePair {
    VolumePair {
        source: volume.name.clone(),
        target: mapping
            .rewrite_any(&volume.name, lineage)
            .unwrap_or_else(|| volume.name.clone()),
        mount_path: volume.mount_path.clone(),
    }
}

fn check_volume_names(
    volumes: &[VolumeRecord],
    lineage: &[&str],
    options: &CloneOptions,
) -> Result<()> {
    for volume in volumes {
        if lineage.iter().any(|id| !id.is_empty() && volume.name.contains(*id)) {
            continue;
        }
        let identifiers = lineage.join("', '");
        if options.allow_unmapped_volume_names {
            tracing::warn!(
                volume = %volume.name,
                "Volume name contains none of '{}'; copying it unchanged",
                identifiers
            );
        } else {
            return Err(MigrationError::CloneFailure(format!(
                "volume '{}' does not contain its owner identifier '{}'; \
                 set migration.allow_unmapped_volume_names to copy it unchanged",
                volume.name, identifiers
            )));
        }
    }
    Ok(())
}

fn clone_failure(what: &str, err: StoreError) -> MigrationError {
    MigrationError::CloneFailure(format!("{what}: {err}"))
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::store::MemoryStore;
    use crate::types::SubResourceKind;

    struct Counter(Cell<u32>);

    impl IdentifierSource for Counter {
        fn next_identifier(&self) -> String {
            let n = self.0.get() + 1;
            self.0.set(n);
            format!("new{n:03}")
        }
    }

    fn fixture() -> (MemoryStore, HostDescriptor, Destination) {
        let store = MemoryStore::new();
        let a = store.add_host("host-a", "alpha", "10.0.0.1");
        store.add_destination(a);
        let b = store.add_host("host-b", "beta", "10.0.0.2");
        store.add_destination(b);
        let target = store.find_host("beta").unwrap().unwrap();
        let destination = store.find_destination(target.id).unwrap().unwrap();
        (store, target, destination)
    }

    #[test]
    fn preview_writes_nothing() {
        let (store, _, _) = fixture();
        let a = store.find_host("alpha").unwrap().unwrap();
        let id = store.add_resource(ResourceKind::Redis, "old1", "cache", a.id);
        store.add_volume(OwnerRef::resource(ResourceKind::Redis, id), "old1-data", "/data");
        let before = store.rows("standalone_redis").len();

        let ids = Counter(Cell::new(0));
        let engine = CloneEngine::new(&store, &ids);
        let descriptor = crate::locate::Locator::new(&store).locate("cache", None).unwrap();
        let preview = engine.preview(&descriptor, &CloneOptions::default()).unwrap();

        assert_eq!(preview.id, None);
        assert_eq!(preview.volumes[0].target, "new001-data");
        assert_eq!(store.rows("standalone_redis").len(), before);
        assert_eq!(store.rows("local_persistent_volumes").len(), 1);
    }

    #[test]
    fn unmapped_volume_name_fails_before_any_write() {
        let (store, target, destination) = fixture();
        let a = store.find_host("alpha").unwrap().unwrap();
        let svc = store.add_resource(ResourceKind::Service, "svc1", "blog", a.id);
        let app = store.add_sub_resource(SubResourceKind::Application, svc, "app1", "ghost");
        store.add_volume(OwnerRef::sub(SubResourceKind::Application, app), "renamed-by-hand", "/x");

        let ids = Counter(Cell::new(0));
        let engine = CloneEngine::new(&store, &ids);
        let descriptor = crate::locate::Locator::new(&store).locate("blog", None).unwrap();
        let err = engine
            .clone_resource(&descriptor, &target, &destination, &CloneOptions::default())
            .unwrap_err();

        assert!(matches!(err, MigrationError::CloneFailure(_)));
        assert_eq!(store.rows("services").len(), 1);
        assert_eq!(store.rows("service_applications").len(), 1);
    }

    #[test]
    fn unmapped_volume_name_copied_when_allowed() {
        let (store, target, destination) = fixture();
        let a = store.find_host("alpha").unwrap().unwrap();
        let id = store.add_resource(ResourceKind::Mysql, "my1", "db", a.id);
        store.add_volume(OwnerRef::resource(ResourceKind::Mysql, id), "mysql-data", "/var/lib/mysql");

        let ids = Counter(Cell::new(0));
        let engine = CloneEngine::new(&store, &ids);
        let descriptor = crate::locate::Locator::new(&store).locate("db", None).unwrap();
        let options = CloneOptions {
            allow_unmapped_volume_names: true,
            ..CloneOptions::default()
        };
        let cloned = engine
            .clone_resource(&descriptor, &target, &destination, &options)
            .unwrap();

        assert_eq!(cloned.volumes[0].target, "mysql-data");
    }
}
