//! Resolution of names and identifiers to store records.
//!
//! Resources are probed kind by kind and the first hit wins. Matches are never
//! aggregated across kinds, so a name shared by a service and a database
//! resolves to whichever comes first in the probe order.

use crate::error::{MigrationError, Result};
use crate::store::ConfigStore;
use crate::types::{
    Destination, HostDescriptor, OwnedVolume, OwnerRef, ResourceDescriptor, ResourceKind,
    ResourceRecord, SubResourceKind, VolumeOwner,
};

pub struct Locator<'s> {
    store: &'s dyn ConfigStore,
}

impl<'s> Locator<'s> {
    pub fn new(store: &'s dyn ConfigStore) -> Self {
        Self { store }
    }

    /// Probe every kind, `expected` first, and stop at the first match.
    pub fn find_resource(
        &self,
        identifier: &str,
        expected: Option<ResourceKind>,
    ) -> Result<Option<ResourceRecord>> {
        for kind in ResourceKind::probe_order(expected) {
            if let Some(record) = self.store.find_resource(kind, identifier)? {
                tracing::debug!(
                    resource = %record.uuid,
                    kind = %kind,
                    "Resolved '{}'",
                    identifier
                );
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Resolve a resource with its sub-resources and volumes.
    pub fn locate(
        &self,
        identifier: &str,
        expected: Option<ResourceKind>,
    ) -> Result<ResourceDescriptor> {
        let record = self
            .find_resource(identifier, expected)?
            .ok_or_else(|| MigrationError::not_found("resource", identifier))?;
        self.describe(record)
    }

    pub fn describe(&self, record: ResourceRecord) -> Result<ResourceDescriptor> {
        let sub_resources = if record.kind == ResourceKind::Service {
            self.store.sub_resources(record.id)?
        } else {
            Vec::new()
        };
        let volumes = self.volumes_of(&record)?;
        Ok(ResourceDescriptor {
            record,
            sub_resources,
            volumes,
        })
    }

    /// Every volume of the resource and its members, labelled with the owner.
    pub fn volumes_of(&self, record: &ResourceRecord) -> Result<Vec<OwnedVolume>> {
        let mut volumes: Vec<OwnedVolume> = self
            .store
            .volumes(OwnerRef::resource(record.kind, record.id))?
            .into_iter()
            .map(|volume| OwnedVolume {
                volume,
                owner_uuid: record.uuid.clone(),
                owner: VolumeOwner::Root,
            })
            .collect();

        if record.kind == ResourceKind::Service {
            for sub in self.store.sub_resources(record.id)? {
                let owner = match sub.kind {
                    SubResourceKind::Application => VolumeOwner::Application(sub.name.clone()),
                    SubResourceKind::Database => VolumeOwner::Database(sub.name.clone()),
                };
                for volume in self.store.volumes(OwnerRef::sub(sub.kind, sub.id))? {
                    volumes.push(OwnedVolume {
                        volume,
                        owner_uuid: sub.uuid.clone(),
                        owner: owner.clone(),
                    });
                }
            }
        }
        Ok(volumes)
    }

    pub fn find_host(&self, identifier: &str) -> Result<Option<HostDescriptor>> {
        Ok(self.store.find_host(identifier)?)
    }

    pub fn host(&self, identifier: &str) -> Result<HostDescriptor> {
        self.find_host(identifier)?
            .ok_or_else(|| MigrationError::not_found("host", identifier))
    }

    pub fn destination(&self, host: &HostDescriptor) -> Result<Destination> {
        self.store
            .find_destination(host.id)?
            .ok_or_else(|| MigrationError::not_found("destination on host", host.name.clone()))
    }
}
