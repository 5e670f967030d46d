//! Read-only listing of what the platform manages.

use serde::Serialize;

use crate::error::{MigrationError, Result};
use crate::platform::{PlatformApi, PlatformHost, PlatformResource};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Inventory {
    pub hosts: Vec<PlatformHost>,
    pub services: Vec<PlatformResource>,
    pub applications: Vec<PlatformResource>,
    pub databases: Vec<PlatformResource>,
    /// Host the resource lists were filtered to, if any.
    pub filter: Option<PlatformHost>,
}

impl Inventory {
    /// Name of the host a resource is bound to.
    pub fn host_name(&self, resource: &PlatformResource) -> Option<&str> {
        let server_id = resource.server_id?;
        self.hosts
            .iter()
            .find(|h| h.id == Some(server_id))
            .map(|h| h.name.as_str())
    }

    pub fn resource_count(&self) -> usize {
        self.services.len() + self.applications.len() + self.databases.len()
    }
}

/// Fetch every list, keeping only resources on `host_filter` if given.
pub fn collect(api: &dyn PlatformApi, host_filter: Option<&str>) -> Result<Inventory> {
    let hosts = api.list_hosts()?;
    let filter = match host_filter {
        Some(identifier) => Some(
            hosts
                .iter()
                .find(|h| h.matches(identifier))
                .cloned()
                .ok_or_else(|| MigrationError::not_found("host", identifier))?,
        ),
        None => None,
    };

    let keep = |resources: Vec<PlatformResource>| -> Vec<PlatformResource> {
        match &filter {
            Some(host) => resources
                .into_iter()
                .filter(|r| host.id.is_some() && r.server_id == host.id)
                .collect(),
            None => resources,
        }
    };

    let services = keep(api.list_services()?);
    let applications = keep(api.list_applications()?);
    let databases = keep(api.list_databases()?);
    tracing::debug!(
        "Inventory: {} host(s), {} service(s), {} application(s), {} database(s)",
        hosts.len(),
        services.len(),
        applications.len(),
        databases.len()
    );

    Ok(Inventory {
        hosts,
        services,
        applications,
        databases,
        filter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceKind;

    struct Api;

    fn host(id: i64, name: &str) -> PlatformHost {
        PlatformHost {
            id: Some(id),
            uuid: format!("{name}-uuid"),
            name: name.into(),
            ip: "10.0.0.1".into(),
        }
    }

    fn resource(name: &str, server_id: i64) -> PlatformResource {
        PlatformResource {
            uuid: format!("{name}-uuid"),
            name: name.into(),
            status: Some("running".into()),
            server_id: Some(server_id),
            resource_type: None,
            persistent_storages: Vec::new(),
        }
    }

    impl PlatformApi for Api {
        fn list_hosts(&self) -> Result<Vec<PlatformHost>> {
            Ok(vec![host(1, "alpha"), host(2, "beta")])
        }

        fn list_services(&self) -> Result<Vec<PlatformResource>> {
            Ok(vec![resource("web", 1), resource("queue", 2)])
        }

        fn list_applications(&self) -> Result<Vec<PlatformResource>> {
            Ok(vec![resource("site", 2)])
        }

        fn list_databases(&self) -> Result<Vec<PlatformResource>> {
            Ok(vec![resource("pg", 1)])
        }

        fn get_resource(&self, _uuid: &str) -> Result<Option<PlatformResource>> {
            Ok(None)
        }

        fn stop(&self, _kind: ResourceKind, _uuid: &str) -> Result<()> {
            Ok(())
        }

        fn start(&self, _kind: ResourceKind, _uuid: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn unfiltered_lists_everything() {
        let inventory = collect(&Api, None).unwrap();
        assert_eq!(inventory.hosts.len(), 2);
        assert_eq!(inventory.resource_count(), 4);
        assert_eq!(inventory.host_name(&inventory.services[1]), Some("beta"));
    }

    #[test]
    fn filter_by_host_name_or_uuid() {
        let inventory = collect(&Api, Some("alpha")).unwrap();
        assert_eq!(inventory.services.len(), 1);
        assert_eq!(inventory.services[0].name, "web");
        assert!(inventory.applications.is_empty());
        assert_eq!(inventory.databases.len(), 1);

        let by_uuid = collect(&Api, Some("beta-uuid")).unwrap();
        assert_eq!(by_uuid.applications.len(), 1);
    }

    #[test]
    fn unknown_filter_host_is_not_found() {
        assert!(matches!(
            collect(&Api, Some("gamma")),
            Err(MigrationError::NotFound { what: "host", .. })
        ));
    }
}
