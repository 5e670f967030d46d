use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;
use tokio::runtime::Runtime;

use super::{PlatformApi, PlatformHost, PlatformResource, action_collection};
use crate::error::{MigrationError, Result};
use crate::types::ResourceKind;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bearer-token client for the platform API, driven on a private runtime.
pub struct HttpPlatform {
    runtime: Runtime,
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpPlatform {
    pub fn new(base_url: &str, token: &str) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to create tokio runtime")?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("relocate/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            runtime,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        self.runtime
            .block_on(async {
                let response = self
                    .client
                    .get(&url)
                    .bearer_auth(&self.token)
                    .header(reqwest::header::ACCEPT, "application/json")
                    .send()
                    .await
                    .with_context(|| format!("Failed to reach {url}"))?;
                if !response.status().is_success() {
                    anyhow::bail!("HTTP {} from {}", response.status(), url);
                }
                response
                    .json::<T>()
                    .await
                    .with_context(|| format!("Failed to parse response from {url}"))
            })
            .map_err(|e| MigrationError::Connectivity(format!("{e:#}")))
    }

    fn action(&self, kind: ResourceKind, uuid: &str, action: &str) -> Result<()> {
        let path = format!("{}/{}/{}", action_collection(kind), uuid, action);
        let _: serde_json::Value = self.get_json(&path)?;
        tracing::info!(resource = %uuid, "Requested {} via platform API", action);
        Ok(())
    }
}

impl PlatformApi for HttpPlatform {
    fn list_hosts(&self) -> Result<Vec<PlatformHost>> {
        self.get_json("servers")
    }

    fn list_services(&self) -> Result<Vec<PlatformResource>> {
        self.get_json("services")
    }

    fn list_applications(&self) -> Result<Vec<PlatformResource>> {
        self.get_json("applications")
    }

    fn list_databases(&self) -> Result<Vec<PlatformResource>> {
        self.get_json("databases")
    }

    fn get_resource(&self, uuid: &str) -> Result<Option<PlatformResource>> {
        let resources: Vec<PlatformResource> = self.get_json("resources")?;
        Ok(resources.into_iter().find(|r| r.uuid == uuid))
    }

    fn stop(&self, kind: ResourceKind, uuid: &str) -> Result<()> {
        self.action(kind, uuid, "stop")
    }

    fn start(&self, kind: ResourceKind, uuid: &str) -> Result<()> {
        self.action(kind, uuid, "start")
    }
}
