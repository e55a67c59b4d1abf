use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::StatusCode;

use crate::adapter::wait_for_adapter;
use crate::config::{DriverConfig, TRANSPARENT_INTERFACE_NAME};
use crate::error::{GangplankError, GangplankResult};
use crate::hostnet::types::{HostEndpoint, HostNetwork};

/// Typed wrapper over the host network control API. Implementations hide
/// the transport so the registry and the driver can be tested against an
/// in-memory host stack.
#[async_trait]
pub trait HostNetApi: Send + Sync {
    /// Create a host network and wait for the bound adapter to reacquire
    /// IPv4 before returning.
    async fn create_network(&self, config: &HostNetwork) -> GangplankResult<HostNetwork>;
    async fn get_network(&self, id: &str) -> GangplankResult<HostNetwork>;
    async fn get_network_by_name(&self, name: &str) -> GangplankResult<Option<HostNetwork>>;
    async fn list_networks(&self) -> GangplankResult<Vec<HostNetwork>>;
    /// Delete a host network. When no remaining network shares its adapter
    /// the vswitch goes away too, so the adapter is waited for.
    async fn delete_network(&self, id: &str) -> GangplankResult<()>;

    async fn create_endpoint(&self, config: &HostEndpoint) -> GangplankResult<String>;
    async fn get_endpoint(&self, id: &str) -> GangplankResult<HostEndpoint>;
    async fn get_endpoint_by_name(&self, name: &str) -> GangplankResult<Option<HostEndpoint>>;
    async fn list_endpoints(&self) -> GangplankResult<Vec<HostEndpoint>>;
    async fn list_network_endpoints(&self, network_id: &str)
        -> GangplankResult<Vec<HostEndpoint>>;
    async fn delete_endpoint(&self, id: &str) -> GangplankResult<()>;
}

/// HTTP client for the host network control socket.
pub struct HostNetClient {
    client: reqwest::Client,
    base_url: String,
    adapter_timeout: Duration,
    adapter_poll: Duration,
}

impl HostNetClient {
    pub fn new(base_url: &str, config: &DriverConfig) -> Self {
        HostNetClient {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            adapter_timeout: config.adapter_timeout,
            adapter_poll: config.adapter_poll,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn wait_for_adapter(&self, name: &str) -> GangplankResult<()> {
        wait_for_adapter(name, self.adapter_timeout, self.adapter_poll).await
    }
}

#[async_trait]
impl HostNetApi for HostNetClient {
    async fn create_network(&self, config: &HostNetwork) -> GangplankResult<HostNetwork> {
        info!("Creating host network {}", config.name);
        debug!("Config: {}", serde_json::to_string(config)?);

        let response = self
            .client
            .post(self.url("/networks"))
            .json(config)
            .send()
            .await?
            .error_for_status()?;
        let created: HostNetwork = response.json().await?;

        // Creating a network may create the vswitch, which deconfigures the
        // bound adapter while the transparent interface comes up.
        self.wait_for_adapter(TRANSPARENT_INTERFACE_NAME).await?;

        info!("Created host network with ID: {}", created.id);
        Ok(created)
    }

    async fn get_network(&self, id: &str) -> GangplankResult<HostNetwork> {
        debug!("Getting host network {}", id);
        let response = self
            .client
            .get(self.url(&format!("/networks/{}", id)))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(GangplankError::NotFound(format!("host network {}", id)));
        }
        Ok(response.error_for_status()?.json().await?)
    }

    async fn get_network_by_name(&self, name: &str) -> GangplankResult<Option<HostNetwork>> {
        debug!("Getting host network by name: {}", name);
        let networks = self.list_networks().await?;
        Ok(networks.into_iter().find(|net| net.name == name))
    }

    async fn list_networks(&self) -> GangplankResult<Vec<HostNetwork>> {
        debug!("Listing host networks");
        let response = self
            .client
            .get(self.url("/networks"))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn delete_network(&self, id: &str) -> GangplankResult<()> {
        info!("Deleting host network {}", id);

        let to_delete = self.get_network(id).await?;
        let networks = self.list_networks().await?;
        let adapter_still_in_use = networks.iter().any(|net| {
            net.id != to_delete.id
                && net.network_adapter_name == to_delete.network_adapter_name
        });

        self.client
            .delete(self.url(&format!("/networks/{}", id)))
            .send()
            .await?
            .error_for_status()?;

        if !adapter_still_in_use {
            // The last network on an adapter takes the vswitch down with it
            // and the adapter loses connectivity until it reacquires IPv4.
            self.wait_for_adapter(&to_delete.network_adapter_name).await?;
        }
        Ok(())
    }

    async fn create_endpoint(&self, config: &HostEndpoint) -> GangplankResult<String> {
        info!("Creating host endpoint {}", config.name);
        debug!("Config: {}", serde_json::to_string(config)?);

        let response = self
            .client
            .post(self.url("/endpoints"))
            .json(config)
            .send()
            .await?
            .error_for_status()?;
        let created: HostEndpoint = response.json().await?;

        info!("Created host endpoint with ID: {}", created.id);
        Ok(created.id)
    }

    async fn get_endpoint(&self, id: &str) -> GangplankResult<HostEndpoint> {
        debug!("Getting host endpoint {}", id);
        let response = self
            .client
            .get(self.url(&format!("/endpoints/{}", id)))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(GangplankError::NotFound(format!("host endpoint {}", id)));
        }
        Ok(response.error_for_status()?.json().await?)
    }

    async fn get_endpoint_by_name(&self, name: &str) -> GangplankResult<Option<HostEndpoint>> {
        debug!("Getting host endpoint by name: {}", name);
        let endpoints = self.list_endpoints().await?;
        Ok(endpoints.into_iter().find(|ep| ep.name == name))
    }

    async fn list_endpoints(&self) -> GangplankResult<Vec<HostEndpoint>> {
        let response = self
            .client
            .get(self.url("/endpoints"))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn list_network_endpoints(
        &self,
        network_id: &str,
    ) -> GangplankResult<Vec<HostEndpoint>> {
        let endpoints = self.list_endpoints().await?;
        Ok(endpoints
            .into_iter()
            .filter(|ep| ep.virtual_network == network_id)
            .collect())
    }

    async fn delete_endpoint(&self, id: &str) -> GangplankResult<()> {
        info!("Deleting host endpoint {}", id);
        self.client
            .delete(self.url(&format!("/endpoints/{}", id)))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
