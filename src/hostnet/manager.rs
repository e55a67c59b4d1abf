use std::sync::Arc;

use ipnet::Ipv4Net;

use crate::config::HOSTNET_PREFIX;
use crate::error::{GangplankError, GangplankResult};
use crate::hostnet::api::HostNetApi;
use crate::hostnet::types::{HostNetwork, HostSubnet};

/// Identity of a managed network: the orchestrator coordinates and their
/// encoding in the host network registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkMeta {
    pub tenant: String,
    pub network: String,
    pub subnet_cidr: String,
}

impl NetworkMeta {
    /// All three fields must be non-empty and the CIDR canonical.
    pub fn new(tenant: &str, network: &str, subnet_cidr: &str) -> GangplankResult<Self> {
        if tenant.is_empty() || network.is_empty() || subnet_cidr.is_empty() {
            return Err(GangplankError::msg(
                "network meta requires tenant, network and subnet CIDR",
            ));
        }
        let net: Ipv4Net = subnet_cidr.parse()?;
        if net != net.trunc() {
            return Err(GangplankError::msg(format!(
                "subnet CIDR {} is not canonical",
                subnet_cidr
            )));
        }
        Ok(NetworkMeta {
            tenant: tenant.to_string(),
            network: network.to_string(),
            subnet_cidr: subnet_cidr.to_string(),
        })
    }
}

/// Encode the composite host network name for a managed network.
pub fn encode_network_name(tenant: &str, network: &str, subnet_cidr: &str) -> String {
    format!("{}:{}:{}:{}", HOSTNET_PREFIX, tenant, network, subnet_cidr)
}

/// Inverse of encode_network_name. Rejects any name that is not exactly
/// four colon-separated fields starting with the reserved prefix.
pub fn decode_network_name(name: &str) -> Option<NetworkMeta> {
    let fields: Vec<&str> = name.split(':').collect();
    if fields.len() != 4 || fields[0] != HOSTNET_PREFIX {
        return None;
    }
    NetworkMeta::new(fields[1], fields[2], fields[3]).ok()
}

/// Namespaced registry of the host networks owned by the driver.
pub struct HostNetManager {
    api: Arc<dyn HostNetApi>,
}

impl HostNetManager {
    pub fn new(api: Arc<dyn HostNetApi>) -> Self {
        HostNetManager { api }
    }

    pub async fn create_network(
        &self,
        adapter: &str,
        tenant: &str,
        network: &str,
        subnet_cidr: &str,
        default_gateway: &str,
    ) -> GangplankResult<HostNetwork> {
        let name = encode_network_name(tenant, network, subnet_cidr);

        if self.api.get_network_by_name(&name).await?.is_some() {
            return Err(GangplankError::AlreadyExists(format!("host network {}", name)));
        }

        let config = HostNetwork {
            name,
            network_type: "transparent".to_string(),
            network_adapter_name: adapter.to_string(),
            subnets: vec![HostSubnet {
                address_prefix: subnet_cidr.to_string(),
                gateway_address: default_gateway.to_string(),
            }],
            ..Default::default()
        };

        self.api.create_network(&config).await
    }

    pub async fn get_network(
        &self,
        tenant: &str,
        network: &str,
        subnet_cidr: &str,
    ) -> GangplankResult<HostNetwork> {
        let name = encode_network_name(tenant, network, subnet_cidr);
        self.api
            .get_network_by_name(&name)
            .await?
            .ok_or_else(|| GangplankError::NotFound(format!("host network {}", name)))
    }

    pub async fn delete_network(
        &self,
        tenant: &str,
        network: &str,
        subnet_cidr: &str,
    ) -> GangplankResult<()> {
        let net = self.get_network(tenant, network, subnet_cidr).await?;

        let endpoints = self.api.list_endpoints().await?;
        if endpoints.iter().any(|ep| ep.virtual_network_name == net.name) {
            return Err(GangplankError::InUse(format!(
                "host network {} has active endpoints",
                net.name
            )));
        }

        self.api.delete_network(&net.id).await
    }

    /// All host networks owned by the driver, i.e. those whose name decodes
    /// to exactly four fields with the reserved prefix.
    pub async fn list_networks(&self) -> GangplankResult<Vec<HostNetwork>> {
        let networks = self.api.list_networks().await?;
        Ok(networks
            .into_iter()
            .filter(|net| decode_network_name(&net.name).is_some())
            .collect())
    }
}
