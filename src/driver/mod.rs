// Implements the libnetwork remote-driver protocol and composes the three
// control planes (runtime, orchestrator, host stack) per request.

pub mod messages;
pub mod server;

use std::str::FromStr;
use std::sync::Arc;

use log::{debug, info, warn};
use macaddr::MacAddr6;

use crate::agent::{PortAddRequest, PortAgent};
use crate::config::DriverConfig;
use crate::error::{GangplankError, GangplankResult};
use crate::exec::Shell;
use crate::extension::ExtensionManager;
use crate::hostnet::api::HostNetApi;
use crate::hostnet::manager::{decode_network_name, HostNetManager, NetworkMeta};
use crate::hostnet::types::{HostEndpoint, HostNetwork, HostSubnet};
use crate::orch::client::Controller;
use crate::orch::types::KIND_VIRTUAL_MACHINE;
use crate::runtime::RuntimeApi;
use self::messages::*;

use self::server::ServeHandle;

/// State shared with the request handlers. Holds no mutable driver state;
/// reconciliation reads are performed fresh on every request.
pub struct DriverCore {
    pub config: DriverConfig,
    controller: Controller,
    manager: HostNetManager,
    hostnet: Arc<dyn HostNetApi>,
    runtime: Arc<dyn RuntimeApi>,
    extension: ExtensionManager,
    agent: PortAgent,
}

/// The driver. Owned by the supervisor for the process lifetime; the pipe
/// server borrows the core for the duration of each request.
pub struct Driver {
    pub(crate) core: Arc<DriverCore>,
    serve: Option<ServeHandle>,
}

impl DriverCore {
    pub fn new(
        config: DriverConfig,
        controller: Controller,
        hostnet: Arc<dyn HostNetApi>,
        runtime: Arc<dyn RuntimeApi>,
        shell: Arc<dyn Shell>,
        agent: PortAgent,
    ) -> Self {
        DriverCore {
            manager: HostNetManager::new(hostnet.clone()),
            extension: ExtensionManager::new(shell),
            config,
            controller,
            hostnet,
            runtime,
            agent,
        }
    }

    pub fn get_capabilities(&self) -> CapabilitiesResponse {
        debug!("=== GetCapabilities");
        CapabilitiesResponse {
            scope: "local".to_string(),
        }
    }

    pub async fn create_network(&self, req: CreateNetworkRequest) -> GangplankResult<()> {
        debug!("=== CreateNetwork {}", req.network_id);

        let generic = req
            .options
            .get(GENERIC_OPTIONS_KEY)
            .and_then(|value| value.as_object())
            .ok_or_else(|| GangplankError::BadRequest("generic options missing".to_string()))?;

        let tenant = generic
            .get("tenant")
            .and_then(|value| value.as_str())
            .ok_or_else(|| GangplankError::BadRequest("tenant not specified".to_string()))?;
        let network_name = generic
            .get("network")
            .and_then(|value| value.as_str())
            .ok_or_else(|| {
                GangplankError::BadRequest("network name not specified".to_string())
            })?;

        // the pool is a subnet already in CIDR format
        let pool = req
            .ipv4_data
            .first()
            .map(|data| data.pool.as_str())
            .ok_or_else(|| GangplankError::BadRequest("IPv4 pool missing".to_string()))?;

        let network = self.controller.get_network(tenant, network_name).await?;
        info!("Got virtual network {}", network.name());

        let ipam = self.controller.get_ipam_subnet(&network, pool)?;
        let subnet_cidr = ipam.cidr();

        let gateway = self
            .controller
            .get_default_gateway(&ipam)
            .map_err(|_| GangplankError::NoGateway)?;

        self.manager
            .create_network(&self.config.adapter, tenant, network_name, &subnet_cidr, &gateway)
            .await?;
        Ok(())
    }

    pub async fn delete_network(&self, req: DeleteNetworkRequest) -> GangplankResult<()> {
        debug!("=== DeleteNetwork {}", req.network_id);

        // The request ID is not resolvable any more at this point, so
        // reconcile: the host network without a matching runtime network is
        // the one being deleted.
        let runtime_meta = self.runtime_networks_meta().await?;
        debug!("Current runtime networks meta: {:?}", runtime_meta);

        let host_meta = self.host_networks_meta().await?;
        debug!("Current host networks meta: {:?}", host_meta);

        let orphans: Vec<&NetworkMeta> = host_meta
            .iter()
            .filter(|meta| !runtime_meta.contains(meta))
            .collect();

        match orphans.as_slice() {
            [] => Err(GangplankError::NotFound(
                "couldn't find a host network to remove".to_string(),
            )),
            [meta] => {
                self.manager
                    .delete_network(&meta.tenant, &meta.network, &meta.subnet_cidr)
                    .await
            }
            _ => Err(GangplankError::Ambiguous(format!(
                "{} orphaned host networks",
                orphans.len()
            ))),
        }
    }

    pub async fn create_endpoint(
        &self,
        req: CreateEndpointRequest,
    ) -> GangplankResult<CreateEndpointResponse> {
        debug!("=== CreateEndpoint {}", req.endpoint_id);

        let meta = self.network_meta_from_runtime(&req.network_id).await?;

        let network = self.controller.get_network(&meta.tenant, &meta.network).await?;
        info!("Retrieved virtual network: {}", network.uuid);

        let container_id = self.container_identity(&req);

        let ipam = self.controller.get_ipam_subnet(&network, &meta.subnet_cidr)?;
        let subnet_cidr = ipam.cidr();

        let iface = self
            .controller
            .get_or_create_interface(&network, &meta.tenant, &container_id)
            .await?;

        let instance = self
            .controller
            .get_or_create_instance(&iface, &container_id)
            .await?;

        let instance_ip = self
            .controller
            .get_or_create_instance_ip(&network, &iface, &ipam.subnet_uuid)
            .await?;
        let address = instance_ip.instance_ip_address.clone();
        info!("Retrieved instance IP: {}", address);

        let gateway = self
            .controller
            .get_default_gateway(&ipam)
            .map_err(|_| GangplankError::NoGateway)?;

        let mac = self
            .controller
            .get_interface_mac(&iface)
            .map_err(|_| GangplankError::NoMac)?;
        info!("Retrieved MAC: {}", mac);

        // orchestrator MACs are like 11:22:aa:bb:cc:dd, the host stack
        // needs 11-22-AA-BB-CC-DD
        let formatted_mac = normalize_mac(&mac)?;

        let host_network = self
            .manager
            .get_network(&meta.tenant, &meta.network, &subnet_cidr)
            .await?;

        let endpoint_config = HostEndpoint {
            virtual_network_name: host_network.name,
            name: req.endpoint_id.clone(),
            ip_address: address.clone(),
            mac_address: formatted_mac.clone(),
            gateway_address: gateway,
            ..Default::default()
        };
        let host_endpoint_id = self.hostnet.create_endpoint(&endpoint_config).await?;

        self.agent.spawn_add(PortAddRequest {
            instance_uuid: instance.uuid,
            iface_uuid: iface.uuid,
            friendly_name: friendly_name(&host_endpoint_id),
            mac: mac.clone(),
            container_id,
            ip_address: address.clone(),
            network_uuid: network.uuid,
        });

        Ok(CreateEndpointResponse {
            interface: EndpointInterface {
                address: format!("{}/{}", address, ipam.subnet.ip_prefix_len),
                mac_address: formatted_mac,
                ..Default::default()
            },
        })
    }

    pub async fn delete_endpoint(&self, req: DeleteEndpointRequest) -> GangplankResult<()> {
        debug!("=== DeleteEndpoint {}", req.endpoint_id);

        let container_id = req.endpoint_id.clone();
        let meta = self.network_meta_from_runtime(&req.network_id).await?;

        match self
            .controller
            .get_existing_interface(&meta.tenant, &container_id)
            .await
        {
            Ok(iface) => self.agent.spawn_delete(iface.uuid),
            Err(err) => {
                warn!("When handling DeleteEndpoint, interface wasn't found: {}", err)
            }
        }

        match self.controller.get_instance(&container_id).await {
            Ok(Some(instance)) => {
                if let Err(err) = self
                    .controller
                    .delete_recursive(KIND_VIRTUAL_MACHINE, &instance.uuid)
                    .await
                {
                    warn!("When handling DeleteEndpoint, failed to remove instance: {}", err);
                }
            }
            Ok(None) => warn!("When handling DeleteEndpoint, instance wasn't found"),
            Err(err) => {
                warn!("When handling DeleteEndpoint, instance lookup failed: {}", err)
            }
        }

        match self.hostnet.get_endpoint_by_name(&req.endpoint_id).await? {
            Some(endpoint) => self.hostnet.delete_endpoint(&endpoint.id).await,
            None => {
                warn!("When handling DeleteEndpoint, couldn't find host endpoint to delete");
                Ok(())
            }
        }
    }

    pub async fn endpoint_info(&self, req: InfoRequest) -> GangplankResult<InfoResponse> {
        debug!("=== EndpointInfo {}", req.endpoint_id);

        let endpoint = self
            .hostnet
            .get_endpoint_by_name(&req.endpoint_id)
            .await?
            .ok_or_else(|| {
                GangplankError::NotFound(format!("host endpoint {}", req.endpoint_id))
            })?;

        let mut value = std::collections::HashMap::new();
        value.insert("hnsid".to_string(), endpoint.id);
        value.insert(MAC_ADDRESS_LABEL.to_string(), endpoint.mac_address);
        Ok(InfoResponse { value })
    }

    pub async fn join(&self, req: JoinRequest) -> GangplankResult<JoinResponse> {
        debug!("=== Join {}", req.endpoint_id);

        let endpoint = self
            .hostnet
            .get_endpoint_by_name(&req.endpoint_id)
            .await?
            .ok_or_else(|| {
                GangplankError::NotFound(format!("host endpoint {}", req.endpoint_id))
            })?;

        Ok(JoinResponse {
            gateway: endpoint.gateway_address,
            disable_gateway_service: true,
            ..Default::default()
        })
    }

    pub async fn leave(&self, req: LeaveRequest) -> GangplankResult<()> {
        debug!("=== Leave {}", req.endpoint_id);

        self.hostnet
            .get_endpoint_by_name(&req.endpoint_id)
            .await?
            .ok_or_else(|| {
                GangplankError::NotFound(format!("host endpoint {}", req.endpoint_id))
            })?;
        Ok(())
    }

    pub fn allocate_network(
        &self,
        req: AllocateNetworkRequest,
    ) -> GangplankResult<serde_json::Value> {
        debug!("=== AllocateNetwork {}", req.network_id);
        // cluster-mode verb, not served by a local-scope driver
        Err(GangplankError::NotImplemented("AllocateNetwork".to_string()))
    }

    pub fn free_network(&self, req: FreeNetworkRequest) -> GangplankResult<()> {
        debug!("=== FreeNetwork {}", req.network_id);
        Err(GangplankError::NotImplemented("FreeNetwork".to_string()))
    }

    pub fn discover_new(&self, req: DiscoveryNotification) -> GangplankResult<()> {
        debug!("=== DiscoverNew {:?}", req.discovery_type);
        Ok(())
    }

    pub fn discover_delete(&self, req: DiscoveryNotification) -> GangplankResult<()> {
        debug!("=== DiscoverDelete {:?}", req.discovery_type);
        Ok(())
    }

    pub fn program_external_connectivity(
        &self,
        req: ProgramExternalConnectivityRequest,
    ) -> GangplankResult<()> {
        debug!("=== ProgramExternalConnectivity {}", req.endpoint_id);
        Ok(())
    }

    pub fn revoke_external_connectivity(
        &self,
        req: RevokeExternalConnectivityRequest,
    ) -> GangplankResult<()> {
        debug!("=== RevokeExternalConnectivity {}", req.endpoint_id);
        Ok(())
    }

    /// The identifier the orchestrator instance is named after. The protocol
    /// carries no container ID, so the endpoint ID stands in for it; keeping
    /// the policy here keeps it in one place.
    // TODO: read the container identifier from the request options once the
    // runtime passes one through.
    fn container_identity(&self, req: &CreateEndpointRequest) -> String {
        req.endpoint_id.clone()
    }

    async fn network_meta_from_runtime(&self, network_id: &str) -> GangplankResult<NetworkMeta> {
        let network = self.runtime.inspect_network(network_id).await?;

        let tenant = network.options.get("tenant").ok_or_else(|| {
            GangplankError::BadRequest("runtime network has no tenant option".to_string())
        })?;
        let name = network.options.get("network").ok_or_else(|| {
            GangplankError::BadRequest("runtime network has no network option".to_string())
        })?;
        let subnet_cidr = network.ipam_subnets.first().ok_or_else(|| {
            GangplankError::BadRequest("no configured subnets in runtime network".to_string())
        })?;

        NetworkMeta::new(tenant, name, subnet_cidr)
    }

    async fn runtime_networks_meta(&self) -> GangplankResult<Vec<NetworkMeta>> {
        let networks = self.runtime.list_networks().await?;
        Ok(networks
            .iter()
            .filter_map(|network| {
                let tenant = network.options.get("tenant")?;
                let name = network.options.get("network")?;
                let subnet_cidr = network.ipam_subnets.first()?;
                NetworkMeta::new(tenant, name, subnet_cidr).ok()
            })
            .collect())
    }

    async fn host_networks_meta(&self) -> GangplankResult<Vec<NetworkMeta>> {
        let networks = self.manager.list_networks().await?;
        Ok(networks
            .iter()
            .filter_map(|network| decode_network_name(&network.name))
            .collect())
    }

    /// The host stack creates the vswitch together with the first network on
    /// an adapter. A dummy root network pins the vswitch so it exists before
    /// the forwarding extension is probed and outlives network churn.
    async fn ensure_root_network(&self) -> GangplankResult<()> {
        if let Some(existing) = self
            .hostnet
            .get_network_by_name(&self.config.root_network_name)
            .await?
        {
            info!("Existing root host network found: {}", existing.id);
            return Ok(());
        }

        let configuration = HostNetwork {
            name: self.config.root_network_name.clone(),
            network_type: "transparent".to_string(),
            network_adapter_name: self.config.adapter.clone(),
            subnets: vec![HostSubnet {
                address_prefix: "0.0.0.0/24".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let created = self.hostnet.create_network(&configuration).await?;
        info!("Created root host network: {}", created.id);
        Ok(())
    }
}

impl Driver {
    pub fn new(
        config: DriverConfig,
        controller: Controller,
        hostnet: Arc<dyn HostNetApi>,
        runtime: Arc<dyn RuntimeApi>,
        shell: Arc<dyn Shell>,
        agent: PortAgent,
    ) -> Self {
        Driver {
            core: Arc::new(DriverCore::new(
                config, controller, hostnet, runtime, shell, agent,
            )),
            serve: None,
        }
    }

    pub fn is_serving(&self) -> bool {
        self.serve.is_some()
    }

    /// Bring the driver up: root network, extension checks, pipe listener,
    /// spec file, and the wait for the pipe to become dialable. Any failure
    /// leaves the driver not serving.
    pub async fn start_serving(&mut self) -> GangplankResult<()> {
        if self.serve.is_some() {
            return Err(GangplankError::AlreadyServing);
        }

        self.core.ensure_root_network().await?;

        let vswitch = self.core.config.vswitch_name.clone();

        if !self.core.extension.is_running(&vswitch).await? {
            return Err(GangplankError::ExtensionStopped(
                "it doesn't seem to be running, maybe try reinstalling".to_string(),
            ));
        }

        if !self.core.extension.is_enabled(&vswitch).await? {
            self.core.extension.enable(&vswitch).await?;

            if !self.core.extension.is_running(&vswitch).await? {
                return Err(GangplankError::ExtensionStopped(
                    "it stopped running after being enabled".to_string(),
                ));
            }
        }

        let handle = server::serve(self.core.clone()).await?;
        self.serve = Some(handle);

        info!("Started serving on {}", self.core.config.pipe_path.display());
        Ok(())
    }

    /// Tear the pipe server down. In-flight handlers complete first; the
    /// pipe and spec files are gone when this returns. No-op when not
    /// serving.
    pub async fn stop_serving(&mut self) -> GangplankResult<()> {
        if let Some(handle) = self.serve.take() {
            server::shutdown(handle, &self.core.config).await;
            info!("Stopped serving");
        }
        Ok(())
    }
}

/// Reformat an orchestrator MAC into the dash-separated upper-case form the
/// host stack expects.
fn normalize_mac(mac: &str) -> GangplankResult<String> {
    let parsed = MacAddr6::from_str(mac)
        .map_err(|_| GangplankError::msg(format!("malformed MAC address {}", mac)))?;
    Ok(parsed
        .into_array()
        .iter()
        .map(|byte| format!("{:02X}", byte))
        .collect::<Vec<_>>()
        .join("-"))
}

/// Human-readable NIC name the forwarding extension uses to identify
/// container interfaces; the first ID segment is enough to recognise it.
fn friendly_name(host_endpoint_id: &str) -> String {
    let nic_id = host_endpoint_id.split('-').next().unwrap_or_default();
    format!("Container NIC {}", nic_id)
}
