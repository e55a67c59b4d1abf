use std::sync::Arc;

use log::{debug, error, info};
use regex::Regex;
use serde_json::Value;

use crate::config::DOMAIN_NAME;
use crate::error::{GangplankError, GangplankResult};
use crate::orch::store::ObjectStore;
use crate::orch::types::{
    InstanceIp, IpamSubnet, VirtualMachine, VirtualMachineInterface, VirtualNetwork,
    KIND_INSTANCE_IP, KIND_INTERFACE, KIND_VIRTUAL_MACHINE, KIND_VIRTUAL_NETWORK,
};

/// Orchestrator client. Lookups are lazy and creation is get-or-create;
/// deletion of a whole object subtree goes through delete_recursive.
pub struct Controller {
    store: Arc<dyn ObjectStore>,
}

impl Controller {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Controller { store }
    }

    async fn find_by_name(
        &self,
        kind: &str,
        fq_name: &[String],
    ) -> GangplankResult<Option<Value>> {
        match self.store.find_uuid_by_name(kind, fq_name).await? {
            Some(uuid) => self.store.get(kind, &uuid).await,
            None => Ok(None),
        }
    }

    pub async fn get_network(
        &self,
        tenant_name: &str,
        network_name: &str,
    ) -> GangplankResult<VirtualNetwork> {
        let fq_name = vec![
            DOMAIN_NAME.to_string(),
            tenant_name.to_string(),
            network_name.to_string(),
        ];
        let value = self
            .find_by_name(KIND_VIRTUAL_NETWORK, &fq_name)
            .await?
            .ok_or_else(|| {
                GangplankError::NotFound(format!("virtual network {}", fq_name.join(":")))
            })?;
        Ok(serde_json::from_value(value)?)
    }

    /// The IPAM subnet of a virtual network with the given CIDR. An empty
    /// CIDR, or one starting with 0.0.0.0, means the caller did not specify
    /// a subnet; that is only unambiguous when the network has exactly one.
    pub fn get_ipam_subnet(
        &self,
        network: &VirtualNetwork,
        cidr: &str,
    ) -> GangplankResult<IpamSubnet> {
        let cidr = if cidr.starts_with("0.0.0.0") { "" } else { cidr };

        let subnets = network.ipam_subnets();
        if subnets.is_empty() {
            return Err(GangplankError::NotFound(format!(
                "no IPAM subnets on virtual network {}",
                network.name()
            )));
        }

        if cidr.is_empty() {
            if subnets.len() > 1 {
                return Err(GangplankError::Ambiguous(
                    "no subnet CIDR specified and the network has several subnets".to_string(),
                ));
            }
            return Ok(subnets[0].clone());
        }

        subnets
            .into_iter()
            .find(|subnet| subnet.cidr() == cidr)
            .cloned()
            .ok_or_else(|| GangplankError::NotFound(format!("subnet with CIDR {}", cidr)))
    }

    pub fn get_default_gateway(&self, subnet: &IpamSubnet) -> GangplankResult<String> {
        if subnet.default_gateway.is_empty() {
            return Err(GangplankError::Empty("default gateway".to_string()));
        }
        Ok(subnet.default_gateway.clone())
    }

    pub async fn get_or_create_interface(
        &self,
        network: &VirtualNetwork,
        tenant_name: &str,
        container_id: &str,
    ) -> GangplankResult<VirtualMachineInterface> {
        let fq_name = vec![
            DOMAIN_NAME.to_string(),
            tenant_name.to_string(),
            container_id.to_string(),
        ];
        if let Some(value) = self.find_by_name(KIND_INTERFACE, &fq_name).await? {
            return Ok(serde_json::from_value(value)?);
        }

        let config = VirtualMachineInterface {
            fq_name: fq_name.clone(),
            parent_type: "project".to_string(),
            virtual_network_refs: vec![network.object_ref()],
            ..Default::default()
        };
        self.store
            .create(KIND_INTERFACE, serde_json::to_value(&config)?)
            .await?;

        let created = self
            .find_by_name(KIND_INTERFACE, &fq_name)
            .await?
            .ok_or_else(|| {
                GangplankError::msg(format!("interface {} missing after create", fq_name.join(":")))
            })?;
        let iface: VirtualMachineInterface = serde_json::from_value(created)?;
        info!("Created interface: {}", iface.fq_name.join(":"));
        Ok(iface)
    }

    /// Same lookup as get_or_create_interface but never creates.
    pub async fn get_existing_interface(
        &self,
        tenant_name: &str,
        container_id: &str,
    ) -> GangplankResult<VirtualMachineInterface> {
        let fq_name = vec![
            DOMAIN_NAME.to_string(),
            tenant_name.to_string(),
            container_id.to_string(),
        ];
        let value = self
            .find_by_name(KIND_INTERFACE, &fq_name)
            .await?
            .ok_or_else(|| {
                GangplankError::NotFound(format!("interface {}", fq_name.join(":")))
            })?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn get_instance(
        &self,
        container_id: &str,
    ) -> GangplankResult<Option<VirtualMachine>> {
        let fq_name = vec![container_id.to_string()];
        match self.find_by_name(KIND_VIRTUAL_MACHINE, &fq_name).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Look the instance up by the container identifier; when absent, create
    /// it, attach the interface to it and update the interface.
    pub async fn get_or_create_instance(
        &self,
        iface: &VirtualMachineInterface,
        container_id: &str,
    ) -> GangplankResult<VirtualMachine> {
        if let Some(instance) = self.get_instance(container_id).await? {
            return Ok(instance);
        }

        let config = VirtualMachine {
            fq_name: vec![container_id.to_string()],
            ..Default::default()
        };
        self.store
            .create(KIND_VIRTUAL_MACHINE, serde_json::to_value(&config)?)
            .await?;

        let instance = self
            .get_instance(container_id)
            .await?
            .ok_or_else(|| {
                GangplankError::msg(format!("instance {} missing after create", container_id))
            })?;
        info!("Created instance: {}", instance.fq_name.join(":"));

        let mut updated = iface.clone();
        updated.virtual_machine_refs.push(instance.object_ref());
        self.store
            .update(KIND_INTERFACE, &iface.uuid, serde_json::to_value(&updated)?)
            .await?;

        Ok(instance)
    }

    /// First MAC in the interface's MAC list.
    pub fn get_interface_mac(&self, iface: &VirtualMachineInterface) -> GangplankResult<String> {
        iface
            .mac_addresses
            .mac_address
            .first()
            .cloned()
            .ok_or_else(|| GangplankError::Empty("interface MAC list".to_string()))
    }

    pub async fn get_or_create_instance_ip(
        &self,
        network: &VirtualNetwork,
        iface: &VirtualMachineInterface,
        subnet_uuid: &str,
    ) -> GangplankResult<InstanceIp> {
        let fq_name = vec![iface.name().to_string()];
        if let Some(value) = self.find_by_name(KIND_INSTANCE_IP, &fq_name).await? {
            return Ok(serde_json::from_value(value)?);
        }

        let config = InstanceIp {
            fq_name,
            subnet_uuid: subnet_uuid.to_string(),
            virtual_network_refs: vec![network.object_ref()],
            virtual_machine_interface_refs: vec![iface.object_ref()],
            ..Default::default()
        };
        let created = self
            .store
            .create(KIND_INSTANCE_IP, serde_json::to_value(&config)?)
            .await?;
        let created: InstanceIp = serde_json::from_value(created)?;

        // re-read so the orchestrator-allocated address is filled in
        let allocated = self
            .store
            .get(KIND_INSTANCE_IP, &created.uuid)
            .await?
            .ok_or_else(|| {
                GangplankError::msg(format!("instance IP {} missing after create", created.uuid))
            })?;
        Ok(serde_json::from_value(allocated)?)
    }

    /// Delete an object together with everything that still references it.
    /// The server refuses a delete with a conflict listing the children as
    /// `<type>/<uuid>` tokens in the error text; each is looked up, deleted
    /// recursively, and the parent delete is retried. An already-missing
    /// object counts as success.
    pub async fn delete_recursive(&self, kind: &str, uuid: &str) -> GangplankResult<()> {
        debug!("Deleting {} {}", kind, uuid);
        loop {
            match self.store.delete(kind, uuid).await {
                Ok(()) => return Ok(()),
                Err(GangplankError::NotFound(msg)) => {
                    error!("Resource already gone: {}", msg);
                    return Ok(());
                }
                Err(GangplankError::Conflict(msg)) => {
                    for (child_kind, child_uuid) in parse_child_refs(&msg)? {
                        match self.store.get(&child_kind, &child_uuid).await? {
                            Some(_) => {
                                Box::pin(self.delete_recursive(&child_kind, &child_uuid)).await?
                            }
                            None => {
                                return Err(GangplankError::ChildLookup(format!(
                                    "{}/{}",
                                    child_kind, child_uuid
                                )))
                            }
                        }
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Extract every `<type>/<uuid>` token from a conflict error text. The
/// pattern is the contract with the server and must not change.
fn parse_child_refs(msg: &str) -> GangplankResult<Vec<(String, String)>> {
    let re = Regex::new(
        "([a-z-]+/[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})",
    )
    .map_err(|err| GangplankError::msg(format!("bad child reference pattern: {}", err)))?;

    Ok(re
        .find_iter(msg)
        .filter_map(|token| {
            let mut split = token.as_str().splitn(2, '/');
            match (split.next(), split.next()) {
                (Some(kind), Some(uuid)) => Some((kind.to_string(), uuid.to_string())),
                _ => None,
            }
        })
        .collect())
}
