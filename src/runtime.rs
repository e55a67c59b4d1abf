use std::collections::HashMap;

use async_trait::async_trait;
use bollard::network::InspectNetworkOptions;
use bollard::Docker;

use crate::error::{GangplankError, GangplankResult};

/// The slice of a runtime network the driver cares about: the generic
/// options and the configured IPAM pools.
#[derive(Clone, Debug, Default)]
pub struct RuntimeNetwork {
    pub id: String,
    pub options: HashMap<String, String>,
    pub ipam_subnets: Vec<String>,
}

/// Read access to the container runtime's network list.
#[async_trait]
pub trait RuntimeApi: Send + Sync {
    async fn inspect_network(&self, id: &str) -> GangplankResult<RuntimeNetwork>;
    async fn list_networks(&self) -> GangplankResult<Vec<RuntimeNetwork>>;
}

/// Docker Engine API client, connected the way the environment dictates.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect() -> GangplankResult<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(DockerRuntime { docker })
    }
}

fn from_model(network: bollard::models::Network) -> RuntimeNetwork {
    RuntimeNetwork {
        id: network.id.unwrap_or_default(),
        options: network.options.unwrap_or_default(),
        ipam_subnets: network
            .ipam
            .and_then(|ipam| ipam.config)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|config| config.subnet)
            .collect(),
    }
}

#[async_trait]
impl RuntimeApi for DockerRuntime {
    async fn inspect_network(&self, id: &str) -> GangplankResult<RuntimeNetwork> {
        let network = self
            .docker
            .inspect_network(id, None::<InspectNetworkOptions<String>>)
            .await
            .map_err(|err| match err {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                } => GangplankError::NotFound(format!("runtime network {}", id)),
                other => other.into(),
            })?;
        Ok(from_model(network))
    }

    async fn list_networks(&self) -> GangplankResult<Vec<RuntimeNetwork>> {
        let networks = self.docker.list_networks::<String>(None).await?;
        Ok(networks.into_iter().map(from_model).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{Ipam, IpamConfig, Network};

    #[test]
    fn test_from_model() {
        let model = Network {
            id: Some("abc".to_string()),
            options: Some(HashMap::from([
                ("tenant".to_string(), "agatka".to_string()),
                ("network".to_string(), "test_net".to_string()),
            ])),
            ipam: Some(Ipam {
                config: Some(vec![IpamConfig {
                    subnet: Some("10.10.10.0/24".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let net = from_model(model);
        assert_eq!(net.id, "abc");
        assert_eq!(net.options["tenant"], "agatka");
        assert_eq!(net.ipam_subnets, vec!["10.10.10.0/24"]);
    }

    #[test]
    fn test_from_model_tolerates_missing_fields() {
        let net = from_model(Network::default());
        assert!(net.id.is_empty());
        assert!(net.options.is_empty());
        assert!(net.ipam_subnets.is_empty());
    }
}
