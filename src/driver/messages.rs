// Request and response types of the libnetwork remote-driver protocol.
// Field names are the protocol's and must not change.

use std::collections::HashMap;

use serde_json::Value;

/// Options key under which the runtime nests the user-supplied generic
/// options (tenant and network name).
pub const GENERIC_OPTIONS_KEY: &str = "com.docker.network.generic";

/// Well-known label for the endpoint MAC in EndpointInfo responses.
pub const MAC_ADDRESS_LABEL: &str = "com.docker.network.endpoint.macaddress";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ActivateResponse {
    #[serde(rename = "Implements")]
    pub implements: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CapabilitiesResponse {
    #[serde(rename = "Scope")]
    pub scope: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IpamData {
    #[serde(rename = "AddressSpace", default)]
    pub address_space: String,

    /// Subnet in CIDR form.
    #[serde(rename = "Pool", default)]
    pub pool: String,

    #[serde(rename = "Gateway", default)]
    pub gateway: String,

    #[serde(rename = "AuxAddresses", default)]
    pub aux_addresses: Option<HashMap<String, String>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CreateNetworkRequest {
    #[serde(rename = "NetworkID", default)]
    pub network_id: String,

    #[serde(rename = "Options", default)]
    pub options: HashMap<String, Value>,

    #[serde(rename = "IPv4Data", default)]
    pub ipv4_data: Vec<IpamData>,

    #[serde(rename = "IPv6Data", default)]
    pub ipv6_data: Vec<IpamData>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeleteNetworkRequest {
    #[serde(rename = "NetworkID", default)]
    pub network_id: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AllocateNetworkRequest {
    #[serde(rename = "NetworkID", default)]
    pub network_id: String,

    #[serde(rename = "Options", default)]
    pub options: HashMap<String, Value>,

    #[serde(rename = "IPv4Data", default)]
    pub ipv4_data: Vec<IpamData>,

    #[serde(rename = "IPv6Data", default)]
    pub ipv6_data: Vec<IpamData>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FreeNetworkRequest {
    #[serde(rename = "NetworkID", default)]
    pub network_id: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EndpointInterface {
    #[serde(rename = "Address", default)]
    pub address: String,

    #[serde(rename = "AddressIPv6", default)]
    pub address_ipv6: String,

    #[serde(rename = "MacAddress", default)]
    pub mac_address: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CreateEndpointRequest {
    #[serde(rename = "NetworkID", default)]
    pub network_id: String,

    #[serde(rename = "EndpointID", default)]
    pub endpoint_id: String,

    #[serde(rename = "Interface", default)]
    pub interface: Option<EndpointInterface>,

    #[serde(rename = "Options", default)]
    pub options: HashMap<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CreateEndpointResponse {
    #[serde(rename = "Interface")]
    pub interface: EndpointInterface,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeleteEndpointRequest {
    #[serde(rename = "NetworkID", default)]
    pub network_id: String,

    #[serde(rename = "EndpointID", default)]
    pub endpoint_id: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InfoRequest {
    #[serde(rename = "NetworkID", default)]
    pub network_id: String,

    #[serde(rename = "EndpointID", default)]
    pub endpoint_id: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InfoResponse {
    #[serde(rename = "Value")]
    pub value: HashMap<String, String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct JoinRequest {
    #[serde(rename = "NetworkID", default)]
    pub network_id: String,

    #[serde(rename = "EndpointID", default)]
    pub endpoint_id: String,

    #[serde(rename = "SandboxKey", default)]
    pub sandbox_key: String,

    #[serde(rename = "Options", default)]
    pub options: HashMap<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InterfaceName {
    #[serde(rename = "SrcName", default)]
    pub src_name: String,

    #[serde(rename = "DstPrefix", default)]
    pub dst_prefix: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StaticRoute {
    #[serde(rename = "Destination", default)]
    pub destination: String,

    #[serde(rename = "RouteType", default)]
    pub route_type: i32,

    #[serde(rename = "NextHop", default)]
    pub next_hop: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct JoinResponse {
    #[serde(rename = "InterfaceName", default)]
    pub interface_name: InterfaceName,

    #[serde(rename = "Gateway", default)]
    pub gateway: String,

    #[serde(rename = "GatewayIPv6", default)]
    pub gateway_ipv6: String,

    #[serde(rename = "StaticRoutes", default)]
    pub static_routes: Vec<StaticRoute>,

    /// The driver never injects gateway services into containers.
    #[serde(rename = "DisableGatewayService", default)]
    pub disable_gateway_service: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LeaveRequest {
    #[serde(rename = "NetworkID", default)]
    pub network_id: String,

    #[serde(rename = "EndpointID", default)]
    pub endpoint_id: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DiscoveryNotification {
    #[serde(rename = "DiscoveryType", default)]
    pub discovery_type: i64,

    #[serde(rename = "DiscoveryData", default)]
    pub discovery_data: Value,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProgramExternalConnectivityRequest {
    #[serde(rename = "NetworkID", default)]
    pub network_id: String,

    #[serde(rename = "EndpointID", default)]
    pub endpoint_id: String,

    #[serde(rename = "Options", default)]
    pub options: HashMap<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RevokeExternalConnectivityRequest {
    #[serde(rename = "NetworkID", default)]
    pub network_id: String,

    #[serde(rename = "EndpointID", default)]
    pub endpoint_id: String,
}

/// Error body understood by the runtime.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "Err")]
    pub err: String,
}
