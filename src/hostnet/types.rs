// Wire types accepted by the host network control API.

/// A single subnet carried by a host network.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HostSubnet {
    #[serde(rename = "AddressPrefix")]
    pub address_prefix: String,

    #[serde(rename = "GatewayAddress", default, skip_serializing_if = "String::is_empty")]
    pub gateway_address: String,
}

/// An L2 network known to the host stack. Creating the first network on an
/// adapter also creates the underlying virtual switch.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HostNetwork {
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Type")]
    pub network_type: String,

    #[serde(rename = "NetworkAdapterName", default)]
    pub network_adapter_name: String,

    #[serde(rename = "Subnets", default)]
    pub subnets: Vec<HostSubnet>,
}

/// A single attachment point inside a container, bound to one host network.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HostEndpoint {
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(rename = "Name")]
    pub name: String,

    /// ID of the owning host network.
    #[serde(rename = "VirtualNetwork", default, skip_serializing_if = "String::is_empty")]
    pub virtual_network: String,

    /// Name of the owning host network.
    #[serde(rename = "VirtualNetworkName", default, skip_serializing_if = "String::is_empty")]
    pub virtual_network_name: String,

    #[serde(rename = "IPAddress", default)]
    pub ip_address: String,

    /// Dash-separated upper-case MAC.
    #[serde(rename = "MacAddress", default)]
    pub mac_address: String,

    #[serde(rename = "GatewayAddress", default)]
    pub gateway_address: String,
}
