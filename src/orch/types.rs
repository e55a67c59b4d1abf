// Thin typed wrappers over the orchestrator object model, carrying only the
// fields the driver reads. The kind strings are the REST type tokens and the
// field names match the wire schema.

pub const KIND_VIRTUAL_NETWORK: &str = "virtual-network";
pub const KIND_VIRTUAL_MACHINE: &str = "virtual-machine";
pub const KIND_INTERFACE: &str = "virtual-machine-interface";
pub const KIND_INSTANCE_IP: &str = "instance-ip";
pub const KIND_NETWORK_IPAM: &str = "network-ipam";
pub const KIND_PROJECT: &str = "project";

/// Reference from one orchestrator object to another.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ObjectRef {
    #[serde(rename = "to", default)]
    pub to: Vec<String>,

    #[serde(rename = "uuid", default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SubnetType {
    #[serde(rename = "ip_prefix")]
    pub ip_prefix: String,

    #[serde(rename = "ip_prefix_len")]
    pub ip_prefix_len: u8,
}

/// A single IPAM record inside a virtual network.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IpamSubnet {
    #[serde(rename = "subnet")]
    pub subnet: SubnetType,

    #[serde(rename = "default_gateway", default)]
    pub default_gateway: String,

    #[serde(rename = "subnet_uuid", default)]
    pub subnet_uuid: String,
}

impl IpamSubnet {
    /// The subnet in canonical "prefix/len" form.
    pub fn cidr(&self) -> String {
        format!("{}/{}", self.subnet.ip_prefix, self.subnet.ip_prefix_len)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VnSubnets {
    #[serde(rename = "ipam_subnets", default)]
    pub ipam_subnets: Vec<IpamSubnet>,
}

/// Reference from a virtual network to an IPAM, carrying the subnets.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IpamRef {
    #[serde(rename = "to", default)]
    pub to: Vec<String>,

    #[serde(rename = "uuid", default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,

    #[serde(rename = "attr", default)]
    pub attr: VnSubnets,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VirtualNetwork {
    #[serde(rename = "uuid", default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,

    #[serde(rename = "fq_name", default)]
    pub fq_name: Vec<String>,

    #[serde(rename = "network_ipam_refs", default)]
    pub network_ipam_refs: Vec<IpamRef>,
}

impl VirtualNetwork {
    pub fn name(&self) -> &str {
        self.fq_name.last().map(String::as_str).unwrap_or_default()
    }

    /// All IPAM subnets across all IPAM references.
    pub fn ipam_subnets(&self) -> Vec<&IpamSubnet> {
        self.network_ipam_refs
            .iter()
            .flat_map(|ipam_ref| ipam_ref.attr.ipam_subnets.iter())
            .collect()
    }

    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef {
            to: self.fq_name.clone(),
            uuid: self.uuid.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MacAddresses {
    #[serde(rename = "mac_address", default)]
    pub mac_address: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VirtualMachineInterface {
    #[serde(rename = "uuid", default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,

    #[serde(rename = "fq_name", default)]
    pub fq_name: Vec<String>,

    #[serde(rename = "parent_type", default, skip_serializing_if = "String::is_empty")]
    pub parent_type: String,

    #[serde(rename = "virtual_machine_interface_mac_addresses", default)]
    pub mac_addresses: MacAddresses,

    #[serde(rename = "virtual_network_refs", default)]
    pub virtual_network_refs: Vec<ObjectRef>,

    #[serde(rename = "virtual_machine_refs", default)]
    pub virtual_machine_refs: Vec<ObjectRef>,
}

impl VirtualMachineInterface {
    pub fn name(&self) -> &str {
        self.fq_name.last().map(String::as_str).unwrap_or_default()
    }

    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef {
            to: self.fq_name.clone(),
            uuid: self.uuid.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VirtualMachine {
    #[serde(rename = "uuid", default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,

    #[serde(rename = "fq_name", default)]
    pub fq_name: Vec<String>,
}

impl VirtualMachine {
    pub fn name(&self) -> &str {
        self.fq_name.last().map(String::as_str).unwrap_or_default()
    }

    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef {
            to: self.fq_name.clone(),
            uuid: self.uuid.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InstanceIp {
    #[serde(rename = "uuid", default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,

    #[serde(rename = "fq_name", default)]
    pub fq_name: Vec<String>,

    #[serde(rename = "instance_ip_address", default)]
    pub instance_ip_address: String,

    #[serde(rename = "subnet_uuid", default, skip_serializing_if = "String::is_empty")]
    pub subnet_uuid: String,

    #[serde(rename = "virtual_network_refs", default)]
    pub virtual_network_refs: Vec<ObjectRef>,

    #[serde(rename = "virtual_machine_interface_refs", default)]
    pub virtual_machine_interface_refs: Vec<ObjectRef>,
}
