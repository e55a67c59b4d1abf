// In-memory doubles for the three control planes, shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agent::PortAgent;
use crate::config::DriverConfig;
use crate::driver::{Driver, DriverCore};
use crate::error::{GangplankError, GangplankResult};
use crate::exec::{CmdOutput, Shell};
use crate::hostnet::api::HostNetApi;
use crate::hostnet::types::{HostEndpoint, HostNetwork};
use crate::orch::client::Controller;
use crate::orch::store::ObjectStore;
use crate::orch::types::{KIND_INSTANCE_IP, KIND_INTERFACE, KIND_VIRTUAL_NETWORK};
use crate::runtime::{RuntimeApi, RuntimeNetwork};

struct StoredObject {
    kind: String,
    body: Value,
}

/// Object store double. Mimics the server's conflict behaviour on delete:
/// objects still referenced by others refuse deletion and list the
/// referring children as URL tokens in the error text.
pub struct MemStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    counter: AtomicUsize,
    mac_counter: AtomicUsize,
}

impl MemStore {
    pub fn new() -> Self {
        MemStore {
            objects: Mutex::new(HashMap::new()),
            counter: AtomicUsize::new(0),
            mac_counter: AtomicUsize::new(0),
        }
    }

    fn next_uuid(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{:08x}-0000-4000-8000-{:012x}", n, n)
    }

    /// Seed a virtual network. Subnets are (prefix, len, gateway, subnet uuid).
    pub fn add_network(
        &self,
        tenant: &str,
        name: &str,
        subnets: &[(&str, u8, &str, &str)],
    ) -> String {
        let uuid = self.next_uuid();
        let ipam_subnets: Vec<Value> = subnets
            .iter()
            .map(|(prefix, len, gateway, subnet_uuid)| {
                json!({
                    "subnet": {"ip_prefix": prefix, "ip_prefix_len": len},
                    "default_gateway": gateway,
                    "subnet_uuid": subnet_uuid,
                })
            })
            .collect();
        let body = json!({
            "uuid": uuid,
            "fq_name": ["default-domain", tenant, name],
            "network_ipam_refs": [{
                "to": ["default-domain", "default-project", "default-network-ipam"],
                "attr": {"ipam_subnets": ipam_subnets},
            }],
        });
        self.objects.lock().unwrap().insert(
            uuid.clone(),
            StoredObject {
                kind: KIND_VIRTUAL_NETWORK.to_string(),
                body,
            },
        );
        uuid
    }

    fn referrers(objects: &HashMap<String, StoredObject>, uuid: &str) -> Vec<(String, String)> {
        let mut found = Vec::new();
        for (other_uuid, object) in objects {
            let refs_to_target = object
                .body
                .as_object()
                .map(|fields| {
                    fields.iter().any(|(key, value)| {
                        key.ends_with("_refs")
                            && value
                                .as_array()
                                .map(|refs| {
                                    refs.iter().any(|r| r["uuid"].as_str() == Some(uuid))
                                })
                                .unwrap_or(false)
                    })
                })
                .unwrap_or(false);
            if refs_to_target {
                found.push((object.kind.clone(), other_uuid.clone()));
            }
        }
        found.sort();
        found
    }

    fn allocate_address(
        &self,
        objects: &HashMap<String, StoredObject>,
        body: &Value,
    ) -> Option<String> {
        let network_uuid = body["virtual_network_refs"][0]["uuid"].as_str()?;
        let network = objects.get(network_uuid)?;
        let subnets = network.body["network_ipam_refs"][0]["attr"]["ipam_subnets"].as_array()?;
        let pinned = body["subnet_uuid"].as_str().unwrap_or("");
        let subnet = subnets
            .iter()
            .find(|s| s["subnet_uuid"].as_str() == Some(pinned))
            .or_else(|| subnets.first())?;
        let prefix = subnet["subnet"]["ip_prefix"].as_str()?;

        let used = objects
            .values()
            .filter(|o| o.kind == KIND_INSTANCE_IP)
            .count();
        let mut octets: Vec<String> = prefix.split('.').map(str::to_string).collect();
        if octets.len() != 4 {
            return None;
        }
        octets[3] = (2 + used).to_string();
        Some(octets.join("."))
    }
}

#[async_trait]
impl ObjectStore for MemStore {
    async fn find_uuid_by_name(
        &self,
        kind: &str,
        fq_name: &[String],
    ) -> GangplankResult<Option<String>> {
        let wanted: Vec<Value> = fq_name.iter().map(|part| json!(part)).collect();
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .find(|(_, object)| {
                object.kind == kind && object.body["fq_name"].as_array() == Some(&wanted)
            })
            .map(|(uuid, _)| uuid.clone()))
    }

    async fn get(&self, kind: &str, uuid: &str) -> GangplankResult<Option<Value>> {
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .get(uuid)
            .filter(|object| object.kind == kind)
            .map(|object| object.body.clone()))
    }

    async fn create(&self, kind: &str, mut body: Value) -> GangplankResult<Value> {
        let uuid = self.next_uuid();
        body["uuid"] = json!(uuid);

        if kind == KIND_INTERFACE {
            let macs = &body["virtual_machine_interface_mac_addresses"]["mac_address"];
            if macs.as_array().map(Vec::is_empty).unwrap_or(true) {
                let n = self.mac_counter.fetch_add(1, Ordering::SeqCst);
                let mac = if n == 0 {
                    "aa:bb:cc:dd:ee:ff".to_string()
                } else {
                    format!("aa:bb:cc:dd:ee:{:02x}", n)
                };
                body["virtual_machine_interface_mac_addresses"] = json!({"mac_address": [mac]});
            }
        }

        let mut objects = self.objects.lock().unwrap();
        if kind == KIND_INSTANCE_IP && body["instance_ip_address"].as_str().unwrap_or("").is_empty()
        {
            if let Some(address) = self.allocate_address(&objects, &body) {
                body["instance_ip_address"] = json!(address);
            }
        }

        objects.insert(
            uuid,
            StoredObject {
                kind: kind.to_string(),
                body: body.clone(),
            },
        );
        Ok(body)
    }

    async fn update(&self, kind: &str, uuid: &str, mut body: Value) -> GangplankResult<()> {
        let mut objects = self.objects.lock().unwrap();
        match objects.get_mut(uuid) {
            Some(object) if object.kind == kind => {
                body["uuid"] = json!(uuid);
                object.body = body;
                Ok(())
            }
            _ => Err(GangplankError::NotFound(format!("{}/{}", kind, uuid))),
        }
    }

    async fn delete(&self, kind: &str, uuid: &str) -> GangplankResult<()> {
        let mut objects = self.objects.lock().unwrap();
        if !objects.contains_key(uuid) {
            return Err(GangplankError::NotFound(format!(
                "404 Resource {}/{}",
                kind, uuid
            )));
        }

        let children = Self::referrers(&objects, uuid);
        if !children.is_empty() {
            let urls: Vec<String> = children
                .iter()
                .map(|(child_kind, child_uuid)| {
                    format!("'http://127.0.0.1:8082/{}/{}'", child_kind, child_uuid)
                })
                .collect();
            return Err(GangplankError::Conflict(format!(
                "409 Conflict: Delete when children still present: [{}]",
                urls.join(", ")
            )));
        }

        objects.remove(uuid);
        Ok(())
    }
}

/// Host stack double backed by two maps.
pub struct MemHostNet {
    networks: Mutex<HashMap<String, HostNetwork>>,
    endpoints: Mutex<HashMap<String, HostEndpoint>>,
    counter: AtomicUsize,
}

impl MemHostNet {
    pub fn new() -> Self {
        MemHostNet {
            networks: Mutex::new(HashMap::new()),
            endpoints: Mutex::new(HashMap::new()),
            counter: AtomicUsize::new(0),
        }
    }

    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{:08x}-aaaa-bbbb-cccc-{:012x}", n, n)
    }

    /// Seed a network that is not managed by the driver.
    pub fn add_raw_network(&self, name: &str, adapter: &str) {
        let id = self.next_id();
        self.networks.lock().unwrap().insert(
            id.clone(),
            HostNetwork {
                id,
                name: name.to_string(),
                network_type: "nat".to_string(),
                network_adapter_name: adapter.to_string(),
                ..Default::default()
            },
        );
    }

    pub fn add_endpoint(&self, name: &str, network_name: &str) {
        let id = self.next_id();
        self.endpoints.lock().unwrap().insert(
            id.clone(),
            HostEndpoint {
                id,
                name: name.to_string(),
                virtual_network_name: network_name.to_string(),
                ..Default::default()
            },
        );
    }

    pub fn clear_endpoints(&self) {
        self.endpoints.lock().unwrap().clear();
    }
}

#[async_trait]
impl HostNetApi for MemHostNet {
    async fn create_network(&self, config: &HostNetwork) -> GangplankResult<HostNetwork> {
        let mut created = config.clone();
        created.id = self.next_id();
        self.networks
            .lock()
            .unwrap()
            .insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn get_network(&self, id: &str) -> GangplankResult<HostNetwork> {
        self.networks
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| GangplankError::NotFound(format!("host network {}", id)))
    }

    async fn get_network_by_name(&self, name: &str) -> GangplankResult<Option<HostNetwork>> {
        Ok(self
            .networks
            .lock()
            .unwrap()
            .values()
            .find(|net| net.name == name)
            .cloned())
    }

    async fn list_networks(&self) -> GangplankResult<Vec<HostNetwork>> {
        Ok(self.networks.lock().unwrap().values().cloned().collect())
    }

    async fn delete_network(&self, id: &str) -> GangplankResult<()> {
        self.networks
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| GangplankError::NotFound(format!("host network {}", id)))
    }

    async fn create_endpoint(&self, config: &HostEndpoint) -> GangplankResult<String> {
        let mut created = config.clone();
        created.id = self.next_id();
        if created.virtual_network.is_empty() {
            if let Some(net) = self
                .networks
                .lock()
                .unwrap()
                .values()
                .find(|net| net.name == created.virtual_network_name)
            {
                created.virtual_network = net.id.clone();
            }
        }
        let id = created.id.clone();
        self.endpoints.lock().unwrap().insert(id.clone(), created);
        Ok(id)
    }

    async fn get_endpoint(&self, id: &str) -> GangplankResult<HostEndpoint> {
        self.endpoints
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| GangplankError::NotFound(format!("host endpoint {}", id)))
    }

    async fn get_endpoint_by_name(&self, name: &str) -> GangplankResult<Option<HostEndpoint>> {
        Ok(self
            .endpoints
            .lock()
            .unwrap()
            .values()
            .find(|ep| ep.name == name)
            .cloned())
    }

    async fn list_endpoints(&self) -> GangplankResult<Vec<HostEndpoint>> {
        Ok(self.endpoints.lock().unwrap().values().cloned().collect())
    }

    async fn list_network_endpoints(
        &self,
        network_id: &str,
    ) -> GangplankResult<Vec<HostEndpoint>> {
        Ok(self
            .endpoints
            .lock()
            .unwrap()
            .values()
            .filter(|ep| ep.virtual_network == network_id)
            .cloned()
            .collect())
    }

    async fn delete_endpoint(&self, id: &str) -> GangplankResult<()> {
        self.endpoints
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| GangplankError::NotFound(format!("host endpoint {}", id)))
    }
}

/// Scripted host shell understanding the extension-control commands.
pub struct StubShell {
    enabled: Mutex<bool>,
    running: Mutex<bool>,
    stuck_disabled: Mutex<bool>,
}

impl StubShell {
    pub fn new(enabled: bool, running: bool) -> Self {
        StubShell {
            enabled: Mutex::new(enabled),
            running: Mutex::new(running),
            stuck_disabled: Mutex::new(false),
        }
    }

    pub fn set_enabled(&self, value: bool) {
        *self.enabled.lock().unwrap() = value;
    }

    pub fn set_running(&self, value: bool) {
        *self.running.lock().unwrap() = value;
    }

    /// Make Enable-VMSwitchExtension silently fail to change state.
    pub fn set_stuck_disabled(&self, value: bool) {
        *self.stuck_disabled.lock().unwrap() = value;
    }

    pub fn enabled(&self) -> bool {
        *self.enabled.lock().unwrap()
    }
}

#[async_trait]
impl Shell for StubShell {
    async fn run(&self, args: &[&str]) -> GangplankResult<CmdOutput> {
        match args.first().copied() {
            Some("Enable-VMSwitchExtension") => {
                if !*self.stuck_disabled.lock().unwrap() {
                    *self.enabled.lock().unwrap() = true;
                }
                Ok(CmdOutput::default())
            }
            Some("Disable-VMSwitchExtension") => {
                *self.enabled.lock().unwrap() = false;
                Ok(CmdOutput::default())
            }
            Some("Get-VMSwitchExtension") => {
                let value = if args.contains(&"\"Enabled\"") {
                    *self.enabled.lock().unwrap()
                } else if args.contains(&"\"Running\"") {
                    *self.running.lock().unwrap()
                } else {
                    return Err(GangplankError::msg("unexpected property inspection"));
                };
                Ok(CmdOutput {
                    stdout: if value { "True" } else { "False" }.to_string(),
                    stderr: String::new(),
                })
            }
            other => Err(GangplankError::msg(format!(
                "unexpected shell command {:?}",
                other
            ))),
        }
    }
}

/// Fixed answers for the runtime's network list.
pub struct StubRuntime {
    networks: Mutex<Vec<RuntimeNetwork>>,
}

pub struct RuntimeNetworkSpec {
    pub id: &'static str,
    pub tenant: &'static str,
    pub network: &'static str,
    pub subnet: &'static str,
}

impl StubRuntime {
    pub fn new() -> Self {
        StubRuntime {
            networks: Mutex::new(Vec::new()),
        }
    }

    pub fn add_network(&self, spec: RuntimeNetworkSpec) {
        self.networks.lock().unwrap().push(RuntimeNetwork {
            id: spec.id.to_string(),
            options: HashMap::from([
                ("tenant".to_string(), spec.tenant.to_string()),
                ("network".to_string(), spec.network.to_string()),
            ]),
            ipam_subnets: vec![spec.subnet.to_string()],
        });
    }
}

#[async_trait]
impl RuntimeApi for StubRuntime {
    async fn inspect_network(&self, id: &str) -> GangplankResult<RuntimeNetwork> {
        self.networks
            .lock()
            .unwrap()
            .iter()
            .find(|net| net.id == id)
            .cloned()
            .ok_or_else(|| GangplankError::NotFound(format!("runtime network {}", id)))
    }

    async fn list_networks(&self) -> GangplankResult<Vec<RuntimeNetwork>> {
        Ok(self.networks.lock().unwrap().clone())
    }
}

pub struct TestPlanes {
    pub store: Arc<MemStore>,
    pub hostnet: Arc<MemHostNet>,
    pub runtime: Arc<StubRuntime>,
    pub shell: Arc<StubShell>,
    _dir: Option<tempfile::TempDir>,
}

fn planes(dir: Option<tempfile::TempDir>) -> TestPlanes {
    TestPlanes {
        store: Arc::new(MemStore::new()),
        hostnet: Arc::new(MemHostNet::new()),
        runtime: Arc::new(StubRuntime::new()),
        shell: Arc::new(StubShell::new(true, true)),
        _dir: dir,
    }
}

fn build_core(config: DriverConfig, planes: &TestPlanes) -> DriverCore {
    DriverCore::new(
        config,
        Controller::new(planes.store.clone()),
        planes.hostnet.clone(),
        planes.runtime.clone(),
        planes.shell.clone(),
        PortAgent::new(),
    )
}

/// A driver core wired to in-memory planes, for exercising the verbs.
pub fn test_core() -> (Arc<DriverCore>, TestPlanes) {
    let planes = planes(None);
    let config = DriverConfig::new("Ethernet0", "Layered Ethernet0");
    let core = Arc::new(build_core(config, &planes));
    (core, planes)
}

/// A full driver with pipe and spec paths under a temp directory.
pub fn test_driver() -> (Driver, TestPlanes) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let mut config = DriverConfig::new("Ethernet0", "Layered Ethernet0");
    config.pipe_path = dir.path().join("gangplank.sock");
    config.spec_dir = dir.path().join("plugins");
    config.pipe_poll = std::time::Duration::from_millis(10);

    let planes = planes(Some(dir));
    let driver = Driver::new(
        config,
        Controller::new(planes.store.clone()),
        planes.hostnet.clone(),
        planes.runtime.clone(),
        planes.shell.clone(),
        PortAgent::new(),
    );
    (driver, planes)
}
