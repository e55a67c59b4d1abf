use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the driver as registered with the container runtime. Also used
/// for the pipe file and the plugin spec file names.
pub const DRIVER_NAME: &str = "gangplank";

/// Domain under which all orchestrator objects are scoped.
pub const DOMAIN_NAME: &str = "default-domain";

/// Prefix given to all host network names managed by the driver.
pub const HOSTNET_PREFIX: &str = "gangplank";

/// Name of the root host network created solely so that the underlying
/// virtual switch exists before the forwarding extension is probed.
pub const ROOT_NETWORK_NAME: &str = "GangplankRootNetwork";

/// Name of the forwarding extension bound to the virtual switch.
pub const FORWARDING_EXTENSION_NAME: &str = "Gangplank Forwarding Extension";

/// Interface name of the transparent vswitch. Creating the first host
/// network brings this interface up and the bound adapter transiently loses
/// its IPv4 configuration.
pub const TRANSPARENT_INTERFACE_NAME: &str = "vEthernet (HNSTransparent)";

/// File name of the script that talks to the port-registration agent, looked
/// up next to the executable.
pub const AGENT_SCRIPT_FILE: &str = "agent_api.py";

/// Base URL of the host network control socket.
pub const DEFAULT_HOSTNET_URL: &str = "http://127.0.0.1:9697";

/// Time to wait for the adapter to reacquire IPv4 after a vswitch change.
pub const ADAPTER_RECONNECT_TIMEOUT: Duration = Duration::from_millis(15000);

/// Poll rate while waiting for the adapter.
pub const ADAPTER_POLLING_RATE: Duration = Duration::from_millis(300);

/// Time to wait for the pipe file to appear or disappear.
pub const PIPE_POLLING_TIMEOUT: Duration = Duration::from_millis(5000);

/// Poll rate while waiting for the pipe file.
pub const PIPE_POLLING_RATE: Duration = Duration::from_millis(300);

/// Directory where the container runtime looks for plugin spec files.
pub const PLUGIN_SPEC_DIR: &str = "/run/docker/plugins";

fn default_pipe_path() -> PathBuf {
    Path::new("/run").join(DRIVER_NAME).join(format!("{}.sock", DRIVER_NAME))
}

/// Immutable driver configuration, fixed at construction.
#[derive(Clone, Debug)]
pub struct DriverConfig {
    /// Physical adapter backing the virtual switch.
    pub adapter: String,
    /// Name of the transparent virtual switch carrying the extension.
    pub vswitch_name: String,
    /// Address of the pipe the driver serves on.
    pub pipe_path: PathBuf,
    /// File mode applied to the pipe, the platform's permission descriptor.
    pub pipe_mode: u32,
    /// Directory the plugin spec file is published into.
    pub spec_dir: PathBuf,
    pub root_network_name: String,
    pub adapter_timeout: Duration,
    pub adapter_poll: Duration,
    pub pipe_timeout: Duration,
    pub pipe_poll: Duration,
}

impl DriverConfig {
    pub fn new(adapter: &str, vswitch_name: &str) -> Self {
        DriverConfig {
            adapter: adapter.to_string(),
            vswitch_name: vswitch_name.to_string(),
            pipe_path: default_pipe_path(),
            pipe_mode: 0o660,
            spec_dir: PathBuf::from(PLUGIN_SPEC_DIR),
            root_network_name: ROOT_NETWORK_NAME.to_string(),
            adapter_timeout: ADAPTER_RECONNECT_TIMEOUT,
            adapter_poll: ADAPTER_POLLING_RATE,
            pipe_timeout: PIPE_POLLING_TIMEOUT,
            pipe_poll: PIPE_POLLING_RATE,
        }
    }

    /// Path of the plugin spec file advertising the pipe URL.
    pub fn spec_file_path(&self) -> PathBuf {
        self.spec_dir.join(format!("{}.spec", DRIVER_NAME))
    }

    /// URL published in the spec file.
    pub fn pipe_url(&self) -> String {
        format!("npipe://{}", self.pipe_path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_file_path_uses_driver_name() {
        let config = DriverConfig::new("Ethernet0", "Layered Ethernet0");
        assert!(config
            .spec_file_path()
            .ends_with(format!("{}.spec", DRIVER_NAME)));
    }

    #[test]
    fn test_pipe_url_scheme() {
        let config = DriverConfig::new("Ethernet0", "Layered Ethernet0");
        assert!(config.pipe_url().starts_with("npipe://"));
    }
}
