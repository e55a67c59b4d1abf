use std::env;
use std::path::PathBuf;

use log::{debug, error};

use crate::config::AGENT_SCRIPT_FILE;
use crate::error::GangplankResult;
use crate::exec;

/// Invokes the out-of-process port-registration helper. Registration is
/// fire-and-forget: failures are logged and never reach the runtime.
#[derive(Clone)]
pub struct PortAgent {
    script: PathBuf,
}

/// Arguments of an `add` registration, one per helper positional argument.
#[derive(Clone, Debug)]
pub struct PortAddRequest {
    pub instance_uuid: String,
    pub iface_uuid: String,
    pub friendly_name: String,
    pub mac: String,
    pub container_id: String,
    pub ip_address: String,
    pub network_uuid: String,
}

impl PortAgent {
    /// The helper script lives next to the executable.
    pub fn new() -> Self {
        let script = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(AGENT_SCRIPT_FILE)))
            .unwrap_or_else(|| PathBuf::from(AGENT_SCRIPT_FILE));
        PortAgent { script }
    }

    pub async fn add_port(&self, req: &PortAddRequest) -> GangplankResult<()> {
        let script = self.script.to_string_lossy().to_string();
        let out = exec::run(
            "python",
            &[
                &script,
                "add",
                &req.instance_uuid,
                &req.iface_uuid,
                &req.friendly_name,
                &req.mac,
                &req.container_id,
                &req.ip_address,
                &req.network_uuid,
            ],
        )
        .await?;
        debug!(
            "Called agent API wrapper: stdout: {}, stderr: {}",
            out.stdout, out.stderr
        );
        Ok(())
    }

    pub async fn delete_port(&self, iface_uuid: &str) -> GangplankResult<()> {
        let script = self.script.to_string_lossy().to_string();
        let out = exec::run("python", &[&script, "delete", iface_uuid]).await?;
        debug!("Called agent API wrapper: {}", out.stdout);
        Ok(())
    }

    /// Register a port on a detached task.
    pub fn spawn_add(&self, req: PortAddRequest) {
        let agent = self.clone();
        tokio::spawn(async move {
            if let Err(err) = agent.add_port(&req).await {
                error!("When calling agent API wrapper: {}", err);
            }
        });
    }

    /// Unregister a port on a detached task.
    pub fn spawn_delete(&self, iface_uuid: String) {
        let agent = self.clone();
        tokio::spawn(async move {
            if let Err(err) = agent.delete_port(&iface_uuid).await {
                error!("When calling agent API wrapper: {}", err);
            }
        });
    }
}

impl Default for PortAgent {
    fn default() -> Self {
        PortAgent::new()
    }
}
