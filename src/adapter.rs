use std::time::{Duration, Instant};

use log::{debug, warn};
use nix::ifaddrs::getifaddrs;
use tokio::time::sleep;

use crate::error::{GangplankError, GangplankResult};

/// Poll the OS adapter list until the named adapter holds an IPv4 address.
///
/// Creating or deleting the vswitch transiently deconfigures the bound
/// physical adapter, so callers wait here after any host network create and
/// after deleting the last host network on an adapter.
pub async fn wait_for_adapter(
    name: &str,
    timeout: Duration,
    poll: Duration,
) -> GangplankResult<()> {
    let started = Instant::now();
    loop {
        match adapter_has_ipv4(name) {
            Ok(true) => {
                debug!(
                    "Adapter {} reacquired IPv4 after {:?}",
                    name,
                    started.elapsed()
                );
                return Ok(());
            }
            Ok(false) => {}
            Err(err) => {
                warn!(
                    "Error when querying adapter {}, but maybe it will appear soon: {}",
                    name, err
                );
            }
        }

        if started.elapsed() > timeout {
            return Err(GangplankError::Timeout(format!(
                "adapter {} did not reacquire an IPv4 address",
                name
            )));
        }
        sleep(poll).await;
    }
}

fn adapter_has_ipv4(name: &str) -> GangplankResult<bool> {
    let addrs = getifaddrs()
        .map_err(|err| GangplankError::Message(format!("failed to list adapters: {}", err)))?;

    for ifaddr in addrs {
        if ifaddr.interface_name != name {
            continue;
        }
        if let Some(address) = ifaddr.address {
            if address.as_sockaddr_in().is_some() {
                return Ok(true);
            }
        }
    }
    Ok(false)
}
