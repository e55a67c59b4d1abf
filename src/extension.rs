use std::sync::Arc;

use log::{debug, error, info};

use crate::config::FORWARDING_EXTENSION_NAME;
use crate::error::{GangplankError, GangplankResult};
use crate::exec::{CmdOutput, Shell};

/// Controls the forwarding extension bound to a named virtual switch
/// through the host shell.
pub struct ExtensionManager {
    shell: Arc<dyn Shell>,
}

impl ExtensionManager {
    pub fn new(shell: Arc<dyn Shell>) -> Self {
        ExtensionManager { shell }
    }

    pub async fn enable(&self, vswitch_name: &str) -> GangplankResult<()> {
        info!("Enabling forwarding extension on {}", vswitch_name);
        if let Err(err) = self
            .call_on_switch(vswitch_name, "Enable-VMSwitchExtension", &[])
            .await
        {
            error!("When enabling forwarding extension: {}", err);
            return Err(err);
        }

        if !self.is_enabled(vswitch_name).await? {
            return Err(GangplankError::NotEnabled(vswitch_name.to_string()));
        }
        Ok(())
    }

    pub async fn disable(&self, vswitch_name: &str) -> GangplankResult<()> {
        info!("Disabling forwarding extension on {}", vswitch_name);
        if let Err(err) = self
            .call_on_switch(vswitch_name, "Disable-VMSwitchExtension", &[])
            .await
        {
            error!("When disabling forwarding extension: {}", err);
            return Err(err);
        }
        Ok(())
    }

    pub async fn is_enabled(&self, vswitch_name: &str) -> GangplankResult<bool> {
        let out = self.inspect_property(vswitch_name, "Enabled").await?;
        Ok(out == "True")
    }

    pub async fn is_running(&self, vswitch_name: &str) -> GangplankResult<bool> {
        let out = self.inspect_property(vswitch_name, "Running").await?;
        Ok(out == "True")
    }

    async fn inspect_property(
        &self,
        vswitch_name: &str,
        property: &str,
    ) -> GangplankResult<String> {
        debug!("Inspecting forwarding extension for property: {}", property);
        // -Expand yields the single property value instead of an object
        let expand = format!("\"{}\"", property);
        let out = self
            .call_on_switch(
                vswitch_name,
                "Get-VMSwitchExtension",
                &["|", "Select", "-Expand", &expand],
            )
            .await
            .map_err(|err| {
                error!("When inspecting forwarding extension: {}", err);
                err
            })?;
        debug!("Inspect result: {}", out.stdout);
        Ok(out.stdout)
    }

    async fn call_on_switch(
        &self,
        vswitch_name: &str,
        command: &str,
        optionals: &[&str],
    ) -> GangplankResult<CmdOutput> {
        let switch_arg = format!("\"{}\"", vswitch_name);
        let name_arg = format!("\"{}\"", FORWARDING_EXTENSION_NAME);
        let mut args = vec![command, "-VMSwitchName", &switch_arg, "-Name", &name_arg];
        args.extend_from_slice(optionals);
        self.shell.run(&args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StubShell;

    #[tokio::test]
    async fn test_state_queries() {
        let shell = Arc::new(StubShell::new(true, true));
        let ext = ExtensionManager::new(shell.clone());

        assert!(ext.is_enabled("Layered Ethernet0").await.unwrap());
        assert!(ext.is_running("Layered Ethernet0").await.unwrap());

        shell.set_enabled(false);
        assert!(!ext.is_enabled("Layered Ethernet0").await.unwrap());
    }

    #[tokio::test]
    async fn test_enable_rechecks_state() {
        let shell = Arc::new(StubShell::new(false, true));
        let ext = ExtensionManager::new(shell.clone());

        ext.enable("Layered Ethernet0").await.unwrap();
        assert!(ext.is_enabled("Layered Ethernet0").await.unwrap());
    }

    #[tokio::test]
    async fn test_enable_fails_when_state_stays_disabled() {
        let shell = Arc::new(StubShell::new(false, true));
        shell.set_stuck_disabled(true);
        let ext = ExtensionManager::new(shell);

        let err = ext.enable("Layered Ethernet0").await.unwrap_err();
        assert!(matches!(err, GangplankError::NotEnabled(_)));
    }

    #[tokio::test]
    async fn test_disable() {
        let shell = Arc::new(StubShell::new(true, true));
        let ext = ExtensionManager::new(shell.clone());

        ext.disable("Layered Ethernet0").await.unwrap();
        assert!(!ext.is_enabled("Layered Ethernet0").await.unwrap());
    }
}
