//! Idempotent switch and port group reconciliation.

use eoslab_vim::{Hypervisor, PortGroupSpec, SwitchSpec};

use crate::error::{ProvisionError, Result};

/// Ensure the named switch (and its `-PG` port group) exists on the host.
///
/// Lists the host's current switches first; if the name is already present
/// the call is a no-op. Host rejection of either create call surfaces as
/// [`ProvisionError::Reconcile`] and is not retried. Both create calls are
/// synchronous on the host agent, so there is no task to await.
pub async fn ensure_switch(host: &dyn Hypervisor, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ProvisionError::Reconcile {
            name: String::new(),
            message: "switch name must not be empty".to_string(),
        });
    }

    let existing = host.switch_names().await?;
    if existing.iter().any(|s| s == name) {
        tracing::info!(switch = %name, "switch exists, using existing");
        return Ok(());
    }

    tracing::info!(switch = %name, "switch does not exist, creating");
    let spec = SwitchSpec::new(name);
    host.add_virtual_switch(&spec)
        .await
        .map_err(|e| reconcile_error(name, e))?;

    let pg = PortGroupSpec::for_switch(name);
    tracing::info!(switch = %name, port_group = %pg.name, "creating port group");
    host.add_port_group(&pg)
        .await
        .map_err(|e| reconcile_error(name, e))?;
    Ok(())
}

fn reconcile_error(name: &str, source: eoslab_vim::VimError) -> ProvisionError {
    ProvisionError::Reconcile {
        name: name.to_string(),
        message: source.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eoslab_vim::MockHost;

    #[tokio::test]
    async fn creates_switch_and_port_group_when_absent() {
        let host = MockHost::new();
        ensure_switch(&host, "fab-sw").await.unwrap();

        let creates = host.switch_creates();
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0].name, "fab-sw");
        assert_eq!(creates[0].num_ports, 32);
        assert_eq!(creates[0].mtu, 9000);

        let pgs = host.port_group_creates();
        assert_eq!(pgs.len(), 1);
        assert_eq!(pgs[0].name, "fab-sw-PG");
        assert_eq!(pgs[0].vlan_id, 4095);
    }

    #[tokio::test]
    async fn second_call_is_a_no_op() {
        let host = MockHost::new();
        ensure_switch(&host, "fab-sw").await.unwrap();
        ensure_switch(&host, "fab-sw").await.unwrap();
        // exactly one underlying create invocation
        assert_eq!(host.switch_creates().len(), 1);
        assert_eq!(host.port_group_creates().len(), 1);
    }

    #[tokio::test]
    async fn preseeded_switch_is_reused() {
        let host = MockHost::new().with_switch("mgmt-sw");
        ensure_switch(&host, "mgmt-sw").await.unwrap();
        assert!(host.switch_creates().is_empty());
        assert!(host.port_group_creates().is_empty());
    }

    #[tokio::test]
    async fn host_rejection_surfaces_as_reconcile_error() {
        let host = MockHost::new().rejecting_network_creates("duplicate port group name");
        let err = ensure_switch(&host, "fab-sw").await.unwrap_err();
        match err {
            ProvisionError::Reconcile { name, message } => {
                assert_eq!(name, "fab-sw");
                assert!(message.contains("duplicate port group name"));
            }
            other => panic!("expected Reconcile, got {other}"),
        }
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let host = MockHost::new();
        assert!(ensure_switch(&host, "").await.is_err());
        assert!(host.switch_creates().is_empty());
    }
}
