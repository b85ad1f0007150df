//! The per-machine provisioning state machine and the run loop.

use std::path::PathBuf;

use eoslab_vim::{DeviceSpec, Hypervisor, PortGroupSpec, VmShellSpec};

use crate::error::Result;
use crate::reconcile::ensure_switch;
use crate::topology::{is_data_label, is_management_label, InterfaceMap, Topology};
use crate::upload::upload_disk;
use crate::watch::wait_for_tasks;

/// ESXi caps a VM at 10 NICs; the management interface takes one, leaving 9
/// for data.
const MAX_DATA_NICS: usize = 9;

/// Settings shared by every machine in a run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Datastore receiving the VMX and disk images.
    pub datastore: String,
    /// Host address for the datastore upload endpoint.
    pub host_addr: String,
    /// Local path of the disk image, reused for every machine.
    pub disk_path: PathBuf,
    /// Verify TLS certificates on the upload path.
    pub verify_tls: bool,
}

/// Provisions machines one at a time against a single host.
pub struct Provisioner<'a> {
    host: &'a dyn Hypervisor,
    datastore: String,
}

impl<'a> Provisioner<'a> {
    /// A provisioner creating machines on the given datastore.
    pub fn new(host: &'a dyn Hypervisor, datastore: impl Into<String>) -> Self {
        Self {
            host,
            datastore: datastore.into(),
        }
    }

    /// Drive one machine through
    /// `SHELL_CREATE → DISK_ATTACH → MGMT_NIC_BIND → DATA_NIC_BIND → DONE`.
    ///
    /// Each stage's task is awaited before the next begins; the two NIC
    /// stages share one reconfiguration request, so a machine costs exactly
    /// three task-await cycles.
    pub async fn provision(&self, name: &str, interfaces: &InterfaceMap) -> Result<()> {
        // SHELL_CREATE
        tracing::info!(machine = %name, "creating VM shell");
        let task = self
            .host
            .create_vm(&VmShellSpec::new(name, &self.datastore))
            .await?;
        wait_for_tasks(self.host, &[task]).await?;

        // DISK_ATTACH
        tracing::info!(machine = %name, "attaching uploaded disk");
        let devices = vec![
            DeviceSpec::ide_controller(),
            DeviceSpec::disk(&self.datastore, name),
        ];
        let task = self.host.reconfigure_vm(name, &devices).await?;
        wait_for_tasks(self.host, &[task]).await?;

        // MGMT_NIC_BIND + DATA_NIC_BIND, one combined reconfiguration
        let devices = self.nic_devices(name, interfaces).await?;
        tracing::info!(machine = %name, nics = devices.len(), "binding network interfaces");
        let task = self.host.reconfigure_vm(name, &devices).await?;
        wait_for_tasks(self.host, &[task]).await?;

        tracing::info!(machine = %name, "machine provisioned");
        Ok(())
    }

    /// Build the NIC device list: management interface first (if any), then
    /// data interfaces in lexical label order up to the platform ceiling.
    /// Each referenced switch is reconciled before its NIC is added.
    async fn nic_devices(&self, name: &str, interfaces: &InterfaceMap) -> Result<Vec<DeviceSpec>> {
        let mut devices = Vec::new();

        // First management-matching label in lexical order wins.
        let management = interfaces
            .iter()
            .find(|(label, _)| is_management_label(label));
        match management {
            Some((label, switch)) => {
                tracing::info!(machine = %name, interface = %label, switch = %switch,
                    "binding management interface");
                ensure_switch(self.host, switch).await?;
                devices.push(DeviceSpec::nic(PortGroupSpec::for_switch(switch).name));
            }
            None => {
                tracing::warn!(machine = %name,
                    "no management interface in topology; machine will have no management NIC");
            }
        }

        let data: Vec<(&String, &String)> = interfaces
            .iter()
            .filter(|(label, _)| is_data_label(label))
            .filter(|(label, _)| Some(label.as_str()) != management.map(|(l, _)| l.as_str()))
            .collect();
        if data.len() > MAX_DATA_NICS {
            tracing::warn!(machine = %name, skipped = data.len() - MAX_DATA_NICS,
                "ESXi supports 10 interfaces per VM; ignoring additional data interfaces");
        }
        for (index, (label, switch)) in data.iter().take(MAX_DATA_NICS).enumerate() {
            tracing::info!(machine = %name, interface = %label, switch = %switch,
                port = index + 1, "binding data interface");
            ensure_switch(self.host, switch).await?;
            devices.push(DeviceSpec::nic(PortGroupSpec::for_switch(*switch).name));
        }
        Ok(devices)
    }
}

/// Provision every machine in the topology, in order: upload its disk image,
/// then run the machine's stage sequence. Strictly sequential; the first
/// error terminates the run with no attempt at later machines.
pub async fn run(host: &dyn Hypervisor, topology: &Topology, config: &RunConfig) -> Result<()> {
    let provisioner = Provisioner::new(host, &config.datastore);
    for (name, interfaces) in topology.machines() {
        upload_disk(
            host,
            &config.host_addr,
            &config.datastore,
            &config.disk_path,
            name,
            config.verify_tls,
        )
        .await?;
        provisioner.provision(name, interfaces).await?;
    }
    tracing::info!(machines = topology.len(), "lab generation complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use eoslab_vim::MockHost;
    use std::collections::BTreeMap;

    fn interfaces(pairs: &[(&str, &str)]) -> InterfaceMap {
        pairs
            .iter()
            .map(|(l, s)| (l.to_string(), s.to_string()))
            .collect::<BTreeMap<_, _>>()
    }

    fn nic_names(devices: &[DeviceSpec]) -> Vec<String> {
        devices
            .iter()
            .filter_map(|d| match d {
                DeviceSpec::Nic { port_group } => Some(port_group.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn machine_costs_exactly_three_await_cycles() {
        let host = MockHost::new();
        let provisioner = Provisioner::new(&host, "datastore1");
        provisioner
            .provision(
                "leaf1",
                &interfaces(&[("Ma1", "mgmt-sw"), ("E1", "fab-sw"), ("E2", "fab-sw")]),
            )
            .await
            .unwrap();

        assert_eq!(host.await_cycles(), 3);
        assert_eq!(host.filters_outstanding(), 0);
        assert_eq!(host.vm_creates().len(), 1);
        assert_eq!(host.vm_creates()[0].name, "leaf1");

        let reconfigs = host.reconfigs();
        assert_eq!(reconfigs.len(), 2);
        // disk stage: controller + disk
        assert_eq!(reconfigs[0].1.len(), 2);
        // NIC stage: one combined request, mgmt first then data in label order
        assert_eq!(
            nic_names(&reconfigs[1].1),
            vec!["mgmt-sw-PG", "fab-sw-PG", "fab-sw-PG"]
        );
    }

    #[tokio::test]
    async fn switch_referenced_twice_reconciles_once() {
        let host = MockHost::new();
        Provisioner::new(&host, "datastore1")
            .provision(
                "leaf1",
                &interfaces(&[("Ma1", "mgmt-sw"), ("E1", "fab-sw"), ("E2", "fab-sw")]),
            )
            .await
            .unwrap();

        let created: Vec<String> = host.switch_creates().iter().map(|s| s.name.clone()).collect();
        assert_eq!(created, vec!["mgmt-sw", "fab-sw"]);
        assert_eq!(host.port_group_creates().len(), 2);
    }

    #[tokio::test]
    async fn missing_management_interface_is_non_fatal() {
        let host = MockHost::new();
        Provisioner::new(&host, "datastore1")
            .provision("leaf1", &interfaces(&[("E1", "fab-sw")]))
            .await
            .unwrap();

        let reconfigs = host.reconfigs();
        assert_eq!(nic_names(&reconfigs[1].1), vec!["fab-sw-PG"]);
    }

    #[tokio::test]
    async fn data_interfaces_respect_platform_ceiling() {
        let host = MockHost::new();
        let pairs: Vec<(String, String)> = (1..=12)
            .map(|n| (format!("E{n:02}"), format!("sw-{n:02}")))
            .collect();
        let map: InterfaceMap = pairs.into_iter().collect();
        Provisioner::new(&host, "datastore1")
            .provision("leaf1", &map)
            .await
            .unwrap();

        let reconfigs = host.reconfigs();
        let nics = nic_names(&reconfigs[1].1);
        // 12 data labels: exactly 9 bound, 3 skipped, no error
        assert_eq!(nics.len(), 9);
        assert_eq!(nics[0], "sw-01-PG");
        assert_eq!(nics[8], "sw-09-PG");
    }

    #[tokio::test]
    async fn data_labels_bind_in_lexical_not_numeric_order() {
        let host = MockHost::new();
        Provisioner::new(&host, "datastore1")
            .provision(
                "leaf1",
                &interfaces(&[("E10", "sw-ten"), ("E2", "sw-two")]),
            )
            .await
            .unwrap();

        let reconfigs = host.reconfigs();
        // string sort puts E10 before E2
        assert_eq!(nic_names(&reconfigs[1].1), vec!["sw-ten-PG", "sw-two-PG"]);
    }

    #[tokio::test]
    async fn run_stops_at_the_first_failing_machine() {
        // No datastore on the host: leaf1's upload fails before its shell is
        // created, and leaf2 must never be attempted.
        let host = MockHost::new();
        let topology = Topology::from_yaml("leaf1:\n  Ma1: mgmt-sw\nleaf2:\n  Ma1: mgmt-sw\n")
            .unwrap();
        let config = RunConfig {
            datastore: "datastore1".to_string(),
            host_addr: "esxi01.lab".to_string(),
            disk_path: PathBuf::from("/nonexistent/disk.vmdk"),
            verify_tls: true,
        };

        let err = run(&host, &topology, &config).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::ProvisionError::DatastoreNotFound(ref d) if d == "datastore1"
        ));
        assert_eq!(host.vm_creates().len(), 0);
        assert_eq!(host.await_cycles(), 0);
    }

    #[tokio::test]
    async fn unrecognized_labels_bind_nothing() {
        let host = MockHost::new();
        Provisioner::new(&host, "datastore1")
            .provision(
                "leaf1",
                &interfaces(&[("description", "a spine switch"), ("Ma1", "mgmt-sw")]),
            )
            .await
            .unwrap();
        let reconfigs = host.reconfigs();
        assert_eq!(nic_names(&reconfigs[1].1), vec!["mgmt-sw-PG"]);
        // "a spine switch" must never be reconciled as a switch
        assert_eq!(host.switch_creates().len(), 1);
    }
}
