//! End-to-end provisioning scenario against the mock host.

use eoslab_core::{Provisioner, Topology};
use eoslab_vim::{DeviceSpec, MockHost};

#[tokio::test]
async fn single_leaf_scenario() {
    let topology = Topology::from_yaml(
        "leaf1:\n  Ma1: mgmt-sw\n  E1: fab-sw\n  E2: fab-sw\n",
    )
    .unwrap();

    let host = MockHost::new();
    let provisioner = Provisioner::new(&host, "datastore1");
    for (name, interfaces) in topology.machines() {
        provisioner.provision(name, interfaces).await.unwrap();
    }

    // each referenced switch reconciled exactly once, fab-sw despite two
    // references
    let creates = host.switch_creates();
    let created: Vec<&str> = creates.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(created, vec!["mgmt-sw", "fab-sw"]);
    assert_eq!(host.port_group_creates().len(), 2);

    // one machine shell
    let vms = host.vm_creates();
    assert_eq!(vms.len(), 1);
    assert_eq!(vms[0].name, "leaf1");
    assert_eq!(vms[0].memory_mib, 2048);

    // two reconfigurations: disk stage, then one combined NIC stage
    let reconfigs = host.reconfigs();
    assert_eq!(reconfigs.len(), 2);

    let disks = reconfigs[0]
        .1
        .iter()
        .filter(|d| matches!(d, DeviceSpec::Disk { .. }))
        .count();
    assert_eq!(disks, 1);

    let nics: Vec<&str> = reconfigs[1]
        .1
        .iter()
        .filter_map(|d| match d {
            DeviceSpec::Nic { port_group } => Some(port_group.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(nics, vec!["mgmt-sw-PG", "fab-sw-PG", "fab-sw-PG"]);

    // exactly three task-await cycles, every filter released
    assert_eq!(host.await_cycles(), 3);
    assert_eq!(host.filters_outstanding(), 0);
}
