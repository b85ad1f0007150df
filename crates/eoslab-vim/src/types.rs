//! Tagged configuration records passed to the [`Hypervisor`] trait.
//!
//! The provisioner describes what it wants (a switch, a port group, a VM
//! shell, a device change) with these plain records; how each maps onto the
//! host SDK's object graph is the backend's business.
//!
//! [`Hypervisor`]: crate::traits::Hypervisor

/// Fixed file name of the uploaded disk image inside each machine's
/// datastore folder.
pub const DISK_FILE_NAME: &str = "vEOS-lab.vmdk";

/// Suffix appended to a switch name to form its port group name.
pub const PORT_GROUP_SUFFIX: &str = "-PG";

/// A standard virtual switch on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchSpec {
    /// Switch name, unique per host.
    pub name: String,
    /// Number of ports on the switch.
    pub num_ports: u32,
    /// MTU, sized for jumbo frames between lab switches.
    pub mtu: u32,
}

impl SwitchSpec {
    /// A lab switch with the fixed port count and MTU.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            num_ports: 32,
            mtu: 9000,
        }
    }
}

/// A port group bound to a switch, carrying the lab's permissive security
/// policy.
///
/// The guest network OS originates traffic from MACs that do not match its
/// primary NIC, so promiscuous mode, MAC changes, and forged transmits must
/// all be accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortGroupSpec {
    /// Port group name (`<switch>-PG`).
    pub name: String,
    /// Name of the switch this group attaches to.
    pub switch_name: String,
    /// VLAN ID; 4095 is the trunk-all sentinel.
    pub vlan_id: u16,
    /// Accept promiscuous mode on attached ports.
    pub allow_promiscuous: bool,
    /// Accept guest-initiated MAC address changes.
    pub allow_mac_changes: bool,
    /// Accept frames with a forged source MAC.
    pub allow_forged_transmits: bool,
}

impl PortGroupSpec {
    /// The port group derived from a switch name by the fixed naming
    /// convention.
    pub fn for_switch(switch_name: impl Into<String>) -> Self {
        let switch_name = switch_name.into();
        Self {
            name: format!("{switch_name}{PORT_GROUP_SUFFIX}"),
            switch_name,
            vlan_id: 4095,
            allow_promiscuous: true,
            allow_mac_changes: true,
            allow_forged_transmits: true,
        }
    }
}

/// A bare VM shell: no devices, fixed sizing, VMX directory derived from the
/// machine name by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmShellSpec {
    /// Machine name from the topology.
    pub name: String,
    /// Memory in MiB.
    pub memory_mib: u32,
    /// vCPU count.
    pub num_cpus: u32,
    /// Guest OS identifier the host should assume.
    pub guest_id: String,
    /// Virtual hardware version.
    pub hardware_version: String,
    /// Datastore holding the VMX; the path is left at `[ds] ` so the host
    /// creates a directory named after the VM.
    pub datastore: String,
}

impl VmShellSpec {
    /// The fixed lab shell for a machine.
    pub fn new(name: impl Into<String>, datastore: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            memory_mib: 2048,
            num_cpus: 1,
            guest_id: "rhel6_64Guest".to_string(),
            hardware_version: "vmx-07".to_string(),
            datastore: datastore.into(),
        }
    }
}

/// One device to add in a VM reconfiguration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSpec {
    /// IDE controller the disk hangs off.
    IdeController {
        /// Device key, referenced by the disk's `controller_key`.
        key: i32,
        /// IDE bus number.
        bus: i32,
        /// Unit number on the parent controller.
        unit: i32,
        /// PCI slot the controller occupies.
        pci_slot: i32,
    },
    /// Virtual disk backed by the previously uploaded image file.
    Disk {
        /// Key of the controller this disk attaches to.
        controller_key: i32,
        /// Unit number on the controller.
        unit: i32,
        /// Datastore holding the backing file.
        datastore: String,
        /// Folder within the datastore (the machine name).
        folder: String,
    },
    /// E1000 NIC backed by a port group, generated MAC, connected at boot.
    Nic {
        /// Name of the backing port group.
        port_group: String,
    },
}

impl DeviceSpec {
    /// The single IDE controller every lab machine gets.
    pub fn ide_controller() -> Self {
        DeviceSpec::IdeController {
            key: 200,
            bus: 0,
            unit: 1,
            pci_slot: 16,
        }
    }

    /// The machine's disk, backed by `[datastore] <machine>/vEOS-lab.vmdk`.
    pub fn disk(datastore: impl Into<String>, machine: impl Into<String>) -> Self {
        DeviceSpec::Disk {
            controller_key: 200,
            unit: 0,
            datastore: datastore.into(),
            folder: machine.into(),
        }
    }

    /// A NIC bound to the named port group.
    pub fn nic(port_group: impl Into<String>) -> Self {
        DeviceSpec::Nic {
            port_group: port_group.into(),
        }
    }
}

/// Where a named datastore was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatastoreLocator {
    /// Datacenter path, as the upload URL's `dcPath` parameter expects.
    pub datacenter: String,
    /// Datastore name, as the upload URL's `dsName` parameter expects.
    pub datastore: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_group_name_derived_from_switch() {
        let pg = PortGroupSpec::for_switch("fab-sw");
        assert_eq!(pg.name, "fab-sw-PG");
        assert_eq!(pg.switch_name, "fab-sw");
        assert_eq!(pg.vlan_id, 4095);
        assert!(pg.allow_promiscuous && pg.allow_mac_changes && pg.allow_forged_transmits);
    }

    #[test]
    fn switch_spec_fixed_attributes() {
        let sw = SwitchSpec::new("mgmt-sw");
        assert_eq!(sw.num_ports, 32);
        assert_eq!(sw.mtu, 9000);
    }

    #[test]
    fn shell_spec_fixed_sizing() {
        let shell = VmShellSpec::new("leaf1", "datastore1");
        assert_eq!(shell.memory_mib, 2048);
        assert_eq!(shell.num_cpus, 1);
        assert_eq!(shell.guest_id, "rhel6_64Guest");
    }

    #[test]
    fn disk_attaches_to_ide_controller() {
        let ctlr = DeviceSpec::ide_controller();
        let disk = DeviceSpec::disk("datastore1", "leaf1");
        let (DeviceSpec::IdeController { key, .. }, DeviceSpec::Disk { controller_key, .. }) =
            (&ctlr, &disk)
        else {
            panic!("wrong variants");
        };
        assert_eq!(key, controller_key);
    }
}
