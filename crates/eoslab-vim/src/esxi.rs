//! SOAP backend for a single ESXi host.
//!
//! This is deliberately a thin wrapper: hand-written request envelopes
//! POSTed to the host's `/sdk` endpoint, a session cookie captured at login,
//! and response scraping via the `xml` module. It targets hostd directly
//! (not vCenter), so the well-known fixed managed object IDs apply.

use reqwest::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};

use crate::error::{Result, VimError};
use crate::task::{FilterHandle, TaskHandle, UpdateBatch};
use crate::traits::Hypervisor;
use crate::types::{
    DatastoreLocator, DeviceSpec, PortGroupSpec, SwitchSpec, VmShellSpec, DISK_FILE_NAME,
};
use crate::xml;
use async_trait::async_trait;

// Fixed hostd managed object IDs.
const MOID_SESSION_MANAGER: &str = "ha-sessionmgr";
const MOID_PROPERTY_COLLECTOR: &str = "ha-property-collector";
const MOID_NETWORK_SYSTEM: &str = "networkSystem";
const MOID_HOST: &str = "ha-host";
const MOID_VM_FOLDER: &str = "ha-folder-vm";
const MOID_ROOT_POOL: &str = "ha-root-pool";
const MOID_SEARCH_INDEX: &str = "ha-searchindex";
const MOID_DATACENTER: &str = "ha-datacenter";

const SOAP_ACTION: &str = "urn:vim25/6.7";

/// An authenticated session against one ESXi host.
#[derive(Debug, Clone)]
pub struct EsxiClient {
    http: reqwest::Client,
    endpoint: String,
    cookie: String,
}

impl EsxiClient {
    /// Connect and authenticate against `host:port`.
    ///
    /// With `verify_tls` disabled no certificate validation occurs at all;
    /// lab hosts are routinely self-signed.
    pub async fn connect(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        verify_tls: bool,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!verify_tls)
            .build()?;
        let endpoint = format!("https://{host}:{port}/sdk");

        let body = format!(
            "<Login xmlns=\"urn:vim25\">\
               <_this type=\"SessionManager\">{MOID_SESSION_MANAGER}</_this>\
               <userName>{}</userName>\
               <password>{}</password>\
             </Login>",
            xml::escape(username),
            xml::escape(password),
        );

        let resp = http
            .post(&endpoint)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", SOAP_ACTION)
            .body(envelope(&body))
            .send()
            .await?;

        let cookie = resp
            .headers()
            .get(SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
        let text = resp.text().await?;

        if let Some(message) = xml::fault_message(&text) {
            return Err(VimError::Auth(message));
        }
        let cookie = cookie.ok_or_else(|| {
            VimError::Auth("host accepted login but issued no session cookie".to_string())
        })?;

        tracing::debug!(endpoint = %endpoint, "authenticated against host");
        Ok(Self {
            http,
            endpoint,
            cookie,
        })
    }

    /// Terminate the session. Errors are reported, not fatal.
    pub async fn logout(&self) {
        let body = format!(
            "<Logout xmlns=\"urn:vim25\">\
               <_this type=\"SessionManager\">{MOID_SESSION_MANAGER}</_this>\
             </Logout>"
        );
        if let Err(e) = self.call("Logout", &body).await {
            tracing::warn!(error = %e, "logout failed");
        }
    }

    /// POST one method envelope and return the raw response body, mapping
    /// SOAP faults to [`VimError::Fault`].
    async fn call(&self, method: &str, body: &str) -> Result<String> {
        let resp = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", SOAP_ACTION)
            .header(COOKIE, &self.cookie)
            .body(envelope(body))
            .send()
            .await?;
        let text = resp.text().await?;
        if let Some(message) = xml::fault_message(&text) {
            return Err(VimError::Fault {
                method: method.to_string(),
                message,
            });
        }
        Ok(text)
    }

    /// Resolve a VM's managed object reference by inventory path.
    async fn find_vm(&self, name: &str) -> Result<String> {
        let body = format!(
            "<FindByInventoryPath xmlns=\"urn:vim25\">\
               <_this type=\"SearchIndex\">{MOID_SEARCH_INDEX}</_this>\
               <inventoryPath>{MOID_DATACENTER}/vm/{}</inventoryPath>\
             </FindByInventoryPath>",
            xml::escape(name),
        );
        let resp = self.call("FindByInventoryPath", &body).await?;
        xml::first_text(&resp, "returnval")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| VimError::parse("FindByInventoryPath", format!("VM {name} not found")))
    }
}

#[async_trait]
impl Hypervisor for EsxiClient {
    async fn switch_names(&self) -> Result<Vec<String>> {
        let body = format!(
            "<RetrievePropertiesEx xmlns=\"urn:vim25\">\
               <_this type=\"PropertyCollector\">{MOID_PROPERTY_COLLECTOR}</_this>\
               <specSet>\
                 <propSet><type>HostNetworkSystem</type><all>false</all>\
                   <pathSet>networkInfo.vswitch</pathSet></propSet>\
                 <objectSet><obj type=\"HostNetworkSystem\">{MOID_NETWORK_SYSTEM}</obj></objectSet>\
               </specSet>\
               <options/>\
             </RetrievePropertiesEx>"
        );
        let resp = self.call("RetrievePropertiesEx", &body).await?;
        Ok(xml::texts_within(&resp, "HostVirtualSwitch", "name"))
    }

    async fn add_virtual_switch(&self, spec: &SwitchSpec) -> Result<()> {
        let body = format!(
            "<AddVirtualSwitch xmlns=\"urn:vim25\">\
               <_this type=\"HostNetworkSystem\">{MOID_NETWORK_SYSTEM}</_this>\
               <vswitchName>{}</vswitchName>\
               <spec><numPorts>{}</numPorts><mtu>{}</mtu></spec>\
             </AddVirtualSwitch>",
            xml::escape(&spec.name),
            spec.num_ports,
            spec.mtu,
        );
        self.call("AddVirtualSwitch", &body).await?;
        Ok(())
    }

    async fn add_port_group(&self, spec: &PortGroupSpec) -> Result<()> {
        let body = format!(
            "<AddPortGroup xmlns=\"urn:vim25\">\
               <_this type=\"HostNetworkSystem\">{MOID_NETWORK_SYSTEM}</_this>\
               <portgrp>\
                 <name>{}</name>\
                 <vlanId>{}</vlanId>\
                 <vswitchName>{}</vswitchName>\
                 <policy><security>\
                   <allowPromiscuous>{}</allowPromiscuous>\
                   <macChanges>{}</macChanges>\
                   <forgedTransmits>{}</forgedTransmits>\
                 </security></policy>\
               </portgrp>\
             </AddPortGroup>",
            xml::escape(&spec.name),
            spec.vlan_id,
            xml::escape(&spec.switch_name),
            spec.allow_promiscuous,
            spec.allow_mac_changes,
            spec.allow_forged_transmits,
        );
        self.call("AddPortGroup", &body).await?;
        Ok(())
    }

    async fn create_vm(&self, spec: &VmShellSpec) -> Result<TaskHandle> {
        let body = format!(
            "<CreateVM_Task xmlns=\"urn:vim25\">\
               <_this type=\"Folder\">{MOID_VM_FOLDER}</_this>\
               <config>\
                 <name>{}</name>\
                 <version>{}</version>\
                 <guestId>{}</guestId>\
                 <files><vmPathName>[{}] </vmPathName></files>\
                 <numCPUs>{}</numCPUs>\
                 <memoryMB>{}</memoryMB>\
               </config>\
               <pool type=\"ResourcePool\">{MOID_ROOT_POOL}</pool>\
             </CreateVM_Task>",
            xml::escape(&spec.name),
            xml::escape(&spec.hardware_version),
            xml::escape(&spec.guest_id),
            xml::escape(&spec.datastore),
            spec.num_cpus,
            spec.memory_mib,
        );
        let resp = self.call("CreateVM_Task", &body).await?;
        xml::first_text(&resp, "returnval")
            .map(TaskHandle::new)
            .ok_or_else(|| VimError::parse("CreateVM_Task", "no task reference returned"))
    }

    async fn reconfigure_vm(&self, name: &str, devices: &[DeviceSpec]) -> Result<TaskHandle> {
        let vm_ref = self.find_vm(name).await?;
        let mut changes = String::new();
        for device in devices {
            changes.push_str(&device_change_xml(device));
        }
        let body = format!(
            "<ReconfigVM_Task xmlns=\"urn:vim25\" \
                xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">\
               <_this type=\"VirtualMachine\">{}</_this>\
               <spec>{changes}</spec>\
             </ReconfigVM_Task>",
            xml::escape(&vm_ref),
        );
        let resp = self.call("ReconfigVM_Task", &body).await?;
        xml::first_text(&resp, "returnval")
            .map(TaskHandle::new)
            .ok_or_else(|| VimError::parse("ReconfigVM_Task", "no task reference returned"))
    }

    async fn find_datastore(&self, name: &str) -> Result<Option<DatastoreLocator>> {
        // Datastore refs reachable from the host...
        let body = format!(
            "<RetrievePropertiesEx xmlns=\"urn:vim25\">\
               <_this type=\"PropertyCollector\">{MOID_PROPERTY_COLLECTOR}</_this>\
               <specSet>\
                 <propSet><type>HostSystem</type><all>false</all>\
                   <pathSet>datastore</pathSet></propSet>\
                 <objectSet><obj type=\"HostSystem\">{MOID_HOST}</obj></objectSet>\
               </specSet>\
               <options/>\
             </RetrievePropertiesEx>"
        );
        let resp = self.call("RetrievePropertiesEx", &body).await?;
        let refs = xml::texts_within(&resp, "val", "ManagedObjectReference");
        if refs.is_empty() {
            return Ok(None);
        }

        // ...then their names, matched against the requested one.
        let object_set: String = refs
            .iter()
            .map(|r| format!("<objectSet><obj type=\"Datastore\">{}</obj></objectSet>", xml::escape(r)))
            .collect();
        let body = format!(
            "<RetrievePropertiesEx xmlns=\"urn:vim25\">\
               <_this type=\"PropertyCollector\">{MOID_PROPERTY_COLLECTOR}</_this>\
               <specSet>\
                 <propSet><type>Datastore</type><all>false</all>\
                   <pathSet>summary.name</pathSet></propSet>\
                 {object_set}\
               </specSet>\
               <options/>\
             </RetrievePropertiesEx>"
        );
        let resp = self.call("RetrievePropertiesEx", &body).await?;
        let found = xml::texts_within(&resp, "propSet", "val")
            .into_iter()
            .any(|n| n == name);
        Ok(found.then(|| DatastoreLocator {
            datacenter: MOID_DATACENTER.to_string(),
            datastore: name.to_string(),
        }))
    }

    async fn create_task_filter(&self, tasks: &[TaskHandle]) -> Result<FilterHandle> {
        let object_set: String = tasks
            .iter()
            .map(|t| format!("<objectSet><obj type=\"Task\">{}</obj></objectSet>", xml::escape(t.id())))
            .collect();
        let body = format!(
            "<CreateFilter xmlns=\"urn:vim25\">\
               <_this type=\"PropertyCollector\">{MOID_PROPERTY_COLLECTOR}</_this>\
               <spec>\
                 <propSet><type>Task</type><all>true</all></propSet>\
                 {object_set}\
               </spec>\
               <partialUpdates>true</partialUpdates>\
             </CreateFilter>"
        );
        let resp = self.call("CreateFilter", &body).await?;
        xml::first_text(&resp, "returnval")
            .map(FilterHandle::new)
            .ok_or_else(|| VimError::parse("CreateFilter", "no filter reference returned"))
    }

    async fn wait_for_updates(&self, cursor: Option<&str>) -> Result<UpdateBatch> {
        let version = cursor
            .map(|v| format!("<version>{}</version>", xml::escape(v)))
            .unwrap_or_default();
        let body = format!(
            "<WaitForUpdatesEx xmlns=\"urn:vim25\">\
               <_this type=\"PropertyCollector\">{MOID_PROPERTY_COLLECTOR}</_this>\
               {version}\
               <options/>\
             </WaitForUpdatesEx>"
        );
        let resp = self.call("WaitForUpdatesEx", &body).await?;
        xml::parse_update_batch(&resp, "WaitForUpdatesEx")
    }

    async fn destroy_filter(&self, filter: FilterHandle) -> Result<()> {
        let body = format!(
            "<DestroyPropertyFilter xmlns=\"urn:vim25\">\
               <_this type=\"PropertyFilter\">{}</_this>\
             </DestroyPropertyFilter>",
            xml::escape(filter.id()),
        );
        self.call("DestroyPropertyFilter", &body).await?;
        Ok(())
    }

    fn session_cookie(&self) -> Option<String> {
        Some(self.cookie.clone())
    }
}

fn envelope(body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <soapenv:Envelope \
            xmlns:soapenv=\"http://schemas.xmlsoap.org/soap/envelope/\" \
            xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" \
            xmlns:xsd=\"http://www.w3.org/2001/XMLSchema\">\
           <soapenv:Body>{body}</soapenv:Body>\
         </soapenv:Envelope>"
    )
}

/// Render one `deviceChange` entry of a reconfiguration spec.
fn device_change_xml(device: &DeviceSpec) -> String {
    let device_xml = match device {
        DeviceSpec::IdeController {
            key,
            bus,
            unit,
            pci_slot,
        } => format!(
            "<device xsi:type=\"VirtualIDEController\">\
               <key>{key}</key>\
               <slotInfo xsi:type=\"VirtualDevicePciBusSlotInfo\">\
                 <pciSlotNumber>{pci_slot}</pciSlotNumber>\
               </slotInfo>\
               <controllerKey>{key}</controllerKey>\
               <unitNumber>{unit}</unitNumber>\
               <busNumber>{bus}</busNumber>\
             </device>"
        ),
        DeviceSpec::Disk {
            controller_key,
            unit,
            datastore,
            folder,
        } => format!(
            "<device xsi:type=\"VirtualDisk\">\
               <key>-1</key>\
               <backing xsi:type=\"VirtualDiskFlatVer2BackingInfo\">\
                 <fileName>[{}] {}/{DISK_FILE_NAME}</fileName>\
                 <diskMode>persistent</diskMode>\
               </backing>\
               <controllerKey>{controller_key}</controllerKey>\
               <unitNumber>{unit}</unitNumber>\
             </device>",
            xml::escape(datastore),
            xml::escape(folder),
        ),
        DeviceSpec::Nic { port_group } => format!(
            "<device xsi:type=\"VirtualE1000\">\
               <key>-1</key>\
               <backing xsi:type=\"VirtualEthernetCardNetworkBackingInfo\">\
                 <deviceName>{}</deviceName>\
               </backing>\
               <connectable>\
                 <startConnected>true</startConnected>\
                 <allowGuestControl>true</allowGuestControl>\
                 <connected>false</connected>\
               </connectable>\
               <addressType>generated</addressType>\
             </device>",
            xml::escape(port_group),
        ),
    };
    format!("<deviceChange><operation>add</operation>{device_xml}</deviceChange>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_backing_uses_per_machine_folder() {
        let xml = device_change_xml(&DeviceSpec::disk("datastore1", "leaf1"));
        assert!(xml.contains("<fileName>[datastore1] leaf1/vEOS-lab.vmdk</fileName>"));
        assert!(xml.contains("<diskMode>persistent</diskMode>"));
    }

    #[test]
    fn nic_is_generated_mac_and_connected_at_boot() {
        let xml = device_change_xml(&DeviceSpec::nic("fab-sw-PG"));
        assert!(xml.contains("<deviceName>fab-sw-PG</deviceName>"));
        assert!(xml.contains("<addressType>generated</addressType>"));
        assert!(xml.contains("<startConnected>true</startConnected>"));
    }

    #[test]
    fn device_names_are_escaped() {
        let xml = device_change_xml(&DeviceSpec::nic("a<b>&c"));
        assert!(xml.contains("a&lt;b&gt;&amp;c"));
    }
}
