//! Scriptable in-memory host for exercising the provisioning core.
//!
//! Records every mutation so tests can assert on exactly which create calls
//! were issued, and serves task updates either from a scripted queue or by
//! auto-completing whatever the most recent filter covers.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Result, VimError};
use crate::task::{FilterHandle, TaskChange, TaskHandle, TaskState, UpdateBatch};
use crate::traits::Hypervisor;
use crate::types::{DatastoreLocator, DeviceSpec, PortGroupSpec, SwitchSpec, VmShellSpec};

/// In-memory [`Hypervisor`] double.
#[derive(Debug, Default)]
pub struct MockHost {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    switches: Vec<String>,
    datastores: Vec<String>,
    switch_creates: Vec<SwitchSpec>,
    port_group_creates: Vec<PortGroupSpec>,
    vm_creates: Vec<VmShellSpec>,
    reconfigs: Vec<(String, Vec<DeviceSpec>)>,
    scripted: VecDeque<UpdateBatch>,
    active_filter: Vec<TaskHandle>,
    filters_created: usize,
    filters_destroyed: usize,
    task_seq: usize,
    version_seq: usize,
    reject_switch: Option<String>,
}

impl MockHost {
    /// A host with no switches and no datastores.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing switch.
    pub fn with_switch(self, name: &str) -> Self {
        self.inner.lock().unwrap().switches.push(name.to_string());
        self
    }

    /// Seed an existing datastore.
    pub fn with_datastore(self, name: &str) -> Self {
        self.inner.lock().unwrap().datastores.push(name.to_string());
        self
    }

    /// Make every switch/port-group create call fault with `message`.
    pub fn rejecting_network_creates(self, message: &str) -> Self {
        self.inner.lock().unwrap().reject_switch = Some(message.to_string());
        self
    }

    /// Queue a scripted update batch; scripted batches are served before any
    /// auto-completion.
    pub fn push_update(&self, batch: UpdateBatch) {
        self.inner.lock().unwrap().scripted.push_back(batch);
    }

    /// Switch create calls issued so far.
    pub fn switch_creates(&self) -> Vec<SwitchSpec> {
        self.inner.lock().unwrap().switch_creates.clone()
    }

    /// Port group create calls issued so far.
    pub fn port_group_creates(&self) -> Vec<PortGroupSpec> {
        self.inner.lock().unwrap().port_group_creates.clone()
    }

    /// VM shell create calls issued so far.
    pub fn vm_creates(&self) -> Vec<VmShellSpec> {
        self.inner.lock().unwrap().vm_creates.clone()
    }

    /// Reconfiguration requests issued so far, as (vm name, devices).
    pub fn reconfigs(&self) -> Vec<(String, Vec<DeviceSpec>)> {
        self.inner.lock().unwrap().reconfigs.clone()
    }

    /// Number of task-await cycles, i.e. filters registered.
    pub fn await_cycles(&self) -> usize {
        self.inner.lock().unwrap().filters_created
    }

    /// Filters registered but not yet destroyed. Zero after every completed
    /// wait, success or failure.
    pub fn filters_outstanding(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.filters_created - inner.filters_destroyed
    }
}

#[async_trait]
impl Hypervisor for MockHost {
    async fn switch_names(&self) -> Result<Vec<String>> {
        Ok(self.inner.lock().unwrap().switches.clone())
    }

    async fn add_virtual_switch(&self, spec: &SwitchSpec) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(message) = &inner.reject_switch {
            return Err(VimError::Fault {
                method: "AddVirtualSwitch".to_string(),
                message: message.clone(),
            });
        }
        inner.switches.push(spec.name.clone());
        inner.switch_creates.push(spec.clone());
        Ok(())
    }

    async fn add_port_group(&self, spec: &PortGroupSpec) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(message) = &inner.reject_switch {
            return Err(VimError::Fault {
                method: "AddPortGroup".to_string(),
                message: message.clone(),
            });
        }
        inner.port_group_creates.push(spec.clone());
        Ok(())
    }

    async fn create_vm(&self, spec: &VmShellSpec) -> Result<TaskHandle> {
        let mut inner = self.inner.lock().unwrap();
        inner.vm_creates.push(spec.clone());
        inner.task_seq += 1;
        Ok(TaskHandle::new(format!("haTask-{}", inner.task_seq)))
    }

    async fn reconfigure_vm(&self, name: &str, devices: &[DeviceSpec]) -> Result<TaskHandle> {
        let mut inner = self.inner.lock().unwrap();
        inner.reconfigs.push((name.to_string(), devices.to_vec()));
        inner.task_seq += 1;
        Ok(TaskHandle::new(format!("haTask-{}", inner.task_seq)))
    }

    async fn find_datastore(&self, name: &str) -> Result<Option<DatastoreLocator>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .datastores
            .iter()
            .any(|d| d == name)
            .then(|| DatastoreLocator {
                datacenter: "ha-datacenter".to_string(),
                datastore: name.to_string(),
            }))
    }

    async fn create_task_filter(&self, tasks: &[TaskHandle]) -> Result<FilterHandle> {
        let mut inner = self.inner.lock().unwrap();
        inner.active_filter = tasks.to_vec();
        inner.filters_created += 1;
        Ok(FilterHandle::new(format!("filter-{}", inner.filters_created)))
    }

    async fn wait_for_updates(&self, _cursor: Option<&str>) -> Result<UpdateBatch> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(batch) = inner.scripted.pop_front() {
            return Ok(batch);
        }
        // No script: complete everything the current filter covers.
        let changes: Vec<TaskChange> = inner
            .active_filter
            .drain(..)
            .map(|task| TaskChange {
                task,
                state: TaskState::Success,
                detail: None,
            })
            .collect();
        inner.version_seq += 1;
        Ok(UpdateBatch {
            version: inner.version_seq.to_string(),
            changes,
        })
    }

    async fn destroy_filter(&self, _filter: FilterHandle) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.filters_destroyed += 1;
        inner.active_filter.clear();
        Ok(())
    }

    fn session_cookie(&self) -> Option<String> {
        None
    }
}
