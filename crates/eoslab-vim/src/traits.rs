//! The narrow host interface the provisioning core is written against.

use crate::error::Result;
use crate::task::{FilterHandle, TaskHandle, UpdateBatch};
use crate::types::{DatastoreLocator, DeviceSpec, SwitchSpec, VmShellSpec};
use async_trait::async_trait;

use crate::types::PortGroupSpec;

/// One authenticated hypervisor host.
///
/// The handle is threaded explicitly through every operation so the core can
/// be exercised against [`MockHost`](crate::mock::MockHost) in tests.
/// Network-configuration calls are synchronous on the host agent; VM-level
/// calls return a [`TaskHandle`] to be awaited through the filter methods.
#[async_trait]
pub trait Hypervisor: Send + Sync {
    /// Names of the virtual switches currently configured on the host.
    async fn switch_names(&self) -> Result<Vec<String>>;

    /// Create a standard virtual switch. Synchronous on the host agent.
    async fn add_virtual_switch(&self, spec: &SwitchSpec) -> Result<()>;

    /// Create a port group on an existing switch. Synchronous on the host
    /// agent.
    async fn add_port_group(&self, spec: &PortGroupSpec) -> Result<()>;

    /// Create a VM shell with no devices. Returns the host's task.
    async fn create_vm(&self, spec: &VmShellSpec) -> Result<TaskHandle>;

    /// Add devices to an existing VM in one reconfiguration request.
    /// Returns the host's task.
    async fn reconfigure_vm(&self, name: &str, devices: &[DeviceSpec]) -> Result<TaskHandle>;

    /// Locate a datastore by name across the reachable datacenters.
    async fn find_datastore(&self, name: &str) -> Result<Option<DatastoreLocator>>;

    /// Register a change-notification subscription covering all property
    /// changes on the given tasks.
    async fn create_task_filter(&self, tasks: &[TaskHandle]) -> Result<FilterHandle>;

    /// Block until the host reports changes newer than `cursor` (`None`
    /// means from the beginning). The single suspension point of a wait.
    async fn wait_for_updates(&self, cursor: Option<&str>) -> Result<UpdateBatch>;

    /// Release a change-notification subscription.
    async fn destroy_filter(&self, filter: FilterHandle) -> Result<()>;

    /// The raw session cookie, for authenticated datastore HTTP access.
    /// `None` when the backend carries no real session (the mock).
    fn session_cookie(&self) -> Option<String>;
}
