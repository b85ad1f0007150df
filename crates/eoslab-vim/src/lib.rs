//! # eoslab-vim
//!
//! ESXi host interface layer for the EOS lab provisioner.
//!
//! The provisioning logic in `eoslab-core` never talks to the vSphere SOAP
//! API directly. It works against the narrow [`Hypervisor`] trait defined
//! here, passing small tagged configuration records ([`SwitchSpec`],
//! [`PortGroupSpec`], [`VmShellSpec`], [`DeviceSpec`]) and receiving
//! [`TaskHandle`]s for the host's asynchronous operations.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Hypervisor trait             │
//! │ (switch_names, create_vm, wait_for_     │
//! │  updates, find_datastore, ...)          │
//! └──────────────────┬──────────────────────┘
//!                    │
//!        ┌───────────┴───────────┐
//!        ▼                       ▼
//! ┌──────────────┐       ┌──────────────┐
//! │  EsxiClient  │       │   MockHost   │
//! │ (SOAP, live) │       │   (tests)    │
//! └──────────────┘       └──────────────┘
//! ```
//!
//! [`EsxiClient`] is a deliberately thin wrapper: hand-written request
//! envelopes against a single host's `/sdk` endpoint, response scraping with
//! `quick-xml`, and a session cookie captured at login. [`MockHost`] records
//! every mutation and lets tests script task-update batches.

pub mod error;
pub mod esxi;
pub mod mock;
pub mod task;
pub mod traits;
pub mod types;
mod xml;

pub use error::{Result, VimError};
pub use esxi::EsxiClient;
pub use mock::MockHost;
pub use task::{FilterHandle, TaskChange, TaskHandle, TaskState, UpdateBatch};
pub use traits::Hypervisor;
pub use types::{
    DatastoreLocator, DeviceSpec, PortGroupSpec, SwitchSpec, VmShellSpec, DISK_FILE_NAME,
};
