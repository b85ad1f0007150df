//! # eoslab-core
//!
//! Provisioning orchestrator for vEOS lab topologies on a single ESXi host.
//!
//! Turns a declarative [`Topology`] into a sequence of idempotent
//! infrastructure operations: switches and port groups are reconciled, a
//! disk image is uploaded per machine, and each machine is driven through
//! shell-create, disk-attach, and NIC-bind stages, awaiting the host's
//! asynchronous task for every stage.
//!
//! ```text
//! Topology ──▶ run()
//!               │  per machine, strictly sequential
//!               ├── upload_disk()          one image copy per machine
//!               └── Provisioner::provision()
//!                     ├── SHELL_CREATE  ──▶ wait_for_tasks()
//!                     ├── DISK_ATTACH   ──▶ wait_for_tasks()
//!                     └── NIC_BIND      ──▶ wait_for_tasks()
//!                           └── ensure_switch() per referenced switch
//! ```
//!
//! All host access goes through the `eoslab_vim::Hypervisor` trait; the
//! binary wires in `EsxiClient`, the tests wire in `MockHost`.

pub mod error;
pub mod provision;
pub mod reconcile;
pub mod topology;
pub mod upload;
pub mod watch;

pub use error::{ProvisionError, Result};
pub use provision::{run, Provisioner, RunConfig};
pub use reconcile::ensure_switch;
pub use topology::{InterfaceMap, Topology};
pub use upload::upload_disk;
pub use watch::wait_for_tasks;
