//! Error taxonomy for a provisioning run.
//!
//! Every variant is fatal: errors propagate to the top level and terminate
//! the run. A failure on one machine never continues to the next.

use thiserror::Error;

/// Result type alias for provisioning operations.
pub type Result<T> = std::result::Result<T, ProvisionError>;

/// Errors that can abort a provisioning run.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Could not authenticate or reach the host before provisioning began.
    #[error("could not connect to host: {0}")]
    Connection(String),

    /// The named datastore is absent from every reachable datacenter.
    #[error("datastore {0} not found on the host")]
    DatastoreNotFound(String),

    /// The host rejected a switch or port group create.
    #[error("reconciling switch {name} failed: {message}")]
    Reconcile {
        /// Switch name being reconciled
        name: String,
        /// The host's rejection message
        message: String,
    },

    /// An awaited asynchronous operation reported failure. Not retried.
    #[error("task {task} failed: {detail}")]
    Task {
        /// Host-side task identifier
        task: String,
        /// The host's failure detail
        detail: String,
    },

    /// Disk upload transport failure.
    #[error("disk upload for {machine} failed: {message}")]
    Transfer {
        /// Machine whose upload failed
        machine: String,
        /// Transport-level detail
        message: String,
    },

    /// The topology file is not valid YAML.
    #[error("topology file is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The topology parsed but is not a mapping of mappings-of-strings.
    #[error("invalid topology: {0}")]
    Topology(String),

    /// Transport-level host API failure.
    #[error(transparent)]
    Vim(#[from] eoslab_vim::VimError),

    /// Local filesystem failure (e.g. opening the disk image).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
