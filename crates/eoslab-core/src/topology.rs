//! The declarative topology: machine names and their interface bindings.
//!
//! The input YAML maps each machine name to a mapping of interface labels to
//! switch names:
//!
//! ```yaml
//! DC1-Spine-1:
//!     description: DC1-Spine1
//!     Ma1: Lab-vEOS
//!     E1: vEOS-DC1-1
//!     E2: vEOS-DC1-2
//! ```
//!
//! Labels are case-insensitive; `Ma<digit>` marks the management interface
//! and `E<digits>` a data interface. Anything else (like `description`)
//! binds nothing and is skipped by the provisioner, not rejected here.
//!
//! Labels are processed in plain string-sort order, so `E10` sorts before
//! `E2`. That matches the established lab naming convention and is kept
//! deliberately; with the 9-port ceiling it rarely matters in practice.

use std::collections::BTreeMap;

use crate::error::{ProvisionError, Result};

/// Interface label to switch name, in lexical label order.
pub type InterfaceMap = BTreeMap<String, String>;

/// Immutable mapping from machine name to its interface bindings.
///
/// Machines iterate in lexical name order, which is also the provisioning
/// order of a run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Topology {
    machines: BTreeMap<String, InterfaceMap>,
}

impl Topology {
    /// Parse a topology from YAML text.
    ///
    /// Validates structural shape only: a mapping of mappings with scalar
    /// string leaves. Interface-label semantics are interpreted later by the
    /// provisioner.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let doc: serde_yaml::Value = serde_yaml::from_str(text)?;
        let serde_yaml::Value::Mapping(top) = doc else {
            return Err(ProvisionError::Topology(
                "top level must be a mapping of machine names".to_string(),
            ));
        };

        let mut machines = BTreeMap::new();
        for (key, value) in top {
            let name = as_string(&key).ok_or_else(|| {
                ProvisionError::Topology("machine names must be strings".to_string())
            })?;
            let serde_yaml::Value::Mapping(entries) = value else {
                return Err(ProvisionError::Topology(format!(
                    "machine {name} must map interface labels to switch names"
                )));
            };
            let mut interfaces = InterfaceMap::new();
            for (label, switch) in &entries {
                let label = as_string(label).ok_or_else(|| {
                    ProvisionError::Topology(format!(
                        "machine {name} has a non-string interface label"
                    ))
                })?;
                let switch = as_string(switch).ok_or_else(|| {
                    ProvisionError::Topology(format!(
                        "machine {name} interface {label} must name a switch"
                    ))
                })?;
                interfaces.insert(label, switch);
            }
            machines.insert(name, interfaces);
        }
        Ok(Self { machines })
    }

    /// Machines in lexical name order.
    pub fn machines(&self) -> impl Iterator<Item = (&str, &InterfaceMap)> {
        self.machines.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of machines.
    pub fn len(&self) -> usize {
        self.machines.len()
    }

    /// Whether the topology has no machines.
    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }
}

fn as_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// True when the label names the management interface (`ma<digit>` token,
/// case-insensitive, anywhere in the label).
pub fn is_management_label(label: &str) -> bool {
    contains_token(label, "ma")
}

/// True when the label names a data interface (`e<digit>` token,
/// case-insensitive, anywhere in the label).
pub fn is_data_label(label: &str) -> bool {
    contains_token(label, "e")
}

fn contains_token(label: &str, prefix: &str) -> bool {
    let lower = label.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let prefix = prefix.as_bytes();
    bytes
        .windows(prefix.len() + 1)
        .any(|w| &w[..prefix.len()] == prefix && w[prefix.len()].is_ascii_digit())
}
