//! Dynamic inventory: run an external executable and parse its JSON output.
//!
//! The script must print a JSON object of the shape
//!
//! ```json
//! {
//!   "webservers": { "hosts": ["192.168.1.10", "192.168.1.11"],
//!                   "vars": {"env": "production"} },
//!   "dbservers":  { "hosts": ["192.168.1.20"] }
//! }
//! ```
//!
//! A non-zero exit status or unparsable output is an inventory load error.

use indexmap::IndexMap;
use serde::Deserialize;
use std::process::Command;

use super::{Host, Inventory};
use crate::error::{Error, Result};

/// One group entry in the dynamic inventory JSON.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DynamicGroup {
    /// Host addresses in this group.
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Group-level variables.
    #[serde(default)]
    pub vars: IndexMap<String, String>,
}

/// Execute `script` and parse its stdout as a JSON inventory.
pub fn load_dynamic(script: &str) -> Result<Inventory> {
    let output = Command::new(script)
        .output()
        .map_err(|e| Error::InventoryLoad {
            source_name: script.to_string(),
            message: format!("running inventory script: {}", e),
        })?;

    if !output.status.success() {
        return Err(Error::InventoryLoad {
            source_name: script.to_string(),
            message: format!(
                "inventory script exited with status {}",
                output.status.code().unwrap_or(-1)
            ),
        });
    }

    let raw: IndexMap<String, DynamicGroup> =
        serde_json::from_slice(&output.stdout).map_err(|e| Error::InventoryLoad {
            source_name: script.to_string(),
            message: format!("parsing inventory JSON: {}", e),
        })?;

    let mut inv = Inventory::default();
    for (group, data) in raw {
        let hosts = data.hosts.into_iter().map(Host::new).collect();
        inv.hosts.insert(group.clone(), hosts);
        if !data.vars.is_empty() {
            inv.group_vars.insert(group, data.vars);
        }
    }
    Ok(inv)
}
