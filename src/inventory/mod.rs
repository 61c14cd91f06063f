//! Inventory model: host groups and their variables.
//!
//! The static format is INI-style: `[group]` opens a host section,
//! `[group:vars]` opens a group-variable section, `#` starts a comment.
//! Host lines are whitespace-separated with the address first and
//! `key=value` per-host variables after it. A host may appear in any number
//! of groups; the model enforces no uniqueness.

pub mod dynamic;

use indexmap::IndexMap;
use std::path::Path;

use crate::error::{Error, Result};

/// A single target host with optional per-host variables.
///
/// The reserved variable keys `ansible_user`, `ssh_user`, `ansible_port`
/// and `ssh_port` override connection parameters for this host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Host {
    /// Address used to reach the host (name or IP).
    pub address: String,
    /// Per-host variables.
    pub vars: IndexMap<String, String>,
}

impl Host {
    /// Create a host with no variables.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            vars: IndexMap::new(),
        }
    }
}

/// Parsed host groups and group-level variables.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    /// Ordered hosts per group.
    pub hosts: IndexMap<String, Vec<Host>>,
    /// Group-level variables.
    pub group_vars: IndexMap<String, IndexMap<String, String>>,
}

impl Inventory {
    /// Load an inventory from an INI-style file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| Error::InventoryLoad {
            source_name: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::parse(&data))
    }

    /// Parse inventory text.
    pub fn parse(input: &str) -> Self {
        let mut inv = Inventory::default();
        let mut group = String::new();
        let mut vars_section = false;

        for raw in input.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(inner) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                if let Some(name) = inner.strip_suffix(":vars") {
                    group = name.to_string();
                    vars_section = true;
                } else {
                    group = inner.to_string();
                    vars_section = false;
                }
                continue;
            }
            if group.is_empty() {
                continue;
            }

            if vars_section {
                let (key, value) = split_key_value(line);
                inv.group_vars
                    .entry(group.clone())
                    .or_default()
                    .insert(key, value);
            } else {
                inv.hosts
                    .entry(group.clone())
                    .or_default()
                    .push(parse_host_line(line));
            }
        }

        inv
    }

    /// All hosts of a group, or `None` when the group is unknown.
    pub fn group(&self, name: &str) -> Option<&[Host]> {
        self.hosts.get(name).map(|v| v.as_slice())
    }
}

/// Parse a host entry such as `192.168.1.10 ssh_port=2222 ansible_user=admin`.
fn parse_host_line(line: &str) -> Host {
    let mut fields = line.split_whitespace();
    let mut host = Host::new(fields.next().unwrap_or_default());
    for field in fields {
        let (key, value) = split_key_value(field);
        host.vars.insert(key, value);
    }
    host
}

fn split_key_value(field: &str) -> (String, String) {
    match field.split_once('=') {
        Some((k, v)) => (k.trim().to_string(), v.trim().to_string()),
        None => (field.trim().to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# production inventory
[webservers]
192.168.1.10 ssh_port=2222 ansible_user=admin
192.168.1.11

[webservers:vars]
env=production
role = frontend

[dbservers]
db1.internal
"#;

    #[test]
    fn parses_groups_hosts_and_vars() {
        let inv = Inventory::parse(SAMPLE);

        let web = inv.group("webservers").unwrap();
        assert_eq!(web.len(), 2);
        assert_eq!(web[0].address, "192.168.1.10");
        assert_eq!(web[0].vars.get("ssh_port").map(String::as_str), Some("2222"));
        assert_eq!(
            web[0].vars.get("ansible_user").map(String::as_str),
            Some("admin")
        );
        assert!(web[1].vars.is_empty());

        let vars = inv.group_vars.get("webservers").unwrap();
        assert_eq!(vars.get("env").map(String::as_str), Some("production"));
        assert_eq!(vars.get("role").map(String::as_str), Some("frontend"));

        assert_eq!(inv.group("dbservers").unwrap()[0].address, "db1.internal");
        assert!(inv.group("missing").is_none());
    }

    #[test]
    fn comments_and_blank_lines_ignored() {
        let inv = Inventory::parse("# nothing\n\n[g]\n# still nothing\nh1\n");
        assert_eq!(inv.group("g").unwrap().len(), 1);
    }

    #[test]
    fn lines_before_any_group_are_ignored() {
        let inv = Inventory::parse("stray-host\n[g]\nh1\n");
        assert_eq!(inv.hosts.len(), 1);
        assert_eq!(inv.group("g").unwrap()[0].address, "h1");
    }
}
