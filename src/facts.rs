//! System facts gathering.
//!
//! Facts are merged into the task variable scope (above host vars, below
//! registered results), so tasks can reference `{{ .os }}`, `{{ .distro }}`
//! and friends. Remote facts come from small best-effort shell probes; a
//! probe that fails simply omits its fact.

use indexmap::IndexMap;
use serde_json::Value;
use std::process::Command;

use crate::connection::{SshConfig, SshPool};
use crate::inventory::Host;
use crate::template::VarMap;

/// Facts gathered from a host.
#[derive(Debug, Clone, Default)]
pub struct Facts {
    data: IndexMap<String, Value>,
}

impl Facts {
    /// Create empty facts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a fact.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), Value::String(value.into()));
    }

    /// Get a fact.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Consume into a variable map for scope merging.
    pub fn into_map(self) -> VarMap {
        self.data
    }

    /// Gather facts from the local machine.
    pub fn gather_local() -> Self {
        let mut facts = Self::new();
        facts.set("inventory_hostname", "localhost");
        facts.set("os", std::env::consts::OS);
        facts.set("arch", std::env::consts::ARCH);

        if let Some(kernel) = local_probe("uname", &["-r"]) {
            facts.set("kernel", kernel);
        }
        if let Ok(hostname) = hostname::get() {
            facts.set("hostname", hostname.to_string_lossy());
        }
        if let Some(fqdn) = local_probe("hostname", &["-f"]) {
            facts.set("fqdn", fqdn);
        }

        facts
    }

    /// Gather facts from a remote host over a pooled SSH connection.
    pub async fn gather_remote(pool: &SshPool, host: &Host, cfg: &SshConfig) -> Self {
        let mut facts = Self::new();
        facts.set("inventory_hostname", host.address.clone());

        let probes: [(&str, String); 9] = [
            ("os", "uname -s | tr '[:upper:]' '[:lower:]'".into()),
            ("arch", "uname -m".into()),
            ("kernel", "uname -r".into()),
            (
                "hostname",
                format!("hostname 2>/dev/null || echo {}", host.address),
            ),
            (
                "fqdn",
                format!(
                    "hostname -f 2>/dev/null || hostname 2>/dev/null || echo {}",
                    host.address
                ),
            ),
            (
                "distro",
                "grep ^ID= /etc/os-release 2>/dev/null | cut -d= -f2 | tr -d '\"' || echo unknown"
                    .into(),
            ),
            (
                "distro_version",
                "grep ^VERSION_ID= /etc/os-release 2>/dev/null | cut -d= -f2 | tr -d '\"' || echo unknown"
                    .into(),
            ),
            (
                "cpu_count",
                "nproc 2>/dev/null || sysctl -n hw.ncpu 2>/dev/null || echo 1".into(),
            ),
            (
                "total_memory",
                "free -m 2>/dev/null | awk '/^Mem:/{print $2}' || echo unknown".into(),
            ),
        ];

        for (key, probe) in probes {
            if let Ok(out) = pool.run_command_output(&host.address, &probe, cfg).await {
                if out.success() {
                    facts.set(key, out.output.trim());
                }
            }
        }

        facts
    }
}

fn local_probe(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
