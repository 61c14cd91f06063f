//! Runner configuration loaded from `config.yaml`.
//!
//! All keys are optional; zero values fall back to the documented defaults
//! (`ssh_port` 22, `services_path` "services", `forks` 5). Credential
//! fields may hold vault tokens, which are decrypted in place before use.

use serde::Deserialize;
use std::path::Path;

use crate::error::{Error, Result};
use crate::vault::{self, Vault};

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the static inventory file.
    pub inventory_file: String,
    /// Default SSH login user.
    pub ssh_user: String,
    /// Path to the SSH private key.
    pub ssh_key_path: String,
    /// SSH password (commonly a vault token).
    pub ssh_password: String,
    /// Remote SSH port.
    pub ssh_port: u16,
    /// Optional bastion in `host:port` form.
    pub jump_host: String,
    /// Known-hosts file enabling host-key verification.
    pub known_hosts_file: String,
    /// Base directory for service task files.
    pub services_path: String,
    /// Run on localhost without SSH.
    pub run_locally: bool,
    /// Parallel host connections.
    pub forks: usize,
    /// Abort dispatching new work after the first failure.
    pub fail_fast: bool,
    /// Optional log file, teed with stdout.
    pub log_file: String,
    /// Path to the vault password file.
    pub vault_password_file: String,
    /// Gather facts before running tasks.
    pub gather_facts: bool,
    /// Executable producing a JSON inventory on stdout.
    pub inventory_script: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inventory_file: String::new(),
            ssh_user: String::new(),
            ssh_key_path: String::new(),
            ssh_password: String::new(),
            ssh_port: 22,
            jump_host: String::new(),
            known_hosts_file: String::new(),
            services_path: "services".to_string(),
            run_locally: false,
            forks: 5,
            fail_fast: false,
            log_file: String::new(),
            vault_password_file: String::new(),
            gather_facts: false,
            inventory_script: String::new(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file, applying defaults for unset or
    /// zero-valued keys.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| Error::ConfigLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut cfg: Config = serde_yaml::from_str(&data).map_err(|e| Error::ConfigLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        if cfg.ssh_port == 0 {
            cfg.ssh_port = 22;
        }
        if cfg.services_path.is_empty() {
            cfg.services_path = "services".to_string();
        }
        if cfg.forks == 0 {
            cfg.forks = 5;
        }

        Ok(cfg)
    }

    /// Decrypt any vault-encrypted credential fields in place.
    pub fn decrypt_secrets(&mut self, vault: &Vault) -> Result<()> {
        for field in [
            &mut self.ssh_password,
            &mut self.ssh_key_path,
            &mut self.ssh_user,
        ] {
            if vault::is_encrypted(field) {
                *field = vault.decrypt(field)?;
            }
        }
        Ok(())
    }
}
