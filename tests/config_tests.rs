//! Tests for config loading, defaulting and vault-backed credential fields.

use convoy::config::Config;
use convoy::vault::{self, Vault};

#[test]
fn loads_config_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(
        &path,
        "inventory_file: hosts.ini\nssh_user: deploy\nssh_key_path: ~/.ssh/id_ed25519\n",
    )
    .unwrap();

    let cfg = Config::load(&path).unwrap();
    assert_eq!(cfg.inventory_file, "hosts.ini");
    assert_eq!(cfg.ssh_user, "deploy");
    assert_eq!(cfg.ssh_port, 22);
    assert_eq!(cfg.services_path, "services");
    assert_eq!(cfg.forks, 5);
}

#[test]
fn explicit_values_survive_defaulting() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(
        &path,
        "ssh_port: 2222\nservices_path: roles\nforks: 20\nfail_fast: true\n",
    )
    .unwrap();

    let cfg = Config::load(&path).unwrap();
    assert_eq!(cfg.ssh_port, 2222);
    assert_eq!(cfg.services_path, "roles");
    assert_eq!(cfg.forks, 20);
    assert!(cfg.fail_fast);
}

#[test]
fn missing_config_is_a_load_error() {
    let err = Config::load("/no/such/config.yaml").unwrap_err();
    assert!(err.is_load_error());
}

#[test]
fn invalid_yaml_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "ssh_port: [not a port\n").unwrap();

    assert!(Config::load(&path).unwrap_err().is_load_error());
}

#[test]
fn vaulted_password_decrypts_with_password_file() {
    let dir = tempfile::tempdir().unwrap();

    let token = Vault::new("pw").encrypt("s3cret").unwrap();
    let config_path = dir.path().join("config.yaml");
    std::fs::write(
        &config_path,
        format!("ssh_user: deploy\nssh_password: \"{}\"\n", token),
    )
    .unwrap();

    let password_path = dir.path().join("vault_pass");
    std::fs::write(&password_path, "pw\n").unwrap();

    let mut cfg = Config::load(&config_path).unwrap();
    let password = vault::load_password(&password_path).unwrap();
    cfg.decrypt_secrets(&Vault::new(password)).unwrap();

    assert_eq!(cfg.ssh_password, "s3cret");
    assert_eq!(cfg.ssh_user, "deploy");
}

#[test]
fn wrong_vault_password_fails_before_any_run() {
    let dir = tempfile::tempdir().unwrap();

    let token = Vault::new("pw").encrypt("s3cret").unwrap();
    let config_path = dir.path().join("config.yaml");
    std::fs::write(&config_path, format!("ssh_password: \"{}\"\n", token)).unwrap();

    let mut cfg = Config::load(&config_path).unwrap();
    assert!(cfg.decrypt_secrets(&Vault::new("not-the-password")).is_err());
}
