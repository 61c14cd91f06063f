//! Convoy CLI entry point.
//!
//! Parses flags, prepares configuration (vault decryption, inventory
//! loading, logging) and dispatches to the play engine for playbook or
//! ad-hoc execution.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use convoy::config::Config;
use convoy::error::{Error, Result};
use convoy::executor::{run_local_ad_hoc, PlayEngine, RunOptions};
use convoy::inventory::{dynamic, Inventory};
use convoy::playbook::load_playbook;
use convoy::vault::{self, Vault};

/// Convoy - agentless remote automation over SSH.
#[derive(Parser, Debug)]
#[command(name = "convoy")]
#[command(version)]
#[command(about = "Run playbooks and ad-hoc commands across many hosts over SSH")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "./config.yaml")]
    config: PathBuf,

    /// Playbook file to execute
    #[arg(long)]
    playbook: Option<PathBuf>,

    /// Ad-hoc task / command to run
    #[arg(short = 't', long = "task")]
    task: Option<String>,

    /// Group to run the ad-hoc task on
    #[arg(short = 'g', long = "group")]
    group: Option<String>,

    /// Run locally without SSH (overrides run_locally in config)
    #[arg(long)]
    local: bool,

    /// Print tasks without executing them
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Abort dispatching new work on the first failure
    #[arg(long = "fail-fast")]
    fail_fast: bool,

    /// Parallel host connections (0 = use config default)
    #[arg(long, default_value_t = 0)]
    forks: usize,

    /// Comma-separated tags to run
    #[arg(long)]
    tags: Option<String>,

    /// Comma-separated tags to skip
    #[arg(long = "skip-tags")]
    skip_tags: Option<String>,

    /// Optional log file path (teed with stdout)
    #[arg(long = "log-file")]
    log_file: Option<PathBuf>,

    /// Path to file containing the vault decryption password
    #[arg(long = "vault-password-file")]
    vault_password_file: Option<PathBuf>,

    /// Gather host facts before running tasks
    #[arg(long = "gather-facts")]
    gather_facts: bool,

    /// Path to executable that returns a JSON inventory
    #[arg(long = "inventory-script")]
    inventory_script: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    if cli.task.is_none() && cli.playbook.is_none() {
        return Err(Error::Usage(
            "nothing to do: pass --playbook <file> or -t <command> (see --help)".into(),
        ));
    }

    // Local execution needs no config or inventory.
    if cli.local {
        init_logging(cli.log_file.as_deref())?;

        let opts = RunOptions {
            run_locally: true,
            dry_run: cli.dry_run,
            fail_fast: cli.fail_fast,
            forks: cli.forks,
            tags: parse_tags(cli.tags.as_deref()),
            skip_tags: parse_tags(cli.skip_tags.as_deref()),
            gather_facts: cli.gather_facts,
            ..Default::default()
        };

        if let Some(command) = &cli.task {
            return run_local_ad_hoc(command).await;
        }
        if let Some(playbook_file) = &cli.playbook {
            let playbook = load_playbook(playbook_file)?;
            return PlayEngine::new(opts).run_playbook(&playbook, None).await;
        }
        return Ok(());
    }

    // SSH / config-driven execution.
    let mut cfg = Config::load(&cli.config)?;

    let log_file = cli
        .log_file
        .clone()
        .or_else(|| (!cfg.log_file.is_empty()).then(|| PathBuf::from(&cfg.log_file)));
    init_logging(log_file.as_deref())?;

    // Decrypt vaulted config fields before they are used anywhere.
    let vault_password_file = cli
        .vault_password_file
        .clone()
        .or_else(|| (!cfg.vault_password_file.is_empty()).then(|| PathBuf::from(&cfg.vault_password_file)));
    if let Some(password_file) = vault_password_file {
        let password = vault::load_password(&password_file)?;
        cfg.decrypt_secrets(&Vault::new(password))?;
    }

    if cfg.known_hosts_file.is_empty() {
        warn!("no known_hosts_file configured: SSH host-key verification is disabled");
    }

    // Dynamic inventory script takes precedence over the static file.
    let script = cli
        .inventory_script
        .clone()
        .map(|p| p.display().to_string())
        .or_else(|| (!cfg.inventory_script.is_empty()).then(|| cfg.inventory_script.clone()));
    let inventory = match script {
        Some(script) => dynamic::load_dynamic(&script)?,
        None => Inventory::from_file(&cfg.inventory_file)?,
    };

    let forks = if cli.forks > 0 { cli.forks } else { cfg.forks };

    let opts = RunOptions {
        ssh_user: cfg.ssh_user.clone(),
        ssh_key_path: (!cfg.ssh_key_path.is_empty()).then(|| PathBuf::from(&cfg.ssh_key_path)),
        ssh_password: (!cfg.ssh_password.is_empty()).then(|| cfg.ssh_password.clone()),
        ssh_port: cfg.ssh_port,
        jump_host: (!cfg.jump_host.is_empty()).then(|| cfg.jump_host.clone()),
        known_hosts_file: (!cfg.known_hosts_file.is_empty())
            .then(|| PathBuf::from(&cfg.known_hosts_file)),
        services_path: PathBuf::from(&cfg.services_path),
        run_locally: cfg.run_locally,
        dry_run: cli.dry_run,
        fail_fast: cli.fail_fast || cfg.fail_fast,
        forks,
        tags: parse_tags(cli.tags.as_deref()),
        skip_tags: parse_tags(cli.skip_tags.as_deref()),
        gather_facts: cli.gather_facts || cfg.gather_facts,
    };

    if let Some(command) = &cli.task {
        let group = cli.group.as_deref().ok_or_else(|| {
            Error::Usage("a group must be specified with -g for ad hoc tasks".into())
        })?;
        return PlayEngine::new(opts)
            .run_ad_hoc(&inventory, group, command)
            .await;
    }

    if let Some(playbook_file) = &cli.playbook {
        let playbook = load_playbook(playbook_file)?;
        return PlayEngine::new(opts)
            .run_playbook(&playbook, Some(&inventory))
            .await;
    }

    Ok(())
}

/// Initialise tracing: stdout always, teed to a log file when given.
fn init_logging(log_file: Option<&std::path::Path>) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer());

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            registry
                .with(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
                .init();
        }
        None => registry.init(),
    }
    Ok(())
}

fn parse_tags(raw: Option<&str>) -> Vec<String> {
    match raw {
        Some(raw) if !raw.is_empty() => raw
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}
