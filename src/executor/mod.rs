//! Play execution engine.
//!
//! Orchestrates hosts x services x tasks: resolves the target host set per
//! play, fans one worker out per host under a `forks`-sized semaphore, runs
//! each host's tasks strictly in order, fires notified handlers, and folds
//! every worker's counters into a shared recap. Fail-fast stops dispatching
//! new work at service and play boundaries; workers already admitted always
//! run to completion.

pub mod task;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::connection::{SshConfig, SshPool};
use crate::error::{Error, Result};
use crate::facts::Facts;
use crate::inventory::{Host, Inventory};
use crate::output::{self, HostSummary};
use crate::playbook::{Handler, Playbook, Task};
use crate::services;
use crate::template::{merge_vars, string_vars, VarMap};

pub use task::{execute_task, TaskOutcome};

/// Default parallelism bound.
pub const DEFAULT_FORKS: usize = 5;

/// Consolidated execution parameters for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Default SSH login user.
    pub ssh_user: String,
    /// Private key path.
    pub ssh_key_path: Option<PathBuf>,
    /// SSH password.
    pub ssh_password: Option<String>,
    /// Default SSH port.
    pub ssh_port: u16,
    /// Optional bastion in `host:port` form.
    pub jump_host: Option<String>,
    /// Known-hosts file for host-key verification.
    pub known_hosts_file: Option<PathBuf>,
    /// Base directory for service task files.
    pub services_path: PathBuf,
    /// Run on localhost without SSH.
    pub run_locally: bool,
    /// Announce only, no side effects.
    pub dry_run: bool,
    /// Stop dispatching new work after the first failure.
    pub fail_fast: bool,
    /// Parallelism bound (0 means the default).
    pub forks: usize,
    /// Only run tasks carrying one of these tags.
    pub tags: Vec<String>,
    /// Never run tasks carrying one of these tags.
    pub skip_tags: Vec<String>,
    /// Gather facts before running tasks.
    pub gather_facts: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            ssh_user: String::new(),
            ssh_key_path: None,
            ssh_password: None,
            ssh_port: 22,
            jump_host: None,
            known_hosts_file: None,
            services_path: PathBuf::from(services::DEFAULT_SERVICES_PATH),
            run_locally: false,
            dry_run: false,
            fail_fast: false,
            forks: DEFAULT_FORKS,
            tags: Vec::new(),
            skip_tags: Vec::new(),
            gather_facts: false,
        }
    }
}

/// Build the SSH config for a host, applying the reserved per-host variable
/// overrides (`ansible_user`/`ssh_user`, `ansible_port`/`ssh_port`).
pub fn ssh_config_for(host: &Host, opts: &RunOptions) -> SshConfig {
    let mut cfg = SshConfig {
        user: opts.ssh_user.clone(),
        key_path: opts.ssh_key_path.clone(),
        password: opts.ssh_password.clone(),
        port: opts.ssh_port,
        jump_host: opts.jump_host.clone(),
        known_hosts_file: opts.known_hosts_file.clone(),
    };
    for key in ["ansible_user", "ssh_user"] {
        if let Some(user) = host.vars.get(key) {
            cfg.user = user.clone();
        }
    }
    for key in ["ansible_port", "ssh_port"] {
        if let Some(port) = host.vars.get(key).and_then(|p| p.parse().ok()) {
            cfg.port = port;
        }
    }
    cfg
}

/// Tag filter: skip-tags always win, then an empty filter matches
/// everything, otherwise at least one tag must intersect the filter.
pub fn matches_tags(tags: &[String], filter: &[String], skip: &[String]) -> bool {
    if tags.iter().any(|t| skip.contains(t)) {
        return false;
    }
    if filter.is_empty() {
        return true;
    }
    tags.iter().any(|t| filter.contains(t))
}

/// Shared recap state, guarded by one mutex.
#[derive(Default)]
struct RecapState {
    summaries: IndexMap<String, HostSummary>,
    overall_failed: bool,
}

impl RecapState {
    fn absorb(&mut self, summary: HostSummary) {
        if summary.failed > 0 {
            self.overall_failed = true;
        }
        self.summaries
            .entry(summary.host.clone())
            .or_insert_with(|| HostSummary::new(&summary.host))
            .merge(&summary);
    }
}

/// The play execution engine. Owns the SSH pool for the whole run and
/// closes it exactly once at the end.
pub struct PlayEngine {
    opts: Arc<RunOptions>,
    pool: Arc<SshPool>,
}

impl PlayEngine {
    /// Create an engine; a forks value of 0 falls back to the default.
    pub fn new(mut opts: RunOptions) -> Self {
        if opts.forks == 0 {
            opts.forks = DEFAULT_FORKS;
        }
        Self {
            opts: Arc::new(opts),
            pool: Arc::new(SshPool::new()),
        }
    }

    /// Execute a full playbook and print the PLAY RECAP.
    ///
    /// The recap is printed even when a play aborts on a load error. The
    /// result is an error when any host recorded a non-ignored failure.
    pub async fn run_playbook(
        &self,
        playbook: &Playbook,
        inventory: Option<&Inventory>,
    ) -> Result<()> {
        let recap = Arc::new(Mutex::new(RecapState::default()));
        let run = self.run_plays(playbook, inventory, &recap).await;

        let recap = recap.lock().await;
        let summaries: Vec<_> = recap.summaries.values().cloned().collect();
        output::recap(&summaries);
        self.pool.close().await;

        run?;
        if recap.overall_failed {
            return Err(Error::RunFailed("playbook completed with errors".into()));
        }
        Ok(())
    }

    async fn run_plays(
        &self,
        playbook: &Playbook,
        inventory: Option<&Inventory>,
        recap: &Arc<Mutex<RecapState>>,
    ) -> Result<()> {
        let opts = &self.opts;

        'plays: for play in playbook {
            if !matches_tags(&play.tags, &opts.tags, &opts.skip_tags) {
                debug!(play = %play.name, "play filtered out by tags");
                continue;
            }

            output::play_header(&play.name);

            let (hosts, group_vars) = if opts.run_locally {
                (vec![Host::new("localhost")], VarMap::new())
            } else {
                let inventory = inventory.ok_or_else(|| {
                    Error::Usage("an inventory is required unless running locally".into())
                })?;
                match inventory.group(&play.hosts) {
                    Some(hosts) => {
                        let group_vars = inventory
                            .group_vars
                            .get(&play.hosts)
                            .map(string_vars)
                            .unwrap_or_default();
                        (hosts.to_vec(), group_vars)
                    }
                    None => {
                        warn!(group = %play.hosts, "no hosts found for group");
                        println!("No hosts found for group: {}", play.hosts);
                        continue;
                    }
                }
            };

            let local_facts = if opts.gather_facts && opts.run_locally {
                Some(Facts::gather_local().into_map())
            } else {
                None
            };

            // Handlers fire at most once per (host, play), even when several
            // services notify them.
            let handlers_fired = Arc::new(Mutex::new(HashSet::<String>::new()));

            let play_vars = Arc::new(play.vars.clone());
            let group_vars = Arc::new(group_vars);
            let handlers: Arc<[Handler]> = play.handlers.clone().into();

            for service in &play.services {
                info!(service = %service.name, play = %play.name, "running service");
                let tasks: Arc<[Task]> =
                    services::load_tasks_with_deps(&opts.services_path, &service.name)?.into();

                self.run_service_wave(
                    &hosts,
                    &tasks,
                    &handlers,
                    &play_vars,
                    &group_vars,
                    local_facts.as_ref(),
                    &handlers_fired,
                    recap,
                )
                .await;

                if opts.fail_fast && recap.lock().await.overall_failed {
                    break 'plays;
                }
            }
        }

        Ok(())
    }

    /// Run one service on every host of the play, bounded by `forks`.
    /// Returns once all workers have drained.
    #[allow(clippy::too_many_arguments)]
    async fn run_service_wave(
        &self,
        hosts: &[Host],
        tasks: &Arc<[Task]>,
        handlers: &Arc<[Handler]>,
        play_vars: &Arc<VarMap>,
        group_vars: &Arc<VarMap>,
        local_facts: Option<&VarMap>,
        handlers_fired: &Arc<Mutex<HashSet<String>>>,
        recap: &Arc<Mutex<RecapState>>,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.opts.forks));

        let workers: Vec<_> = hosts
            .iter()
            .cloned()
            .map(|host| {
                let tasks = Arc::clone(tasks);
                let handlers = Arc::clone(handlers);
                let play_vars = Arc::clone(play_vars);
                let group_vars = Arc::clone(group_vars);
                let local_facts = local_facts.cloned();
                let handlers_fired = Arc::clone(handlers_fired);
                let recap = Arc::clone(recap);
                let semaphore = Arc::clone(&semaphore);
                let opts = Arc::clone(&self.opts);
                let pool = Arc::clone(&self.pool);

                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.unwrap();

                    output::host_header(&host.address);

                    let facts = if opts.gather_facts {
                        if opts.run_locally {
                            local_facts.unwrap_or_default()
                        } else {
                            let cfg = ssh_config_for(&host, &opts);
                            Facts::gather_remote(&pool, &host, &cfg).await.into_map()
                        }
                    } else {
                        VarMap::new()
                    };

                    let host_vars = string_vars(&host.vars);
                    let mut vars =
                        merge_vars(&[&*play_vars, &*group_vars, &host_vars, &facts]);

                    let summary = run_host_tasks(
                        &host,
                        &tasks,
                        &handlers,
                        &opts,
                        &pool,
                        &mut vars,
                        &handlers_fired,
                    )
                    .await;

                    recap.lock().await.absorb(summary);
                })
            })
            .collect();

        join_all(workers).await;
    }

    /// Run a single ad-hoc command against every host of a group.
    pub async fn run_ad_hoc(
        &self,
        inventory: &Inventory,
        group: &str,
        command: &str,
    ) -> Result<()> {
        let hosts = inventory
            .group(group)
            .ok_or_else(|| Error::GroupNotFound(group.to_string()))?
            .to_vec();

        output::task_header(&format!("ad hoc: {}", command));

        let task = Arc::new(Task::command("ad hoc", command));
        let failed = Arc::new(Mutex::new(false));
        let semaphore = Arc::new(Semaphore::new(self.opts.forks));

        let workers: Vec<_> = hosts
            .into_iter()
            .map(|host| {
                let task = Arc::clone(&task);
                let failed = Arc::clone(&failed);
                let semaphore = Arc::clone(&semaphore);
                let opts = Arc::clone(&self.opts);
                let pool = Arc::clone(&self.pool);

                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.unwrap();
                    output::host_header(&host.address);

                    let outcome =
                        execute_task(&task, &host, &opts, &pool, &VarMap::new()).await;
                    match outcome.error {
                        Some(error) => {
                            output::failed(&host.address, &error.to_string());
                            *failed.lock().await = true;
                        }
                        None => output::ok(&host.address, &outcome.result.output),
                    }
                })
            })
            .collect();

        join_all(workers).await;
        self.pool.close().await;

        if *failed.lock().await {
            return Err(Error::RunFailed(
                "ad hoc command failed on one or more hosts".into(),
            ));
        }
        Ok(())
    }
}

/// Run a single ad-hoc command locally, without SSH or an inventory.
pub async fn run_local_ad_hoc(command: &str) -> Result<()> {
    output::task_header(&format!("local ad hoc: {}", command));

    let task = Task::command("local ad hoc", command);
    let host = Host::new("localhost");
    let opts = RunOptions {
        run_locally: true,
        ..Default::default()
    };
    let pool = SshPool::new();

    let outcome = execute_task(&task, &host, &opts, &pool, &VarMap::new()).await;
    match outcome.error {
        Some(error) => {
            output::failed("localhost", &error.to_string());
            Err(error)
        }
        None => {
            output::ok("localhost", &outcome.result.output);
            Ok(())
        }
    }
}

/// Run a host's tasks strictly in order, then its notified handlers in
/// declaration order. Returns the per-host counters for this service.
async fn run_host_tasks(
    host: &Host,
    tasks: &[Task],
    handlers: &[Handler],
    opts: &RunOptions,
    pool: &SshPool,
    vars: &mut VarMap,
    handlers_fired: &Mutex<HashSet<String>>,
) -> HostSummary {
    let mut summary = HostSummary::new(&host.address);
    let mut notified: HashSet<String> = HashSet::new();

    for task in tasks {
        if !matches_tags(&task.tags, &opts.tags, &opts.skip_tags) {
            summary.skipped += 1;
            continue;
        }

        output::task_header(&task.name);

        let outcome = execute_task(task, host, opts, pool, vars).await;

        if !task.register.is_empty() {
            vars.insert(
                task.register.clone(),
                Value::String(outcome.result.output.clone()),
            );
            output::register_note(&task.register, &outcome.result.output);
        }

        match outcome.error {
            Some(error) if task.ignore_errors => {
                output::ignored(&host.address, &error.to_string());
                summary.ignored += 1;
            }
            Some(error) => {
                output::failed(&host.address, &error.to_string());
                summary.failed += 1;
                if opts.fail_fast {
                    return summary;
                }
            }
            None => {
                let result = &outcome.result;
                if !result.changed
                    && !result.failed
                    && !task.when.is_empty()
                    && result.output.is_empty()
                {
                    output::skipped(&host.address);
                    summary.skipped += 1;
                } else if result.changed {
                    output::changed(&host.address, &result.output);
                    summary.changed += 1;
                    if !task.notify.is_empty() {
                        notified.insert(task.notify.clone());
                    }
                } else {
                    output::ok(&host.address, &result.output);
                    summary.ok += 1;
                    if !task.notify.is_empty() {
                        notified.insert(task.notify.clone());
                    }
                }
            }
        }
    }

    for handler in handlers {
        if !notified.contains(&handler.name) {
            continue;
        }
        {
            let mut fired = handlers_fired.lock().await;
            if !fired.insert(format!("{}\u{1f}{}", host.address, handler.name)) {
                continue;
            }
        }

        output::handler_header(&handler.name);
        let handler_task = Task::command(&handler.name, &handler.command);
        let outcome = execute_task(&handler_task, host, opts, pool, vars).await;
        match outcome.error {
            Some(error) => {
                output::failed(&host.address, &error.to_string());
                summary.failed += 1;
            }
            None if outcome.result.changed => {
                output::changed(&host.address, &outcome.result.output);
                summary.changed += 1;
            }
            None => {
                output::ok(&host.address, &outcome.result.output);
                summary.ok += 1;
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_filter_runs_untagged_tasks() {
        assert!(matches_tags(&[], &[], &[]));
        assert!(matches_tags(&tags(&["a"]), &[], &[]));
    }

    #[test]
    fn filter_requires_intersection() {
        let filter = tags(&["install"]);
        assert!(matches_tags(&tags(&["install", "web"]), &filter, &[]));
        assert!(!matches_tags(&tags(&["deploy"]), &filter, &[]));
        assert!(!matches_tags(&[], &filter, &[]));
    }

    #[test]
    fn skip_tags_beat_filter() {
        let filter = tags(&["install"]);
        let skip = tags(&["install"]);
        assert!(!matches_tags(&tags(&["install"]), &filter, &skip));
        assert!(!matches_tags(&tags(&["install"]), &[], &skip));
    }

    #[test]
    fn host_var_overrides_apply_to_ssh_config() {
        let opts = RunOptions {
            ssh_user: "deploy".into(),
            ssh_port: 22,
            ..Default::default()
        };

        let mut host = Host::new("web1");
        host.vars.insert("ansible_user".into(), "admin".into());
        host.vars.insert("ssh_port".into(), "2222".into());

        let cfg = ssh_config_for(&host, &opts);
        assert_eq!(cfg.user, "admin");
        assert_eq!(cfg.port, 2222);
    }

    #[test]
    fn bad_port_override_is_ignored() {
        let opts = RunOptions {
            ssh_user: "deploy".into(),
            ..Default::default()
        };
        let mut host = Host::new("web1");
        host.vars.insert("ssh_port".into(), "not-a-port".into());

        assert_eq!(ssh_config_for(&host, &opts).port, 22);
    }
}
