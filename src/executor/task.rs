//! Single-task execution: conditions, loops, timeouts, retries and the
//! command/copy/script backends.
//!
//! The pipeline is evaluated strictly in this order: the `when` gate, the
//! `with_items` expansion, then per iteration an invocation that substitutes
//! variables and dispatches to the right backend, wrapped first in the
//! `timeout` deadline and then in the `retries` loop.

use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use super::{ssh_config_for, RunOptions};
use crate::connection::{CommandOutput, SshPool};
use crate::error::{Error, Result};
use crate::inventory::Host;
use crate::output;
use crate::playbook::{Task, TaskResult};
use crate::template::{self, VarMap};

/// A task result together with the error that caused a failure, if any.
///
/// The play engine classifies on the error (failed vs ignored) while still
/// having access to partial output for `register`.
#[derive(Debug, Default)]
pub struct TaskOutcome {
    /// The (possibly partial) task result.
    pub result: TaskResult,
    /// The error that failed the task, when there was one.
    pub error: Option<Error>,
}

impl TaskOutcome {
    fn ok(result: TaskResult) -> Self {
        Self {
            result,
            error: None,
        }
    }

    fn failed(result: TaskResult, error: Error) -> Self {
        Self {
            result,
            error: Some(error),
        }
    }
}

/// Execute one task against one host.
///
/// A falsy `when` yields an empty, error-free outcome which the caller
/// treats as skipped. With `with_items`, iteration outputs are concatenated
/// and `changed` flags are OR-ed; the first non-ignored failure aborts the
/// remaining iterations.
pub async fn execute_task(
    task: &Task,
    host: &Host,
    opts: &RunOptions,
    pool: &SshPool,
    vars: &VarMap,
) -> TaskOutcome {
    match template::evaluate_condition(&task.when, vars) {
        Ok(true) => {}
        Ok(false) => return TaskOutcome::default(),
        Err(e) => {
            return TaskOutcome::failed(
                TaskResult {
                    failed: true,
                    ..Default::default()
                },
                e,
            );
        }
    }

    if task.with_items.is_empty() {
        return run_iteration(task, host, opts, pool, vars.clone()).await;
    }

    let mut combined = TaskResult::default();
    for item in &task.with_items {
        let mut iter_vars = vars.clone();
        iter_vars.insert("item".to_string(), item.clone());

        let outcome = run_iteration(task, host, opts, pool, iter_vars).await;
        combined.output.push_str(&outcome.result.output);
        if outcome.result.changed {
            combined.changed = true;
        }
        if let Some(error) = outcome.error {
            combined.failed = true;
            if !task.ignore_errors {
                return TaskOutcome::failed(combined, error);
            }
        }
    }
    TaskOutcome::ok(combined)
}

/// Run one iteration: the timeout-wrapped invocation, retried on failure.
async fn run_iteration(
    task: &Task,
    host: &Host,
    opts: &RunOptions,
    pool: &SshPool,
    vars: VarMap,
) -> TaskOutcome {
    if task.retries == 0 {
        return run_attempt(task, host, opts, pool, &vars).await;
    }

    let delay = if task.delay.is_empty() {
        Duration::ZERO
    } else {
        match humantime::parse_duration(&task.delay) {
            Ok(d) => d,
            Err(e) => {
                return TaskOutcome::failed(
                    TaskResult {
                        failed: true,
                        ..Default::default()
                    },
                    Error::InvalidDuration {
                        field: "delay",
                        value: task.delay.clone(),
                        message: e.to_string(),
                    },
                );
            }
        }
    };

    let mut last = TaskOutcome::default();
    for attempt in 0..=task.retries {
        if attempt > 0 {
            output::retry_note(attempt, task.retries);
            if delay > Duration::ZERO {
                tokio::time::sleep(delay).await;
            }
        }
        let outcome = run_attempt(task, host, opts, pool, &vars).await;
        if outcome.error.is_none() {
            return outcome;
        }
        last = outcome;
    }
    last
}

/// Run one attempt under the task's deadline, if any.
///
/// An elapsed deadline drops the in-flight invocation (cancelling any
/// pending transport I/O) and yields a failed result naming the deadline.
async fn run_attempt(
    task: &Task,
    host: &Host,
    opts: &RunOptions,
    pool: &SshPool,
    vars: &VarMap,
) -> TaskOutcome {
    if task.timeout.is_empty() {
        return run_once(task, host, opts, pool, vars).await;
    }

    let deadline = match humantime::parse_duration(&task.timeout) {
        Ok(d) => d,
        Err(e) => {
            return TaskOutcome::failed(
                TaskResult {
                    failed: true,
                    ..Default::default()
                },
                Error::InvalidDuration {
                    field: "timeout",
                    value: task.timeout.clone(),
                    message: e.to_string(),
                },
            );
        }
    };

    match tokio::time::timeout(deadline, run_once(task, host, opts, pool, vars)).await {
        Ok(outcome) => outcome,
        Err(_) => TaskOutcome::failed(
            TaskResult {
                failed: true,
                ..Default::default()
            },
            Error::Timeout(task.timeout.clone()),
        ),
    }
}

/// One raw invocation: substitute variables, dispatch, fill in `changed`.
async fn run_once(
    task: &Task,
    host: &Host,
    opts: &RunOptions,
    pool: &SshPool,
    vars: &VarMap,
) -> TaskOutcome {
    let command = match template::expand(&task.command, vars) {
        Ok(command) => command,
        Err(e) => {
            return TaskOutcome::failed(
                TaskResult {
                    failed: true,
                    ..Default::default()
                },
                e,
            );
        }
    };

    if opts.dry_run {
        if let Some(copy) = &task.copy {
            output::dry_run(&format!(
                "COPY {} -> {}:{}",
                copy.src, host.address, copy.dest
            ));
        } else {
            output::dry_run(&format!("CMD {}", command));
        }
        return TaskOutcome::ok(TaskResult::default());
    }

    if let Some(copy) = &task.copy {
        let copied = if opts.run_locally {
            copy_local(&copy.src, &copy.dest).await
        } else {
            pool.copy_file(
                &host.address,
                Path::new(&copy.src),
                &copy.dest,
                &ssh_config_for(host, opts),
            )
            .await
        };
        return match copied {
            Ok(()) => TaskOutcome::ok(TaskResult {
                changed: true,
                ..Default::default()
            }),
            Err(e) => TaskOutcome::failed(
                TaskResult {
                    failed: true,
                    rc: 1,
                    ..Default::default()
                },
                e,
            ),
        };
    }

    let run: Result<CommandOutput> = if opts.run_locally {
        run_local(&command).await
    } else {
        let cfg = ssh_config_for(host, opts);
        if is_script(&command) {
            pool.run_script(&host.address, Path::new(&command), &cfg).await
        } else {
            pool.run_command_output(&host.address, &command, &cfg).await
        }
    };

    let (mut result, mut error) = match run {
        Ok(out) => {
            let failed = !out.success();
            let error = (!out.success()).then(|| Error::CommandFailed {
                host: host.address.clone(),
                code: out.exit_code,
            });
            (
                TaskResult {
                    output: out.output,
                    failed,
                    rc: out.exit_code,
                    ..Default::default()
                },
                error,
            )
        }
        Err(e) => (
            TaskResult {
                failed: true,
                rc: 1,
                ..Default::default()
            },
            Some(e),
        ),
    };

    if task.changed_when.is_empty() {
        result.changed = !result.failed;
    } else {
        let mut local_vars = vars.clone();
        local_vars.insert("output".to_string(), Value::String(result.output.clone()));
        result.changed = template::is_truthy(&task.changed_when, &local_vars);
    }

    TaskOutcome {
        result,
        error: error.take(),
    }
}

/// Run a command (or script file) through the local shell.
async fn run_local(command: &str) -> Result<CommandOutput> {
    let mut cmd = tokio::process::Command::new("sh");
    if is_script(command) {
        cmd.arg(command);
    } else {
        cmd.arg("-c").arg(command);
    }

    let out = cmd.output().await?;
    let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
    output.push_str(&String::from_utf8_lossy(&out.stderr));

    Ok(CommandOutput {
        output,
        exit_code: out.status.code().unwrap_or(-1),
    })
}

/// Local file copy with mode 0644.
async fn copy_local(src: &str, dest: &str) -> Result<()> {
    let data = tokio::fs::read(src).await.map_err(|e| Error::CopyFailed {
        src: src.to_string(),
        dest: dest.to_string(),
        message: format!("reading source: {}", e),
    })?;
    tokio::fs::write(dest, &data)
        .await
        .map_err(|e| Error::CopyFailed {
            src: src.to_string(),
            dest: dest.to_string(),
            message: format!("writing destination: {}", e),
        })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(dest, std::fs::Permissions::from_mode(0o644))
            .await
            .map_err(|e| Error::CopyFailed {
                src: src.to_string(),
                dest: dest.to_string(),
                message: format!("setting mode: {}", e),
            })?;
    }

    debug!(src = %src, dest = %dest, "copied file locally");
    Ok(())
}

/// A command counts as a script when it names an existing file with a shell
/// extension.
fn is_script(command: &str) -> bool {
    let path = Path::new(command);
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("sh" | "bash" | "zsh")
    ) && path.exists()
}
