//! Playbook data model: plays, service references, tasks and handlers.
//!
//! A playbook file is a YAML sequence of plays. Each play binds a host
//! group to an ordered list of services, with optional handlers, variables
//! and tags. Task lists themselves live on disk under the services tree and
//! are resolved by [`crate::services`].

use serde::Deserialize;
use std::path::Path;

use crate::error::{Error, Result};
use crate::template::VarMap;

/// An ordered sequence of plays.
pub type Playbook = Vec<Play>;

/// A play: one host group driven through an ordered set of services.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Play {
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Target inventory group.
    #[serde(default)]
    pub hosts: String,
    /// Services to run, in order.
    #[serde(default)]
    pub services: Vec<ServiceRef>,
    /// Handlers that tasks of this play may notify.
    #[serde(default)]
    pub handlers: Vec<Handler>,
    /// Play-level variables (lowest precedence in the scope).
    #[serde(default)]
    pub vars: VarMap,
    /// Tags gating the whole play.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Reference to a service by name.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceRef {
    /// Service name, resolved under the services path.
    #[serde(rename = "service")]
    pub name: String,
}

/// A handler: a named command that runs at most once per host and play
/// when notified by a task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Handler {
    /// Handler name, matched against `notify`.
    pub name: String,
    /// Shell command to run.
    #[serde(default)]
    pub command: String,
}

/// A local-to-remote (or local-to-local) file copy directive.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CopyTask {
    /// Local source path.
    pub src: String,
    /// Destination path on the target.
    pub dest: String,
}

/// A single executable unit: a shell command or a file copy, plus control
/// fields for conditions, loops, retries and result registration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Task {
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Shell command (mutually exclusive with `copy`).
    #[serde(default)]
    pub command: String,
    /// File copy directive (mutually exclusive with `command`).
    #[serde(default)]
    pub copy: Option<CopyTask>,
    /// Treat failures as ignored instead of failed.
    #[serde(default)]
    pub ignore_errors: bool,
    /// Tags for run-time filtering.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Handler to notify on ok/changed.
    #[serde(default)]
    pub notify: String,
    /// Condition expression; a falsy rendering skips the task.
    #[serde(default)]
    pub when: String,
    /// Loop items; each iteration sees the reserved `item` variable.
    #[serde(default)]
    pub with_items: Vec<serde_json::Value>,
    /// Per-attempt deadline, e.g. `"30s"`.
    #[serde(default)]
    pub timeout: String,
    /// Number of additional attempts after a failure.
    #[serde(default)]
    pub retries: u32,
    /// Sleep between attempts, e.g. `"5s"`.
    #[serde(default)]
    pub delay: String,
    /// Variable name receiving the task output.
    #[serde(default)]
    pub register: String,
    /// Expression deciding `changed`; sees the reserved `output` variable.
    #[serde(default)]
    pub changed_when: String,
}

impl Task {
    /// Create a command task, mainly for ad-hoc execution and tests.
    pub fn command(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            ..Default::default()
        }
    }
}

/// Outcome of one task execution.
#[derive(Debug, Clone, Default)]
pub struct TaskResult {
    /// Combined stdout and stderr.
    pub output: String,
    /// Whether the task reported a change.
    pub changed: bool,
    /// Whether the task failed.
    pub failed: bool,
    /// Exit status of the underlying command.
    pub rc: i32,
}

/// Load a playbook from a YAML file.
pub fn load_playbook(path: impl AsRef<Path>) -> Result<Playbook> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path).map_err(|e| Error::PlaybookLoad {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    serde_yaml::from_str(&data).map_err(|e| Error::PlaybookLoad {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_full_play() {
        let yaml = r#"
- name: deploy web
  hosts: webservers
  services:
    - service: nginx
    - service: app
  handlers:
    - name: reload nginx
      command: systemctl reload nginx
  vars:
    env: production
    workers: 4
  tags: [deploy]
"#;
        let playbook: Playbook = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(playbook.len(), 1);

        let play = &playbook[0];
        assert_eq!(play.name, "deploy web");
        assert_eq!(play.hosts, "webservers");
        assert_eq!(play.services[1].name, "app");
        assert_eq!(play.handlers[0].name, "reload nginx");
        assert_eq!(play.vars.get("workers"), Some(&serde_json::json!(4)));
        assert_eq!(play.tags, vec!["deploy"]);
    }

    #[test]
    fn task_fields_default_when_absent() {
        let yaml = r#"
- name: bare task
  command: echo hi
"#;
        let tasks: Vec<Task> = serde_yaml::from_str(yaml).unwrap();
        let task = &tasks[0];
        assert!(task.copy.is_none());
        assert!(!task.ignore_errors);
        assert!(task.with_items.is_empty());
        assert_eq!(task.retries, 0);
        assert!(task.when.is_empty());
    }

    #[test]
    fn copy_task_parses() {
        let yaml = r#"
- name: push config
  copy:
    src: files/nginx.conf
    dest: /etc/nginx/nginx.conf
  notify: reload nginx
"#;
        let tasks: Vec<Task> = serde_yaml::from_str(yaml).unwrap();
        let copy = tasks[0].copy.as_ref().unwrap();
        assert_eq!(copy.src, "files/nginx.conf");
        assert_eq!(copy.dest, "/etc/nginx/nginx.conf");
        assert_eq!(tasks[0].notify, "reload nginx");
    }
}
