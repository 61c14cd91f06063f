//! Service loading and dependency resolution.
//!
//! A service named `web` lives under `<services_path>/web/` with its task
//! list in `tasks/main.yaml` and an optional `meta/main.yaml` declaring
//! `dependencies`. Resolution is depth-first: each dependency's tasks come
//! before the service's own, and a visited set guarantees every service
//! contributes its tasks at most once even in the presence of dependency
//! cycles.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::playbook::Task;

/// Default base directory for service task files.
pub const DEFAULT_SERVICES_PATH: &str = "services";

/// Service metadata: declared dependencies on other services.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceMeta {
    /// Names of services whose tasks must run first.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Load `meta/main.yaml` for a service. A missing file yields empty meta.
pub fn load_meta(services_path: &Path, service: &str) -> Result<ServiceMeta> {
    let path = services_path.join(service).join("meta").join("main.yaml");
    let data = match std::fs::read_to_string(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ServiceMeta::default());
        }
        Err(e) => {
            return Err(service_error(service, path, e.to_string()));
        }
    };
    serde_yaml::from_str(&data).map_err(|e| service_error(service, path, e.to_string()))
}

/// Load the task list for a service. A missing tasks file is an error.
pub fn load_tasks(services_path: &Path, service: &str) -> Result<Vec<Task>> {
    let path = services_path.join(service).join("tasks").join("main.yaml");
    let data = std::fs::read_to_string(&path)
        .map_err(|e| service_error(service, path.clone(), e.to_string()))?;
    serde_yaml::from_str(&data).map_err(|e| service_error(service, path, e.to_string()))
}

/// Resolve a service's tasks together with all transitive dependencies.
///
/// The result is the depth-first concatenation of dependency tasks followed
/// by the service's own tasks. Re-entering an already-visited service (a
/// direct or indirect cycle) contributes nothing, so the first encounter
/// wins.
pub fn load_tasks_with_deps(services_path: &Path, service: &str) -> Result<Vec<Task>> {
    let mut visited = HashSet::new();
    load_with_deps(services_path, service, &mut visited)
}

fn load_with_deps(
    services_path: &Path,
    service: &str,
    visited: &mut HashSet<String>,
) -> Result<Vec<Task>> {
    if !visited.insert(service.to_string()) {
        return Ok(Vec::new());
    }

    let meta = load_meta(services_path, service)?;

    let mut all = Vec::new();
    for dep in &meta.dependencies {
        let dep_tasks = load_with_deps(services_path, dep, visited)?;
        all.extend(dep_tasks);
    }

    all.extend(load_tasks(services_path, service)?);
    Ok(all)
}

fn service_error(service: &str, path: PathBuf, message: String) -> Error {
    Error::ServiceLoad {
        service: service.to_string(),
        path,
        message,
    }
}
