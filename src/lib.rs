//! # Convoy - Agentless Remote Automation
//!
//! Convoy executes declarative playbooks against an inventory of hosts over
//! SSH, with no agent on the targets. A playbook is a sequence of plays;
//! each play binds a host group to an ordered list of services (reusable
//! task bundles with dependencies), optional handlers and variables. Tasks
//! are shell commands or file copies with conditions, loops, tags, retries
//! and timeouts.
//!
//! ## Core Concepts
//!
//! - **Playbooks**: YAML-defined workflows containing plays
//! - **Inventory**: hosts organized into groups with variables (static INI
//!   or a dynamic JSON-emitting script)
//! - **Services**: on-disk task bundles with transitive dependencies
//! - **Handlers**: deferred tasks that fire at most once per host when
//!   notified
//! - **Facts**: system information merged into the task variable scope
//! - **Vault**: AES-256-GCM encrypted secrets inline in config values
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use convoy::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let inventory = Inventory::from_file("hosts.ini")?;
//!     let playbook = load_playbook("site.yaml")?;
//!
//!     let engine = PlayEngine::new(RunOptions {
//!         ssh_user: "deploy".into(),
//!         forks: 10,
//!         ..Default::default()
//!     });
//!     engine.run_playbook(&playbook, Some(&inventory)).await
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types.

    pub use crate::connection::{CommandOutput, SshConfig, SshPool};
    pub use crate::error::{Error, Result};
    pub use crate::executor::{PlayEngine, RunOptions, TaskOutcome};
    pub use crate::facts::Facts;
    pub use crate::inventory::{Host, Inventory};
    pub use crate::output::HostSummary;
    pub use crate::playbook::{load_playbook, Handler, Play, Playbook, Task, TaskResult};
    pub use crate::template::VarMap;
    pub use crate::vault::Vault;
}

// ============================================================================
// Core Modules
// ============================================================================

pub mod error;
pub mod template;

// ============================================================================
// Playbook Components
// ============================================================================

pub mod playbook;
pub mod services;

// ============================================================================
// Infrastructure
// ============================================================================

pub mod connection;
pub mod facts;
pub mod inventory;

// ============================================================================
// Execution Engine
// ============================================================================

pub mod executor;

// ============================================================================
// Secrets and Configuration
// ============================================================================

pub mod config;
pub mod vault;

// ============================================================================
// Reporting
// ============================================================================

pub mod output;

/// Returns the current version of Convoy.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
