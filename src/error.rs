//! Error types for Convoy.
//!
//! A single crate-wide error enum keeps failure categories explicit: load
//! errors carry the offending path, transport errors carry the host, and
//! task-level categories (template, timeout, execution) map onto the recap
//! classification done by the play engine.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Convoy operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Convoy.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Load Errors (fatal before/at the start of execution)
    // ========================================================================
    /// Failed to load or parse the runner configuration file.
    #[error("failed to load config '{path}': {message}")]
    ConfigLoad {
        /// Path to the configuration file
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Failed to load an inventory source (static file or dynamic script).
    #[error("failed to load inventory from '{source_name}': {message}")]
    InventoryLoad {
        /// File path or script invocation that failed
        source_name: String,
        /// Error message
        message: String,
    },

    /// Failed to load or parse a playbook file.
    #[error("failed to load playbook '{path}': {message}")]
    PlaybookLoad {
        /// Path to the playbook file
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Failed to load a service's tasks or meta descriptor.
    #[error("failed to load service '{service}' from '{path}': {message}")]
    ServiceLoad {
        /// Service name as referenced by the play
        service: String,
        /// Path that was being read
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// A play referenced a host group that is not in the inventory.
    #[error("no hosts found for group: {0}")]
    GroupNotFound(String),

    // ========================================================================
    // Vault Errors
    // ========================================================================
    /// Vault decryption failed (corrupt token, short ciphertext, wrong key).
    #[error("vault decrypt: {0}")]
    VaultDecrypt(String),

    /// Vault encryption failed.
    #[error("vault encrypt: {0}")]
    VaultEncrypt(String),

    /// The vault password file could not be read.
    #[error("reading vault password file '{path}': {message}")]
    VaultPassword {
        /// Path to the password file
        path: PathBuf,
        /// Error message
        message: String,
    },

    // ========================================================================
    // Task-level Errors
    // ========================================================================
    /// Variable substitution failed (malformed template).
    #[error("template: {0}")]
    Template(String),

    /// A task exceeded its configured deadline.
    #[error("timed out after {0}")]
    Timeout(String),

    /// A duration field ('timeout', 'delay') could not be parsed.
    #[error("invalid {field} {value:?}: {message}")]
    InvalidDuration {
        /// Which field was malformed
        field: &'static str,
        /// The raw value from the task
        value: String,
        /// Parser error message
        message: String,
    },

    /// A command finished with a non-zero exit status.
    #[error("command on '{host}' exited with status {code}")]
    CommandFailed {
        /// Target host
        host: String,
        /// Exit status
        code: i32,
    },

    /// A file copy failed.
    #[error("copy {src} -> {dest}: {message}")]
    CopyFailed {
        /// Local source path
        src: String,
        /// Destination path
        dest: String,
        /// Error message
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Could not establish a connection to a host.
    #[error("failed to connect to '{host}': {message}")]
    ConnectionFailed {
        /// Target host (or jump host)
        host: String,
        /// Error message
        message: String,
    },

    /// All configured authentication methods were rejected.
    #[error("authentication failed for '{user}@{host}': {message}")]
    AuthenticationFailed {
        /// Username
        user: String,
        /// Target host
        host: String,
        /// Error message
        message: String,
    },

    /// Low-level SSH protocol error.
    #[error("ssh: {0}")]
    Ssh(#[from] russh::Error),

    /// SSH key loading or known-hosts error.
    #[error("ssh key: {0}")]
    SshKey(#[from] russh::keys::Error),

    // ========================================================================
    // Usage / IO / Serialization
    // ========================================================================
    /// Invalid command-line usage.
    #[error("{0}")]
    Usage(String),

    /// IO error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// One or more tasks failed during a run.
    #[error("{0}")]
    RunFailed(String),
}

impl Error {
    /// Creates a connection-failed error.
    pub fn connection_failed(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Creates an authentication-failed error.
    pub fn auth_failed(
        user: impl Into<String>,
        host: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::AuthenticationFailed {
            user: user.into(),
            host: host.into(),
            message: message.into(),
        }
    }

    /// Creates a template error.
    pub fn template(message: impl Into<String>) -> Self {
        Self::Template(message.into())
    }

    /// True when this error is a load error that should abort before (or
    /// instead of) executing further work.
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            Error::ConfigLoad { .. }
                | Error::InventoryLoad { .. }
                | Error::PlaybookLoad { .. }
                | Error::ServiceLoad { .. }
        )
    }
}
