//! SSH transport and connection pooling.
//!
//! [`ssh::SshClient`] owns one authenticated SSH connection (optionally
//! tunnelled through a jump host) and hands out per-operation sessions.
//! [`pool::SshPool`] caches one client per `user@host:port` and transparently
//! reconnects when a cached connection has gone stale.

pub mod pool;
pub mod ssh;

pub use pool::SshPool;
pub use ssh::{CommandOutput, SshClient, SshConfig};
