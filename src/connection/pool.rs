//! SSH connection pool.
//!
//! The pool caches at most one client per `user@host:port`. A cache hit
//! still opens a fresh session per operation; if the session open fails the
//! cached client is evicted and rebuilt, which transparently recovers from
//! dropped connections. The pool is safe for concurrent use - workers on
//! the same host share the client and obtain independent sessions.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::ssh::{copy_on_channel, exec_on_channel, CommandOutput, SshClient, SshConfig};
use crate::error::{Error, Result};

/// Cache of SSH clients, keyed by `user@host:port`.
#[derive(Default)]
pub struct SshPool {
    clients: Mutex<HashMap<String, Arc<SshClient>>>,
}

impl SshPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Obtain a fresh session from a pooled (or newly created) client.
    async fn session(
        &self,
        host: &str,
        cfg: &SshConfig,
    ) -> Result<russh::Channel<russh::client::Msg>> {
        let key = cfg.pool_key(host);

        let cached = self.clients.lock().await.get(&key).cloned();
        if let Some(client) = cached {
            match client.open_session().await {
                Ok(channel) => return Ok(channel),
                Err(e) => {
                    // Connection dead - evict and reconnect.
                    debug!(key = %key, error = %e, "cached ssh client stale, reconnecting");
                    self.clients.lock().await.remove(&key);
                }
            }
        }

        let client = Arc::new(SshClient::connect(host, cfg).await?);
        self.clients
            .lock()
            .await
            .insert(key, Arc::clone(&client));
        client.open_session().await
    }

    /// Run a command on the remote host, returning combined stdout+stderr
    /// and the exit status. One session per call.
    pub async fn run_command_output(
        &self,
        host: &str,
        command: &str,
        cfg: &SshConfig,
    ) -> Result<CommandOutput> {
        let channel = self.session(host, cfg).await?;
        exec_on_channel(channel, command).await
    }

    /// Read a local script file and execute its contents on the remote host.
    pub async fn run_script(
        &self,
        host: &str,
        script_path: &Path,
        cfg: &SshConfig,
    ) -> Result<CommandOutput> {
        let script = tokio::fs::read_to_string(script_path).await?;
        self.run_command_output(host, &script, cfg).await
    }

    /// Upload a local file to the remote host by streaming it into
    /// `cat > dest`.
    pub async fn copy_file(
        &self,
        host: &str,
        src: &Path,
        dest: &str,
        cfg: &SshConfig,
    ) -> Result<()> {
        let data = tokio::fs::read(src).await.map_err(|e| Error::CopyFailed {
            src: src.display().to_string(),
            dest: dest.to_string(),
            message: format!("reading local file: {}", e),
        })?;

        let channel = self.session(host, cfg).await?;
        copy_on_channel(channel, &data, host, dest).await
    }

    /// Disconnect and drop every cached client.
    pub async fn close(&self) {
        let clients: Vec<_> = self.clients.lock().await.drain().collect();
        for (key, client) in clients {
            debug!(key = %key, "closing pooled ssh client");
            client.close().await;
        }
    }
}
