//! SSH client built on russh.
//!
//! Authentication methods are assembled from whichever of public-key and
//! password are configured, tried in that order. Host keys are verified
//! against a known-hosts file when one is configured; without one,
//! verification is skipped. That default is intended for LAN and lab use
//! only - production configs should set `known_hosts_file`.

use async_trait::async_trait;
use russh::client::{self, Handle, Msg};
use russh::keys::key::PublicKey;
use russh::keys::load_secret_key;
use russh::{Channel, ChannelMsg, Disconnect};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// TCP connect deadline for the initial dial.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection parameters for one SSH target.
#[derive(Debug, Clone, Default)]
pub struct SshConfig {
    /// Login user.
    pub user: String,
    /// Private key path for public-key authentication.
    pub key_path: Option<PathBuf>,
    /// Password for password authentication (or key passphrase).
    pub password: Option<String>,
    /// Remote SSH port.
    pub port: u16,
    /// Optional bastion in `host:port` form (port defaults to 22).
    pub jump_host: Option<String>,
    /// Known-hosts database for host-key verification.
    pub known_hosts_file: Option<PathBuf>,
}

impl SshConfig {
    /// Cache key identifying the connection this config produces.
    pub fn pool_key(&self, host: &str) -> String {
        format!("{}@{}:{}", self.user, host, self.port)
    }
}

/// Combined output and exit status of one remote command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Interleaved stdout and stderr as captured from the channel.
    pub output: String,
    /// Exit status; -1 when the channel closed without reporting one.
    pub exit_code: i32,
}

impl CommandOutput {
    /// True when the command exited with status zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Host-key verification handler.
struct HostKeyVerifier {
    host: String,
    port: u16,
    known_hosts_file: Option<PathBuf>,
}

#[async_trait]
impl client::Handler for HostKeyVerifier {
    type Error = Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match &self.known_hosts_file {
            Some(path) => {
                let known = russh::keys::check_known_hosts_path(
                    &self.host,
                    self.port,
                    server_public_key,
                    path,
                )?;
                if !known {
                    warn!(host = %self.host, "host key not present in known_hosts, rejecting");
                }
                Ok(known)
            }
            // No known-hosts database configured: accept any key.
            None => Ok(true),
        }
    }
}

/// One authenticated SSH connection to a target host.
///
/// Each operation opens its own session channel, so a single client can
/// serve several concurrent callers.
pub struct SshClient {
    handle: Handle<HostKeyVerifier>,
    // Keeps the bastion connection alive while the tunnelled session exists.
    jump: Option<Handle<HostKeyVerifier>>,
    host: String,
}

impl SshClient {
    /// Connect and authenticate, tunnelling through `cfg.jump_host` when set.
    pub async fn connect(host: &str, cfg: &SshConfig) -> Result<Self> {
        let client_config = Arc::new(client::Config::default());

        if let Some(jump) = &cfg.jump_host {
            let (jump_host, jump_port) = split_host_port(jump, 22);
            let mut jump_handle =
                dial(client_config.clone(), &jump_host, jump_port, cfg).await?;
            authenticate(&mut jump_handle, &jump_host, cfg).await?;

            let channel = jump_handle
                .channel_open_direct_tcpip(host, u32::from(cfg.port), "127.0.0.1", 0)
                .await
                .map_err(|e| {
                    Error::connection_failed(host, format!("dial via jump host {}: {}", jump, e))
                })?;

            let verifier = HostKeyVerifier {
                host: host.to_string(),
                port: cfg.port,
                known_hosts_file: cfg.known_hosts_file.clone(),
            };
            let mut handle =
                client::connect_stream(client_config, channel.into_stream(), verifier)
                    .await
                    .map_err(|e| {
                        Error::connection_failed(host, format!("ssh handshake: {}", e))
                    })?;
            authenticate(&mut handle, host, cfg).await?;

            debug!(host = %host, jump = %jump, "connected via jump host");
            return Ok(Self {
                handle,
                jump: Some(jump_handle),
                host: host.to_string(),
            });
        }

        let mut handle = dial(client_config, host, cfg.port, cfg).await?;
        authenticate(&mut handle, host, cfg).await?;

        debug!(host = %host, port = %cfg.port, user = %cfg.user, "connected");
        Ok(Self {
            handle,
            jump: None,
            host: host.to_string(),
        })
    }

    /// Open a fresh session channel. Failure here means the underlying
    /// connection is no longer usable.
    pub async fn open_session(&self) -> Result<Channel<Msg>> {
        self.handle
            .channel_open_session()
            .await
            .map_err(Error::from)
    }

    /// Run a command in a fresh session, returning combined output and exit
    /// status.
    pub async fn run_command(&self, command: &str) -> Result<CommandOutput> {
        let channel = self.open_session().await?;
        exec_on_channel(channel, command).await
    }

    /// Target host this client is connected to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Disconnect, including the jump connection when present.
    pub async fn close(&self) {
        let _ = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await;
        if let Some(jump) = &self.jump {
            let _ = jump.disconnect(Disconnect::ByApplication, "", "en").await;
        }
    }
}

/// Execute `command` on an already-open session channel and drain it.
pub(crate) async fn exec_on_channel(
    mut channel: Channel<Msg>,
    command: &str,
) -> Result<CommandOutput> {
    channel.exec(true, command).await?;

    let mut output = Vec::new();
    let mut exit_code = None;

    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { ref data } => output.extend_from_slice(data),
            // Extended data type 1 is stderr.
            ChannelMsg::ExtendedData { ref data, ext } if ext == 1 => {
                output.extend_from_slice(data);
            }
            ChannelMsg::ExitStatus { exit_status } => exit_code = Some(exit_status as i32),
            ChannelMsg::Close => break,
            _ => {}
        }
    }

    Ok(CommandOutput {
        output: String::from_utf8_lossy(&output).into_owned(),
        exit_code: exit_code.unwrap_or(-1),
    })
}

/// Stream `data` into `cat > dest` on an already-open session channel.
pub(crate) async fn copy_on_channel(
    mut channel: Channel<Msg>,
    data: &[u8],
    host: &str,
    dest: &str,
) -> Result<()> {
    channel
        .exec(true, format!("cat > {}", shell_quote(dest)))
        .await?;
    channel.data(data).await?;
    channel.eof().await?;

    let mut exit_code = None;
    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::ExitStatus { exit_status } => exit_code = Some(exit_status as i32),
            ChannelMsg::Close => break,
            _ => {}
        }
    }

    match exit_code.unwrap_or(0) {
        0 => Ok(()),
        code => Err(Error::CommandFailed {
            host: host.to_string(),
            code,
        }),
    }
}

async fn dial(
    config: Arc<client::Config>,
    host: &str,
    port: u16,
    cfg: &SshConfig,
) -> Result<Handle<HostKeyVerifier>> {
    let addr = format!("{}:{}", host, port);
    let socket = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
        .await
        .map_err(|_| Error::connection_failed(host, format!("connect to {} timed out", addr)))?
        .map_err(|e| Error::connection_failed(host, format!("connect to {}: {}", addr, e)))?;
    socket.set_nodelay(true).ok();

    let verifier = HostKeyVerifier {
        host: host.to_string(),
        port,
        known_hosts_file: cfg.known_hosts_file.clone(),
    };
    client::connect_stream(config, socket, verifier)
        .await
        .map_err(|e| Error::connection_failed(host, format!("ssh handshake: {}", e)))
}

/// Try public key then password authentication, in that order.
async fn authenticate(
    handle: &mut Handle<HostKeyVerifier>,
    host: &str,
    cfg: &SshConfig,
) -> Result<()> {
    if let Some(key_path) = &cfg.key_path {
        let key = load_secret_key(key_path, cfg.password.as_deref())?;
        let authenticated = handle
            .authenticate_publickey(cfg.user.as_str(), Arc::new(key))
            .await?;
        if authenticated {
            debug!(key = %key_path.display(), "authenticated with public key");
            return Ok(());
        }
    }

    if let Some(password) = &cfg.password {
        let authenticated = handle
            .authenticate_password(cfg.user.as_str(), password.as_str())
            .await?;
        if authenticated {
            debug!("authenticated with password");
            return Ok(());
        }
    }

    Err(Error::auth_failed(
        &cfg.user,
        host,
        "all authentication methods failed",
    ))
}

/// Quote an argument for the remote shell using single quotes.
pub(crate) fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Split `host:port`, falling back to `default_port` without a colon.
fn split_host_port(spec: &str, default_port: u16) -> (String, u16) {
    match spec.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (spec.to_string(), default_port),
        },
        None => (spec.to_string(), default_port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_key_format() {
        let cfg = SshConfig {
            user: "deploy".into(),
            port: 2222,
            ..Default::default()
        };
        assert_eq!(cfg.pool_key("web1"), "deploy@web1:2222");
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("/tmp/plain"), "'/tmp/plain'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn split_host_port_defaults() {
        assert_eq!(split_host_port("bastion", 22), ("bastion".into(), 22));
        assert_eq!(
            split_host_port("bastion:2200", 22),
            ("bastion".into(), 2200)
        );
        assert_eq!(split_host_port("bastion:x", 22), ("bastion:x".into(), 22));
    }
}
